use std::future::Future;
use std::path::{Path, PathBuf};

use phai_core::{Embedding, Result};

/// Encoded image handed to the embedding provider.
///
/// Decoding is the provider's job; the engine only moves bytes around.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Encoded image bytes (JPEG, PNG, ...)
    pub bytes: Vec<u8>,
    /// File the bytes were read from, or the video a frame was cut from
    pub origin: Option<PathBuf>,
}

impl ImageData {
    /// Wrap encoded bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            origin: None,
        }
    }

    /// Attach the originating path
    #[must_use]
    pub fn with_origin(mut self, origin: &Path) -> Self {
        self.origin = Some(origin.to_path_buf());
        self
    }
}

/// Trait for generating vision-language embeddings.
///
/// Vectors must share one dimension for the lifetime of an index and should
/// be unit-normalized; the query engine normalizes the reduced query vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Ensure the embedding model is reachable and loaded
    ///
    /// # Errors
    /// Returns `ProviderUnavailable` if the model cannot serve requests
    fn ensure_available(&self) -> impl Future<Output = Result<()>> + Send;

    /// Generate an embedding for text
    ///
    /// # Errors
    /// Returns an error if embedding generation fails
    fn embed_text(&self, text: &str) -> impl Future<Output = Result<Embedding>> + Send;

    /// Generate an embedding for an encoded image
    ///
    /// # Errors
    /// Returns an error if the image cannot be decoded or inference fails
    fn embed_image(&self, image: &ImageData) -> impl Future<Output = Result<Embedding>> + Send;

    /// Embed multiple texts, in order
    ///
    /// # Errors
    /// Returns an error if any embedding generation fails
    fn embed_texts(
        &self,
        texts: Vec<String>,
    ) -> impl Future<Output = Result<Vec<Embedding>>> + Send {
        async move {
            let mut embeddings = Vec::with_capacity(texts.len());
            for text in &texts {
                embeddings.push(self.embed_text(text).await?);
            }
            Ok(embeddings)
        }
    }
}
