//! Embedding client for a CLIP-style HTTP embedding service.

use phai_core::vector::l2_normalize;
use phai_core::{Embedding, Error, ProviderConfig, Result};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::provider::{EmbeddingProvider, ImageData};

/// Request body for text embeddings
#[derive(Serialize)]
struct TextRequest<'request> {
    model: &'request str,
    input: &'request str,
}

/// Request body for batched text embeddings
#[derive(Serialize)]
struct BatchTextRequest<'request> {
    model: &'request str,
    inputs: &'request [String],
}

/// Single-vector response
#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Batched response
#[derive(Deserialize)]
struct BatchEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP embedding client.
///
/// Endpoints (relative to the configured base URL):
/// - `GET /health`
/// - `POST /embed/text` with `{ "model", "input" }` or `{ "model", "inputs" }`
/// - `POST /embed/image?model=...` with the encoded image as the raw body
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl HttpEmbeddingClient {
    /// Create a client from provider configuration
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.endpoint.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
        })
    }

    /// Model name sent with every request
    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn finish(mut embedding: Embedding) -> Result<Embedding> {
        if embedding.is_empty() {
            return Err(Error::Provider("Empty embedding returned".to_owned()));
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl EmbeddingProvider for HttpEmbeddingClient {
    async fn ensure_available(&self) -> Result<()> {
        let response = self
            .http
            .get(self.url("health"))
            .send()
            .await
            .map_err(|error| {
                Error::ProviderUnavailable(format!(
                    "Failed to connect to embedding service at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "Embedding service at {} answered {}",
                self.base_url,
                response.status()
            )));
        }

        debug!("Embedding service {} ready (model {})", self.base_url, self.model);
        Ok(())
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        let response = self
            .http
            .post(self.url("embed/text"))
            .json(&TextRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|error| Error::Provider(format!("Text embedding failed: {error}")))?
            .error_for_status()
            .map_err(|error| Error::Provider(format!("Text embedding rejected: {error}")))?;

        let body: EmbeddingResponse = response.json().await?;
        Self::finish(body.embedding)
    }

    async fn embed_image(&self, image: &ImageData) -> Result<Embedding> {
        let origin = image
            .origin
            .as_ref()
            .map_or_else(|| "<memory>".to_owned(), |path| path.display().to_string());

        let response = self
            .http
            .post(self.url("embed/image"))
            .query(&[("model", self.model.as_str())])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|error| {
                Error::Provider(format!("Image embedding failed for {origin}: {error}"))
            })?
            .error_for_status()
            .map_err(|error| {
                Error::Provider(format!("Image embedding rejected for {origin}: {error}"))
            })?;

        let body: EmbeddingResponse = response.json().await?;
        Self::finish(body.embedding)
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::default());
        }

        if texts.len() == 1 {
            return Ok(vec![self.embed_text(&texts[0]).await?]);
        }

        let response = self
            .http
            .post(self.url("embed/text"))
            .json(&BatchTextRequest {
                model: &self.model,
                inputs: &texts,
            })
            .send()
            .await
            .map_err(|error| Error::Provider(format!("Batch text embedding failed: {error}")))?
            .error_for_status()
            .map_err(|error| {
                Error::Provider(format!("Batch text embedding rejected: {error}"))
            })?;

        let body: BatchEmbeddingResponse = response.json().await?;
        if body.embeddings.len() != texts.len() {
            return Err(Error::Provider(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }
        body.embeddings.into_iter().map(Self::finish).collect()
    }
}
