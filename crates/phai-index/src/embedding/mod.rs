//! Embedding provider abstraction and the HTTP client used in production.

mod http_client;
mod provider;

pub use http_client::HttpEmbeddingClient;
pub use provider::{EmbeddingProvider, ImageData};
