//! Text-generation and embedding boundaries
//!
//! Agents only see these traits; `gemini` provides the HTTP implementation.

use crate::config::EMBEDDING_DIMENSIONS;
use crate::error::{ErrorCode, OrchestrationError};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod gemini;
pub use gemini::GeminiClient;

/// Inputs per `embed_many` round trip
pub const EMBED_BATCH_SIZE: usize = 10;

/// Partial text fragments in arrival order; ends when the source closes.
pub type TokenStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Blocking generation
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Streaming generation
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds `texts` in batches of [`EMBED_BATCH_SIZE`], preserving order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub fn ensure_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(OrchestrationError::agent(
            ErrorCode::EmptyText,
            "Cannot embed empty text",
        ));
    }
    Ok(())
}

pub fn ensure_dimensions(vector: &[f32]) -> Result<()> {
    if vector.len() != EMBEDDING_DIMENSIONS {
        return Err(OrchestrationError::agent(
            ErrorCode::InvalidDimensions,
            format!(
                "Expected {} dimensions, got {}",
                EMBEDDING_DIMENSIONS,
                vector.len()
            ),
        ));
    }
    Ok(())
}
