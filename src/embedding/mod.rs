/// Embedding provider trait and supporting types
///
/// Pluggable interface for text embedding generation. Supports local
/// fastembed models (default, no API key) and OpenAI-compatible APIs.
///
/// Lifecycle: providers load lazily. The first call that needs the model
/// triggers the load; concurrent callers await the single in-flight load
/// rather than racing a second one.

pub mod local;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Model initialization failure
    #[error("Model initialization error: {0}")]
    ModelInit(String),

    /// Embedding generation failure (inference error)
    #[error("Embedding generation error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider not configured (e.g., missing API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The model's actual output dimension disagrees with the configuration.
    /// The model's dimension is authoritative; the config must be corrected.
    #[error("Embedding dimension mismatch: model produces {actual}, config expects {configured}")]
    DimensionMismatch { configured: usize, actual: usize },
}

/// Concatenate title and content into the text that gets embedded.
pub fn build_embedding_text(title: &str, content: &str) -> String {
    format!("{} {}", title, content)
}

/// Core trait for embedding text into fixed-dimension float vectors.
///
/// Implementations must be Send + Sync to support use across concurrent
/// request handlers (Arc<dyn Embedder>).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Load model weights if not yet loaded. At-most-once: concurrent
    /// callers wait for the single in-flight load instead of polling.
    async fn ensure_loaded(&self) -> Result<(), EmbeddingError>;

    /// Generate an embedding vector for the given text. Triggers the load
    /// when called before readiness.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Model name identifier (e.g., "all-MiniLM-L6-v2").
    fn model_name(&self) -> &str;

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Whether a load has completed successfully.
    fn is_ready(&self) -> bool;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_embedding_text() {
        assert_eq!(build_embedding_text("Title", "body text"), "Title body text");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = EmbeddingError::DimensionMismatch {
            configured: 768,
            actual: 384,
        };
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("768"));
    }
}
