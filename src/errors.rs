/// Domain-specific error types for searchcp
///
/// Stage failures carry a stage tag so the surface can report which layer of
/// the cascade broke; the server layer attaches per-operation error codes.

use std::fmt;

/// The four cascade stages, used to tag layer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lexical,
    Relevance,
    Semantic,
    Personalization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Lexical => write!(f, "lexical"),
            Stage::Relevance => write!(f, "relevance"),
            Stage::Semantic => write!(f, "semantic"),
            Stage::Personalization => write!(f, "personalization"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Document not found: {id}")]
    NotFound { id: String },

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Layer error ({stage}): {message}")]
    Layer { stage: Stage, message: String },
}

impl SearchError {
    /// Helper to create validation errors with field names
    pub fn validation(field: &str, message: &str) -> Self {
        SearchError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }

    /// Helper to create a stage-tagged layer error
    pub fn layer(stage: Stage, message: impl Into<String>) -> Self {
        SearchError::Layer {
            stage,
            message: message.into(),
        }
    }
}

impl From<crate::embedding::EmbeddingError> for SearchError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        use crate::embedding::EmbeddingError;
        match e {
            EmbeddingError::NotConfigured(msg) => SearchError::NotInitialized(msg),
            other => SearchError::layer(Stage::Semantic, other.to_string()),
        }
    }
}
