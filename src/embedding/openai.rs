/// OpenAI embedding provider
///
/// Calls the OpenAI Embeddings API using reqwest. Uses text-embedding-3-small
/// (1536 dimensions) by default. Requires SEARCHCP_EMBEDDING__OPENAI_API_KEY
/// or openai_api_key in searchcp.toml.
///
/// API providers have no weights to load; ensure_loaded only validates the
/// configuration. Every response is checked against the expected dimension.

use async_trait::async_trait;

use super::{Embedder, EmbeddingError};

/// Request body for the OpenAI Embeddings API
#[derive(serde::Serialize)]
struct EmbedRequest {
    input: String,
    model: String,
}

/// Response from the OpenAI Embeddings API
#[derive(serde::Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

/// Single embedding result
#[derive(serde::Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dim: usize,
}

impl OpenAiEmbedder {
    /// Create a new OpenAiEmbedder.
    ///
    /// # Errors
    /// Returns `EmbeddingError::NotConfigured` if api_key is empty.
    pub fn new(api_key: String) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::NotConfigured(
                "OpenAI API key is required when using the openai embedding provider. \
                 Set SEARCHCP_EMBEDDING__OPENAI_API_KEY or openai_api_key in searchcp.toml"
                    .to_string(),
            ));
        }

        Ok(OpenAiEmbedder {
            client: reqwest::Client::new(),
            api_key,
            model: "text-embedding-3-small".to_string(),
            dim: 1536,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn ensure_loaded(&self) -> Result<(), EmbeddingError> {
        // Key presence was validated at construction; nothing to download.
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbedRequest {
            input: text.to_string(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::Api {
                status,
                message: body,
            });
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("Failed to parse API response: {}", e)))?;

        let vector = embed_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Generation("API returned empty embedding list".to_string()))?;

        if vector.len() != self.dim {
            return Err(EmbeddingError::DimensionMismatch {
                configured: self.dim,
                actual: vector.len(),
            });
        }

        Ok(vector)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_ready(&self) -> bool {
        true
    }
}
