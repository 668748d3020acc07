/// Local embedding provider using fastembed
///
/// Offline embedding generation using all-MiniLM-L6-v2 (384 dimensions,
/// unit-normalized output). No API key required; model weights are
/// downloaded and cached locally on first load.
///
/// The load is lazy and at-most-once: a OnceCell guards initialization so
/// concurrent first callers await the same in-flight load. After the model
/// comes up, its actual output dimension is checked against the configured
/// one; the model wins and a mismatch fails the load.
///
/// All CPU-bound fastembed calls are wrapped in spawn_blocking to avoid
/// blocking the async runtime.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio::task;

use super::{Embedder, EmbeddingError};

pub struct LocalEmbedder {
    model: OnceCell<Arc<Mutex<TextEmbedding>>>,
    cache_dir: String,
    name: String,
    dim: usize,
}

impl LocalEmbedder {
    /// Create an unloaded provider. Nothing is downloaded until the first
    /// call that needs the model.
    ///
    /// # Arguments
    /// * `cache_dir` - Directory to cache model weights
    /// * `dimension` - Expected embedding dimension (validated at load)
    pub fn new(cache_dir: &str, dimension: usize) -> Self {
        LocalEmbedder {
            model: OnceCell::new(),
            cache_dir: cache_dir.to_string(),
            name: "all-MiniLM-L6-v2".to_string(),
            dim: dimension,
        }
    }

    async fn load(&self) -> Result<&Arc<Mutex<TextEmbedding>>, EmbeddingError> {
        let cache_path = PathBuf::from(&self.cache_dir);
        let expected_dim = self.dim;

        self.model
            .get_or_try_init(|| async move {
                let te = task::spawn_blocking(move || {
                    let mut te = TextEmbedding::try_new(
                        InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                            .with_cache_dir(cache_path)
                            .with_show_download_progress(false),
                    )
                    .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

                    // Probe once: the model's real output dimension is
                    // authoritative over the configured value.
                    let probe = te
                        .embed(vec!["dimension probe".to_string()], None)
                        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;
                    let actual = probe
                        .first()
                        .map(|v| v.len())
                        .ok_or_else(|| {
                            EmbeddingError::ModelInit("model returned no probe vector".to_string())
                        })?;
                    if actual != expected_dim {
                        return Err(EmbeddingError::DimensionMismatch {
                            configured: expected_dim,
                            actual,
                        });
                    }

                    Ok::<_, EmbeddingError>(te)
                })
                .await
                .map_err(|e| EmbeddingError::ModelInit(e.to_string()))??;

                Ok(Arc::new(Mutex::new(te)))
            })
            .await
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn ensure_loaded(&self) -> Result<(), EmbeddingError> {
        self.load().await.map(|_| ())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(self.load().await?);
        let text = text.to_string();

        task::spawn_blocking(move || {
            let mut model = model.lock().expect("embedding model lock poisoned");
            let mut embeddings = model
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))?;

            embeddings
                .pop()
                .ok_or_else(|| EmbeddingError::Generation("fastembed returned empty result".to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Generation(format!("spawn_blocking panicked: {}", e)))?
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_ready(&self) -> bool {
        self.model.initialized()
    }
}
