use std::sync::Arc;

use anyhow::Result;
use rmcp::{transport::stdio, ServiceExt};

use searchcp::config::Config;
use searchcp::embedding::local::LocalEmbedder;
use searchcp::embedding::openai::OpenAiEmbedder;
use searchcp::embedding::Embedder;
use searchcp::engine::SearchEngine;
use searchcp::errors::SearchError;
use searchcp::logging::init_logging;
use searchcp::server::SearchService;

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>, SearchError> {
    match config.embedding.provider.as_str() {
        "openai" => {
            let api_key = config.embedding.openai_api_key.clone().unwrap_or_default();
            let embedder = OpenAiEmbedder::new(api_key)?;
            Ok(Arc::new(embedder))
        }
        "local" => Ok(Arc::new(LocalEmbedder::new(
            &config.embedding.cache_dir,
            config.embedding.vector_dimension,
        ))),
        other => Err(SearchError::validation(
            "embedding.provider",
            &format!("Unknown embedding provider '{}': expected local or openai", other),
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config);
    tracing::info!(
        provider = %config.embedding.provider,
        method = ?config.scoring.method,
        "searchcp starting"
    );

    let embedder = build_embedder(&config)?;
    let engine = Arc::new(SearchEngine::new(&config, embedder));

    let service = SearchService::new(engine).serve(stdio()).await?;
    tracing::info!("searchcp serving on stdio");
    service.waiting().await?;

    Ok(())
}
