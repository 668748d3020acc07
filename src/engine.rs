/// Aggregating search engine: owns the four cascade stages and fans document
/// mutations out to all of them.
///
/// Per query the cascade narrows progressively: lexical candidates (Stage 1),
/// BM25/TF-IDF scoring (Stage 2), dense-vector re-ranking (Stage 3),
/// personalization (Stage 4). Each stage is timed and its output count
/// recorded; an empty stage short-circuits the rest with a successful empty
/// response. The only suspension points are the embedding calls in Stage 3.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::errors::SearchError;
use crate::index::{BooleanOperator, IndexStats, InvertedIndex};
use crate::personalization::{
    BehaviorEvent, PersonalizationReranker, PersonalizationStats, PersonalizationWeights,
    ProfileUpdate, UserProfile,
};
use crate::scoring::{CorpusStats, RelevanceScorer};
use crate::semantic::{SemanticHit, SemanticReranker, VectorStats};
use crate::types::{
    materialize, Document, DocumentInput, LayerStat, LayerStats, SearchData, SearchRequest,
    SearchResult,
};

/// Query length contract: 1 to 500 characters.
const MAX_QUERY_CHARS: usize = 500;

/// Per-stage statistics for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub layer1: IndexStats,
    pub layer2: CorpusStats,
    pub layer3: VectorStats,
    pub layer4: PersonalizationStats,
}

/// Per-stage readiness for the health surface. Stages 1, 2, and 4 are always
/// ready once constructed; Stage 3 readiness tracks the embedder load.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineHealth {
    pub lexical: bool,
    pub relevance: bool,
    pub semantic: bool,
    pub personalization: bool,
}

pub struct SearchEngine {
    index: InvertedIndex,
    scorer: RelevanceScorer,
    semantic: SemanticReranker,
    personalization: PersonalizationReranker,
    max_final_results: usize,
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn validate_query(query: &str) -> Result<(), SearchError> {
    if query.trim().is_empty() {
        return Err(SearchError::validation("query", "Query is required and cannot be empty"));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(SearchError::validation(
            "query",
            &format!("Query exceeds the {} character limit", MAX_QUERY_CHARS),
        ));
    }
    Ok(())
}

fn validate_document(input: &DocumentInput) -> Result<(), SearchError> {
    if input.id.trim().is_empty() {
        return Err(SearchError::validation("id", "Document id is required and cannot be empty"));
    }
    if input.title.trim().is_empty() {
        return Err(SearchError::validation(
            "title",
            "Document title is required and cannot be empty",
        ));
    }
    if input.content.trim().is_empty() {
        return Err(SearchError::validation(
            "content",
            "Document content is required and cannot be empty",
        ));
    }
    Ok(())
}

impl SearchEngine {
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        SearchEngine {
            index: InvertedIndex::new(config.cascade.max_results_layer1),
            scorer: RelevanceScorer::new(
                config.scoring.method,
                config.scoring.k1,
                config.scoring.b,
                config.cascade.max_results_layer2,
            ),
            semantic: SemanticReranker::new(embedder, config.cascade.max_results_layer3),
            personalization: PersonalizationReranker::new(
                PersonalizationWeights {
                    user_profile: config.personalization.user_profile_weight,
                    context: config.personalization.context_weight,
                    temporal: config.personalization.temporal_weight,
                },
                config.cascade.max_final_results,
            ),
            max_final_results: config.cascade.max_final_results,
        }
    }

    /// Add a document to every stage. Re-adding an existing id replaces the
    /// stored version. If the semantic stage fails (model load, embedding),
    /// the earlier stages are rolled back so no stage sees a torn document.
    pub async fn add_document(&self, input: DocumentInput) -> Result<Document, SearchError> {
        validate_document(&input)?;
        let document = input.into_document();

        if self.scorer.contains(&document.id) {
            self.remove_from_stages(&document.id);
        }

        self.index.add_document(&document);
        self.scorer.add_document(&document);
        if let Err(e) = self.semantic.add_document(&document).await {
            self.index.remove_document(&document.id);
            self.scorer.remove_document(&document.id);
            return Err(e);
        }

        tracing::debug!(id = %document.id, "document indexed across all layers");
        Ok(document)
    }

    /// Add a batch sequentially. Fails fast: documents before the failing one
    /// remain indexed; the error names the document that broke.
    pub async fn add_documents(&self, inputs: Vec<DocumentInput>) -> Result<usize, SearchError> {
        let mut added = 0usize;
        for input in inputs {
            let id = input.id.clone();
            self.add_document(input).await.map_err(|e| {
                tracing::warn!(id = %id, error = %e, "batch add stopped");
                e
            })?;
            added += 1;
        }
        Ok(added)
    }

    /// Remove a document from every stage. Unknown ids are NotFound.
    pub fn remove_document(&self, id: &str) -> Result<(), SearchError> {
        if !self.remove_from_stages(id) {
            return Err(SearchError::NotFound { id: id.to_string() });
        }
        tracing::debug!(id = %id, "document removed from all layers");
        Ok(())
    }

    fn remove_from_stages(&self, id: &str) -> bool {
        let in_index = self.index.remove_document(id);
        let in_scorer = self.scorer.remove_document(id);
        let in_vectors = self.semantic.remove_document(id);
        in_index || in_scorer || in_vectors
    }

    /// Full four-stage cascade.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchData, SearchError> {
        validate_query(&request.query)?;
        let limit = request
            .limit
            .map(|l| l.clamp(1, 100) as usize)
            .unwrap_or(self.max_final_results);
        let offset = request.offset.unwrap_or(0) as usize;

        let started = Instant::now();
        let mut layer_stats = LayerStats::default();

        // Stage 1: lexical candidates
        let stage = Instant::now();
        let candidates = self.index.candidates(&request.query);
        layer_stats.layer1 = LayerStat::new(candidates.len(), elapsed_ms(stage));
        if candidates.is_empty() {
            tracing::debug!(query = %request.query, "no lexical candidates");
            return Ok(SearchData::empty(elapsed_ms(started), layer_stats));
        }

        // Stage 2: relevance scoring
        let stage = Instant::now();
        let scored = self.scorer.score(&request.query, &candidates);
        layer_stats.layer2 = LayerStat::new(scored.len(), elapsed_ms(stage));
        if scored.is_empty() {
            return Ok(SearchData::empty(elapsed_ms(started), layer_stats));
        }

        // Stage 3: semantic re-ranking (suspension point: embedding)
        let stage = Instant::now();
        let (reranked, similarities) = self.semantic.rerank(&request.query, scored).await?;
        layer_stats.layer3 = LayerStat::new(reranked.len(), elapsed_ms(stage));
        tracing::debug!(
            candidates = similarities.len(),
            top_similarity = similarities.first().map(|s| s.similarity),
            "semantic re-rank complete"
        );

        // Stage 4: personalization
        let stage = Instant::now();
        let (personalized, personalization_score) = self.personalization.rerank(
            reranked,
            request.user_id.as_deref(),
            request.context.as_ref(),
            limit,
        );
        layer_stats.layer4 = LayerStat::new(personalized.len(), elapsed_ms(stage));

        let total_count = personalized.len();
        let results: Vec<SearchResult> =
            personalized.into_iter().skip(offset).take(limit).collect();

        Ok(SearchData {
            results,
            total_count,
            execution_time_ms: elapsed_ms(started),
            personalization_score,
            layer_stats,
        })
    }

    /// Stage-1 only: candidate retrieval without scoring.
    pub fn quick_search(&self, request: &SearchRequest) -> Result<SearchData, SearchError> {
        validate_query(&request.query)?;
        let limit = request
            .limit
            .map(|l| l.clamp(1, 100) as usize)
            .unwrap_or(self.max_final_results);

        let started = Instant::now();
        let candidates = self.index.candidates(&request.query);
        let total_count = candidates.len();

        let mut results: Vec<SearchResult> = candidates
            .iter()
            .filter_map(|id| self.scorer.document(id))
            .map(|doc| {
                let mut result = materialize(&doc, 0.0);
                result.metadata["match"] = json!("lexical");
                result
            })
            .collect();
        results.truncate(limit);

        let elapsed = elapsed_ms(started);
        let mut layer_stats = LayerStats::default();
        layer_stats.layer1 = LayerStat::new(total_count, elapsed);

        Ok(SearchData {
            results,
            total_count,
            execution_time_ms: elapsed,
            personalization_score: 0.0,
            layer_stats,
        })
    }

    /// Stage-1 boolean retrieval.
    pub fn boolean_search(
        &self,
        query: &str,
        operator: BooleanOperator,
    ) -> Result<Vec<SearchResult>, SearchError> {
        validate_query(query)?;
        let ids = self.index.boolean_search(query, operator);
        Ok(ids
            .iter()
            .filter_map(|id| self.scorer.document(id))
            .map(|doc| {
                let mut result = materialize(&doc, 0.0);
                result.metadata["match"] = json!("boolean");
                result
            })
            .collect())
    }

    /// Stage-3 standalone: exact similarity over the whole vector store.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        validate_query(query)?;
        let hits = self.semantic.semantic_search(query, limit).await?;
        Ok(hits.into_iter().map(|hit| self.materialize_semantic(hit)).collect())
    }

    /// Stage-3 similarity to an already-stored document.
    pub async fn find_similar(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.semantic.ensure_ready().await?;
        let hits = self.semantic.find_similar(document_id, limit)?;
        Ok(hits.into_iter().map(|hit| self.materialize_semantic(hit)).collect())
    }

    fn materialize_semantic(&self, hit: SemanticHit) -> SearchResult {
        let mut result = match self.scorer.document(&hit.id) {
            Some(doc) => materialize(&doc, hit.similarity),
            None => {
                // The document store normally moves in lockstep with the
                // vector store; fall back to the embed-time snapshot
                let snapshot = hit.snapshot;
                let mut metadata = match snapshot.metadata {
                    Some(Value::Object(map)) => Value::Object(map),
                    _ => json!({}),
                };
                if let Some(category) = snapshot.category {
                    metadata["category"] = json!(category);
                }
                metadata["created_at"] = json!(snapshot.created_at.to_rfc3339());
                SearchResult {
                    id: hit.id.clone(),
                    title: snapshot.title,
                    content: String::new(),
                    url: None,
                    score: hit.similarity,
                    metadata,
                }
            }
        };
        result.metadata["similarity"] = json!(hit.similarity);
        result
    }

    pub fn record_behavior(
        &self,
        user_id: &str,
        action: &str,
        data: &Value,
    ) -> Result<UserProfile, SearchError> {
        if user_id.trim().is_empty() {
            return Err(SearchError::validation("user_id", "user_id is required"));
        }
        let event = BehaviorEvent::parse(action, data)?;
        Ok(self.personalization.record_behavior(user_id, event))
    }

    pub fn update_user_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<UserProfile, SearchError> {
        if user_id.trim().is_empty() {
            return Err(SearchError::validation("user_id", "user_id is required"));
        }
        Ok(self.personalization.update_profile(user_id, update))
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            layer1: self.index.stats(),
            layer2: self.scorer.stats(),
            layer3: self.semantic.stats(),
            layer4: self.personalization.stats(),
        }
    }

    pub fn health(&self) -> EngineHealth {
        EngineHealth {
            lexical: true,
            relevance: true,
            semantic: self.semantic.is_ready(),
            personalization: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::StubEmbedder;
    use serde_json::json;

    fn engine() -> SearchEngine {
        SearchEngine::new(&Config::default(), Arc::new(StubEmbedder::new()))
    }

    fn input(id: &str, title: &str, content: &str) -> DocumentInput {
        DocumentInput {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            url: None,
            category: None,
            tags: None,
            created_at: None,
            updated_at: None,
            metadata: None,
        }
    }

    async fn seeded_engine() -> SearchEngine {
        let engine = engine();
        engine
            .add_document(input("d1", "Machine Learning", "algorithms that learn from data"))
            .await
            .unwrap();
        engine
            .add_document(input("d2", "Deep Learning", "neural networks with multiple layers"))
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_empty_corpus_search_returns_empty_with_stats() {
        let engine = engine();
        let data = engine
            .search(SearchRequest {
                query: "x".repeat(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(data.results.is_empty());
        assert_eq!(data.total_count, 0);
        assert_eq!(data.layer_stats.layer1.count, 0);
        assert_eq!(data.layer_stats.layer2.count, 0);
        assert_eq!(data.layer_stats.layer3.count, 0);
        assert_eq!(data.layer_stats.layer4.count, 0);
    }

    #[tokio::test]
    async fn test_quick_search_finds_both_candidates() {
        let engine = seeded_engine().await;
        let data = engine
            .quick_search(&SearchRequest {
                query: "learning".to_string(),
                ..Default::default()
            })
            .unwrap();
        let mut ids: Vec<&str> = data.results.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn test_boolean_and_or() {
        let engine = seeded_engine().await;
        let and = engine
            .boolean_search("machine deep", BooleanOperator::And)
            .unwrap();
        assert!(and.is_empty());

        let or = engine
            .boolean_search("machine deep", BooleanOperator::Or)
            .unwrap();
        let mut ids: Vec<&str> = or.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn test_full_search_ranks_matching_document_first() {
        let engine = seeded_engine().await;
        let data = engine
            .search(SearchRequest {
                query: "neural networks".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!data.results.is_empty());
        assert_eq!(data.results[0].id, "d2");
        assert!(data.layer_stats.layer1.count >= 1);
        assert_eq!(data.layer_stats.layer4.count, data.total_count);
    }

    #[tokio::test]
    async fn test_personalization_lifts_boosted_document() {
        let engine = seeded_engine().await;
        engine
            .update_user_profile(
                "u1",
                ProfileUpdate {
                    preferences: Some(crate::personalization::profile::Preferences {
                        categories: vec!["technology".to_string()],
                        ..Default::default()
                    }),
                    demographics: None,
                },
            )
            .unwrap();
        engine
            .record_behavior("u1", "click", &json!({"document_id": "d1"}))
            .unwrap();
        // Re-add d1 with the preferred category so the category boost applies
        let mut d1 = input("d1", "Machine Learning", "algorithms that learn from data");
        d1.category = Some("technology".to_string());
        engine.add_document(d1).await.unwrap();

        let baseline = engine
            .search(SearchRequest {
                query: "learning".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let base_d1 = baseline.results.iter().find(|r| r.id == "d1").unwrap().score;

        let personalized = engine
            .search(SearchRequest {
                query: "learning".to_string(),
                user_id: Some("u1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let boosted_d1 = personalized.results.iter().find(|r| r.id == "d1").unwrap();

        // category 0.20 + click 0.15 under the 0.3 user-profile weight
        let floor = base_d1 + 0.35 * 0.3 * base_d1;
        assert!(
            boosted_d1.score >= floor - 1e-9,
            "boosted score {} below floor {}",
            boosted_d1.score,
            floor
        );
        assert!((personalized.personalization_score - 0.4).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_caps_enforced_per_stage() {
        let mut config = Config::default();
        config.cascade.max_results_layer1 = 8;
        config.cascade.max_results_layer2 = 5;
        config.cascade.max_results_layer3 = 3;
        config.cascade.max_final_results = 2;
        let engine = SearchEngine::new(&config, Arc::new(StubEmbedder::new()));

        for i in 0..12 {
            engine
                .add_document(input(
                    &format!("d{i}"),
                    "Shared Topic",
                    &format!("common retrieval words plus variant{i}"),
                ))
                .await
                .unwrap();
        }
        let data = engine
            .search(SearchRequest {
                query: "common retrieval".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(data.layer_stats.layer1.count <= 8);
        assert!(data.layer_stats.layer2.count <= 5);
        assert!(data.layer_stats.layer3.count <= 3);
        assert!(data.results.len() <= 2);
    }

    #[tokio::test]
    async fn test_query_validation() {
        let engine = engine();
        let empty = engine
            .search(SearchRequest {
                query: "  ".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(empty, Err(SearchError::Validation { .. })));

        let long = engine
            .search(SearchRequest {
                query: "q".repeat(501),
                ..Default::default()
            })
            .await;
        assert!(matches!(long, Err(SearchError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_remove_document_round_trip() {
        let engine = seeded_engine().await;
        engine.remove_document("d2").unwrap();

        let data = engine
            .search(SearchRequest {
                query: "neural networks".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(data.results.is_empty());

        assert!(matches!(
            engine.remove_document("d2"),
            Err(SearchError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_add_replaces() {
        let engine = seeded_engine().await;
        engine
            .add_document(input("d1", "Changed Title", "entirely different body text"))
            .await
            .unwrap();

        let stats = engine.stats();
        assert_eq!(stats.layer1.document_count, 2);
        assert_eq!(stats.layer2.document_count, 2);

        let data = engine
            .quick_search(&SearchRequest {
                query: "different".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(data.results.len(), 1);
        assert_eq!(data.results[0].id, "d1");
    }

    #[tokio::test]
    async fn test_semantic_add_failure_rolls_back() {
        let engine = SearchEngine::new(&Config::default(), Arc::new(StubEmbedder::failing()));
        let err = engine
            .add_document(input("d1", "Doomed", "the embedder refuses to load"))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Layer { .. }));

        let stats = engine.stats();
        assert_eq!(stats.layer1.document_count, 0);
        assert_eq!(stats.layer2.document_count, 0);
        assert_eq!(stats.layer3.vector_count, 0);
    }

    #[tokio::test]
    async fn test_find_similar_and_semantic_search() {
        let engine = seeded_engine().await;
        let similar = engine.find_similar("d1", 10).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].id, "d2");

        let hits = engine
            .semantic_search("Deep Learning neural networks with multiple layers", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "d2");
    }

    #[tokio::test]
    async fn test_find_similar_unknown_id_is_layer_error() {
        let engine = seeded_engine().await;
        let err = engine.find_similar("ghost", 10).await.unwrap_err();
        assert!(matches!(err, SearchError::Layer { .. }));
    }

    #[tokio::test]
    async fn test_health_reflects_embedder_readiness() {
        let engine = engine();
        let health = engine.health();
        assert!(health.lexical && health.relevance && health.personalization);
        assert!(!health.semantic);

        engine
            .add_document(input("d1", "Warmup", "forces the embedder to load"))
            .await
            .unwrap();
        assert!(engine.health().semantic);
    }

    #[tokio::test]
    async fn test_offset_window() {
        let engine = seeded_engine().await;
        let all = engine
            .search(SearchRequest {
                query: "learning".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.results.len(), 2);

        let paged = engine
            .search(SearchRequest {
                query: "learning".to_string(),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.total_count, 2);
        assert_eq!(paged.results.len(), 1);
        assert_eq!(paged.results[0].id, all.results[1].id);
    }
}
