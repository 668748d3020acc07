/// Stage-3 semantic re-ranker.
///
/// Stores one dense vector per document (plus a metadata snapshot) and fuses
/// Stage-2 relevance with cosine similarity under a fixed linear blend.
/// Similarity is exact over the candidate set (no approximate index); the
/// standalone semantic search is O(N * D) per query.
///
/// All stored vectors must share one dimension; cosine rejects mismatches.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::embedding::{build_embedding_text, Embedder};
use crate::errors::{SearchError, Stage};
use crate::types::{Document, SearchResult};

/// Weight of the Stage-2 relevance score in the fused score.
pub const FUSION_LEXICAL_WEIGHT: f64 = 0.6;
/// Weight of cosine similarity in the fused score.
pub const FUSION_SEMANTIC_WEIGHT: f64 = 0.4;

/// Snapshot of the originating document, captured at embed time.
#[derive(Debug, Clone, Serialize)]
pub struct VectorMetadata {
    pub title: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

struct StoredVector {
    vector: Vec<f32>,
    snapshot: VectorMetadata,
}

/// (id, similarity) pair reported alongside re-ranked results.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityHit {
    pub id: String,
    pub similarity: f64,
}

/// A standalone semantic-search hit with the stored snapshot.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub id: String,
    pub similarity: f64,
    pub snapshot: VectorMetadata,
}

/// Vector-store statistics for observability.
#[derive(Debug, Clone, Serialize)]
pub struct VectorStats {
    pub vector_count: usize,
    pub dimension: usize,
    pub model: String,
    pub ready: bool,
}

/// Stage-3 re-ranker over an in-process vector store.
pub struct SemanticReranker {
    embedder: Arc<dyn Embedder>,
    vectors: RwLock<HashMap<String, StoredVector>>,
    max_results: usize,
}

impl SemanticReranker {
    pub fn new(embedder: Arc<dyn Embedder>, max_results: usize) -> Self {
        SemanticReranker {
            embedder,
            vectors: RwLock::new(HashMap::new()),
            max_results,
        }
    }

    /// Trigger the embedder load (at-most-once) without embedding anything.
    pub async fn ensure_ready(&self) -> Result<(), SearchError> {
        self.embedder.ensure_loaded().await.map_err(Into::into)
    }

    /// Embed `title + " " + content` and store the vector with a snapshot of
    /// the document's descriptive fields.
    pub async fn add_document(&self, document: &Document) -> Result<(), SearchError> {
        let text = build_embedding_text(&document.title, &document.content);
        let vector = self.embedder.embed(&text).await?;

        let snapshot = VectorMetadata {
            title: document.title.clone(),
            category: document.category.clone(),
            created_at: document.created_at,
            metadata: document.metadata.clone(),
        };

        self.vectors
            .write()
            .expect("vector store lock poisoned")
            .insert(document.id.clone(), StoredVector { vector, snapshot });
        Ok(())
    }

    /// Returns false if no vector was stored for the id.
    pub fn remove_document(&self, id: &str) -> bool {
        self.vectors
            .write()
            .expect("vector store lock poisoned")
            .remove(id)
            .is_some()
    }

    /// Re-rank Stage-2 results: embed the query, pair each result with its
    /// cosine similarity (0.0 when no vector is stored), fuse, re-sort, and
    /// truncate. The similarity list is returned sorted descending for
    /// observability.
    pub async fn rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
    ) -> Result<(Vec<SearchResult>, Vec<SimilarityHit>), SearchError> {
        let query_vector = self.embedder.embed(query).await?;

        let mut similarities = Vec::with_capacity(results.len());
        {
            let vectors = self.vectors.read().expect("vector store lock poisoned");
            for result in &mut results {
                let similarity = match vectors.get(&result.id) {
                    Some(stored) => cosine_similarity(&query_vector, &stored.vector)?,
                    None => 0.0,
                };
                similarities.push(SimilarityHit {
                    id: result.id.clone(),
                    similarity,
                });

                let relevance = result.score;
                result.score =
                    FUSION_LEXICAL_WEIGHT * relevance + FUSION_SEMANTIC_WEIGHT * similarity;
                result.metadata["relevance_score"] = json!(relevance);
                result.metadata["similarity"] = json!(similarity);
            }
        }

        similarities.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(self.max_results);

        Ok((results, similarities))
    }

    /// Standalone semantic search: score the query against every stored
    /// vector and return the top `limit` by similarity.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SemanticHit>, SearchError> {
        let query_vector = self.embedder.embed(query).await?;

        let vectors = self.vectors.read().expect("vector store lock poisoned");
        let mut hits = Vec::with_capacity(vectors.len());
        for (id, stored) in vectors.iter() {
            hits.push(SemanticHit {
                id: id.clone(),
                similarity: cosine_similarity(&query_vector, &stored.vector)?,
                snapshot: stored.snapshot.clone(),
            });
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Documents most similar to a stored one, excluding itself. Asking for
    /// an id without a vector is client misuse and fails with a layer error.
    pub fn find_similar(&self, id: &str, limit: usize) -> Result<Vec<SemanticHit>, SearchError> {
        let vectors = self.vectors.read().expect("vector store lock poisoned");

        let Some(source) = vectors.get(id) else {
            return Err(SearchError::layer(
                Stage::Semantic,
                format!("no vector stored for document '{}'", id),
            ));
        };

        let mut hits = Vec::with_capacity(vectors.len().saturating_sub(1));
        for (other_id, stored) in vectors.iter() {
            if other_id == id {
                continue;
            }
            hits.push(SemanticHit {
                id: other_id.clone(),
                similarity: cosine_similarity(&source.vector, &stored.vector)?,
                snapshot: stored.snapshot.clone(),
            });
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vectors
            .read()
            .expect("vector store lock poisoned")
            .contains_key(id)
    }

    pub fn is_ready(&self) -> bool {
        self.embedder.is_ready()
    }

    pub fn stats(&self) -> VectorStats {
        VectorStats {
            vector_count: self
                .vectors
                .read()
                .expect("vector store lock poisoned")
                .len(),
            dimension: self.embedder.dimension(),
            model: self.embedder.model_name().to_string(),
            ready: self.embedder.is_ready(),
        }
    }
}

/// Cosine similarity. Both inputs are expected to be unit vectors, but the
/// norms are divided out anyway; zero-norm input yields 0.0. Mismatched
/// dimensions are rejected.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, SearchError> {
    if a.len() != b.len() {
        return Err(SearchError::layer(
            Stage::Semantic,
            format!("vector dimension mismatch: {} vs {}", a.len(), b.len()),
        ));
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
