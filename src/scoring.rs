/// Stage-2 probabilistic relevance scorer.
///
/// Keeps its own copy of the corpus and tokenizes independently of Stage-1, so
/// the two layers never reach into each other's maps. Term frequencies for a
/// query are recomputed by re-tokenizing the stored document; no cache.
///
/// BM25 is the default; TF-IDF is a drop-in alternative with the same
/// signature. Documents with zero total score are omitted from the ranking.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::tokenizer::tokenize;
use crate::types::{materialize, Document, SearchResult};

/// Which relevance formula Stage-2 applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    #[default]
    Bm25,
    TfIdf,
}

/// Corpus-level statistics exposed for observability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorpusStats {
    pub document_count: usize,
    pub unique_terms: usize,
    pub avg_document_length: f64,
    pub method: ScoringMethod,
}

#[derive(Default)]
struct CorpusState {
    documents: HashMap<String, Document>,
    doc_lengths: HashMap<String, usize>,
    doc_frequency: HashMap<String, u32>,
    total_length: u64,
}

impl CorpusState {
    fn avg_document_length(&self) -> f64 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.documents.len() as f64
        }
    }
}

/// Stage-2 scorer with its own document store and frequency tables.
pub struct RelevanceScorer {
    state: RwLock<CorpusState>,
    method: ScoringMethod,
    k1: f64,
    b: f64,
    max_results: usize,
}

impl RelevanceScorer {
    pub fn new(method: ScoringMethod, k1: f64, b: f64, max_results: usize) -> Self {
        RelevanceScorer {
            state: RwLock::new(CorpusState::default()),
            method,
            k1,
            b,
            max_results,
        }
    }

    pub fn add_document(&self, document: &Document) {
        let tokens = tokenize(&format!("{} {}", document.title, document.content));
        let unique: HashSet<&String> = tokens.iter().collect();

        let mut state = self.state.write().expect("scorer lock poisoned");
        for token in unique {
            *state.doc_frequency.entry(token.clone()).or_insert(0) += 1;
        }
        state.doc_lengths.insert(document.id.clone(), tokens.len());
        state.total_length += tokens.len() as u64;
        state.documents.insert(document.id.clone(), document.clone());
    }

    /// Returns false if the id is unknown. Document-frequency entries that
    /// reach zero are deleted; average length is recomputed implicitly.
    pub fn remove_document(&self, id: &str) -> bool {
        let mut state = self.state.write().expect("scorer lock poisoned");

        let Some(document) = state.documents.remove(id) else {
            return false;
        };

        let tokens = tokenize(&format!("{} {}", document.title, document.content));
        let unique: HashSet<&String> = tokens.iter().collect();

        for token in unique {
            let now_zero = match state.doc_frequency.get_mut(token) {
                Some(df) => {
                    *df = df.saturating_sub(1);
                    *df == 0
                }
                None => false,
            };
            if now_zero {
                state.doc_frequency.remove(token);
            }
        }

        state.doc_lengths.remove(id);
        state.total_length = state.total_length.saturating_sub(tokens.len() as u64);
        true
    }

    /// Score the candidate set against the query and return ranked,
    /// materialized results. Each result's metadata carries the per-term
    /// score breakdown and the document length.
    pub fn score(&self, query: &str, candidate_ids: &[String]) -> Vec<SearchResult> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || candidate_ids.is_empty() {
            return Vec::new();
        }

        let state = self.state.read().expect("scorer lock poisoned");
        let n = state.documents.len() as f64;
        let avgdl = state.avg_document_length();

        let mut scored: Vec<SearchResult> = Vec::new();
        for id in candidate_ids {
            let Some(document) = state.documents.get(id) else {
                continue;
            };

            let doc_tokens = tokenize(&format!("{} {}", document.title, document.content));
            let doc_len = doc_tokens.len();
            let mut term_counts: HashMap<&str, u32> = HashMap::new();
            for token in &doc_tokens {
                *term_counts.entry(token.as_str()).or_insert(0) += 1;
            }

            let mut total = 0.0;
            let mut breakdown = serde_json::Map::new();
            for term in &query_tokens {
                let tf = term_counts.get(term.as_str()).copied().unwrap_or(0);
                let df = state.doc_frequency.get(term).copied().unwrap_or(0);
                if tf == 0 || df == 0 {
                    continue;
                }
                let partial = match self.method {
                    ScoringMethod::Bm25 => {
                        self.bm25_term(tf as f64, df as f64, n, doc_len as f64, avgdl)
                    }
                    ScoringMethod::TfIdf => tf_idf_term(tf as f64, df as f64, n, doc_len as f64),
                };
                total += partial;
                breakdown.insert(term.clone(), serde_json::json!(partial));
            }

            if total > 0.0 {
                let mut result = materialize(document, total);
                result.metadata["score_breakdown"] = serde_json::Value::Object(breakdown);
                result.metadata["document_length"] = serde_json::json!(doc_len);
                scored.push(result);
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.max_results);
        scored
    }

    /// BM25 partial score for one term.
    ///
    /// idf(t) = ln(1 + (N - df + 0.5) / (df + 0.5)). The smoothed form keeps
    /// the idf positive, so a zero total score means no query term matched.
    /// partial = idf * tf * (k1 + 1) / (tf + k1 * (1 - b + b * |d| / avgdl))
    fn bm25_term(&self, tf: f64, df: f64, n: f64, doc_len: f64, avgdl: f64) -> f64 {
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
        let norm = if avgdl > 0.0 { doc_len / avgdl } else { 0.0 };
        idf * (tf * (self.k1 + 1.0)) / (tf + self.k1 * (1.0 - self.b + self.b * norm))
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.state
            .read()
            .expect("scorer lock poisoned")
            .documents
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state
            .read()
            .expect("scorer lock poisoned")
            .documents
            .contains_key(id)
    }

    pub fn stats(&self) -> CorpusStats {
        let state = self.state.read().expect("scorer lock poisoned");
        CorpusStats {
            document_count: state.documents.len(),
            unique_terms: state.doc_frequency.len(),
            avg_document_length: state.avg_document_length(),
            method: self.method,
        }
    }
}

/// TF-IDF partial score: (tf / |d|) * ln(N / df)
fn tf_idf_term(tf: f64, df: f64, n: f64, doc_len: f64) -> f64 {
    if doc_len == 0.0 {
        return 0.0;
    }
    (tf / doc_len) * (n / df).ln()
}
