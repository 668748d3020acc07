/// Stage-1 lexical candidate filter backed by an inverted index.
///
/// Maintains term -> (document id set, per-document term frequency); document
/// frequency is always the size of the id set. Candidate retrieval is the
/// union of posting lists for the query tokens, truncated to the configured
/// cap. Boolean retrieval supports AND / OR / NOT over the same postings.
///
/// All scoring is left to later stages; this layer only narrows the corpus.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::errors::SearchError;
use crate::tokenizer::tokenize;
use crate::types::Document;

/// Boolean retrieval operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BooleanOperator {
    And,
    Or,
    Not,
}

impl FromStr for BooleanOperator {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(BooleanOperator::And),
            "OR" => Ok(BooleanOperator::Or),
            "NOT" => Ok(BooleanOperator::Not),
            other => Err(SearchError::validation(
                "operator",
                &format!("Unknown boolean operator '{}': expected AND, OR, or NOT", other),
            )),
        }
    }
}

/// Postings for a single term.
#[derive(Debug, Default)]
struct TermEntry {
    doc_ids: HashSet<String>,
    term_frequency: HashMap<String, u32>,
}

impl TermEntry {
    /// Document frequency is derived, never stored separately.
    #[cfg(test)]
    fn document_frequency(&self) -> usize {
        self.doc_ids.len()
    }
}

#[derive(Default)]
struct IndexState {
    terms: HashMap<String, TermEntry>,
    documents: HashMap<String, Document>,
    total_tokens: u64,
}

/// Index-wide statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub unique_terms: usize,
    pub total_tokens: u64,
    pub avg_tokens_per_document: f64,
}

/// Stage-1 inverted index. Interior locking: exclusive on mutation, shared on
/// reads.
pub struct InvertedIndex {
    state: RwLock<IndexState>,
    max_candidates: usize,
}

impl InvertedIndex {
    pub fn new(max_candidates: usize) -> Self {
        InvertedIndex {
            state: RwLock::new(IndexState::default()),
            max_candidates,
        }
    }

    /// Index a document. Title tokens precede content tokens; positions are
    /// not retained.
    pub fn add_document(&self, document: &Document) {
        let tokens = tokenize(&format!("{} {}", document.title, document.content));
        let mut state = self.state.write().expect("index lock poisoned");

        for token in &tokens {
            let entry = state.terms.entry(token.clone()).or_default();
            entry.doc_ids.insert(document.id.clone());
            *entry.term_frequency.entry(document.id.clone()).or_insert(0) += 1;
        }

        state.total_tokens += tokens.len() as u64;
        state.documents.insert(document.id.clone(), document.clone());
    }

    /// Remove a document, recomputing its token list from the stored copy.
    /// Returns false if the id is unknown.
    pub fn remove_document(&self, id: &str) -> bool {
        let mut state = self.state.write().expect("index lock poisoned");

        let Some(document) = state.documents.remove(id) else {
            return false;
        };

        let tokens = tokenize(&format!("{} {}", document.title, document.content));
        let unique: HashSet<&String> = tokens.iter().collect();

        for token in unique {
            let now_empty = match state.terms.get_mut(token) {
                Some(entry) => {
                    entry.doc_ids.remove(id);
                    entry.term_frequency.remove(id);
                    entry.doc_ids.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.terms.remove(token);
            }
        }

        state.total_tokens = state.total_tokens.saturating_sub(tokens.len() as u64);
        true
    }

    /// Candidate retrieval: union of posting lists for all query tokens,
    /// truncated to the cap. Truncation order follows map iteration:
    /// deterministic within a run, unspecified across runs.
    pub fn candidates(&self, query: &str) -> Vec<String> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let state = self.state.read().expect("index lock poisoned");
        let mut union: HashSet<&String> = HashSet::new();
        for token in &tokens {
            if let Some(entry) = state.terms.get(token) {
                union.extend(entry.doc_ids.iter());
            }
        }

        let mut out: Vec<String> = union.into_iter().cloned().collect();
        out.truncate(self.max_candidates);
        out
    }

    /// Boolean retrieval over the query tokens.
    pub fn boolean_search(&self, query: &str, operator: BooleanOperator) -> Vec<String> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let state = self.state.read().expect("index lock poisoned");

        match operator {
            BooleanOperator::Or => {
                let mut union: HashSet<&String> = HashSet::new();
                for token in &tokens {
                    if let Some(entry) = state.terms.get(token) {
                        union.extend(entry.doc_ids.iter());
                    }
                }
                union.into_iter().cloned().collect()
            }
            BooleanOperator::And => {
                let mut postings = Vec::with_capacity(tokens.len());
                for token in &tokens {
                    match state.terms.get(token) {
                        Some(entry) => postings.push(&entry.doc_ids),
                        // Any token without postings empties the intersection
                        None => return Vec::new(),
                    }
                }
                let (first, rest) = postings.split_first().expect("tokens is non-empty");
                first
                    .iter()
                    .filter(|id| rest.iter().all(|set| set.contains(*id)))
                    .cloned()
                    .collect()
            }
            BooleanOperator::Not => {
                let mut excluded: HashSet<&String> = HashSet::new();
                for token in &tokens {
                    if let Some(entry) = state.terms.get(token) {
                        excluded.extend(entry.doc_ids.iter());
                    }
                }
                state
                    .documents
                    .keys()
                    .filter(|id| !excluded.contains(id))
                    .cloned()
                    .collect()
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state
            .read()
            .expect("index lock poisoned")
            .documents
            .contains_key(id)
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read().expect("index lock poisoned");
        let document_count = state.documents.len();
        let avg = if document_count == 0 {
            0.0
        } else {
            state.total_tokens as f64 / document_count as f64
        };
        IndexStats {
            document_count,
            unique_terms: state.terms.len(),
            total_tokens: state.total_tokens,
            avg_tokens_per_document: avg,
        }
    }

    /// Verify the posting-list invariant for every term entry:
    /// df == |doc_ids| == |term_frequency| and every id refers to a stored
    /// document. Used by tests; a violation is an internal defect.
    #[cfg(test)]
    fn check_invariants(&self) {
        let state = self.state.read().expect("index lock poisoned");
        for (term, entry) in &state.terms {
            assert_eq!(
                entry.document_frequency(),
                entry.doc_ids.len(),
                "df mismatch for term {term}"
            );
            assert_eq!(
                entry.doc_ids.len(),
                entry.term_frequency.len(),
                "tf keys mismatch for term {term}"
            );
            for id in &entry.doc_ids {
                assert!(
                    state.documents.contains_key(id),
                    "dangling id {id} in postings of {term}"
                );
            }
        }
    }
}
