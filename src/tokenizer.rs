/// Shared tokenizer/normalizer for indexing and querying.
///
/// The same function feeds Stage-1 indexing, Stage-2 term counting, and query
/// parsing, so any change here applies everywhere simultaneously. Pure and
/// deterministic: no process state is consulted.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Fixed English stop-word set. Tokens in this set are dropped.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let words: &[&str] = &[
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did",
        "will", "would", "could", "should", "may", "might", "can", "this", "that", "these",
        "those", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
    ];
    words.iter().copied().collect()
});

/// Tokenize raw text into an ordered sequence of accepted tokens.
///
/// Steps: lowercase, split on non-word characters (anything that is not
/// alphanumeric or underscore), drop tokens of length <= 2, drop stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() > 2)
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}
