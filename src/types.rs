/// Core data model shared across the cascade stages.
///
/// `Document` is the stored form (all fields concrete); `DocumentInput` is the
/// add-time payload where timestamps default to now. Results flow between
/// Stage-2/3/4 as `SearchResult` with a free-form metadata object that carries
/// the document's own metadata plus per-stage diagnostics.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Maximum characters of content carried on a materialized result.
pub const EXCERPT_CHARS: usize = 200;

/// A document as stored by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier (caller-supplied)
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form metadata (JSON object); boost rules read the documented keys
    /// (age_group, mobile_optimized, desktop_optimized, location.{lat,lng})
    pub metadata: Option<Value>,
}

/// Add-time payload for a document. Timestamps are optional and default to
/// the time of ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

impl DocumentInput {
    pub fn into_document(self) -> Document {
        let now = Utc::now();
        Document {
            id: self.id,
            title: self.title,
            content: self.content,
            url: self.url,
            category: self.category,
            tags: self.tags,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
            metadata: self.metadata,
        }
    }
}

/// Geographic point attached to a request context or document metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
    /// Accepted for forward compatibility; the location boost ignores it
    pub radius: Option<f64>,
}

/// Per-request context consumed by the Stage-4 contextual boost.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub location: Option<GeoLocation>,
    /// Reference clock for temporal boosts; defaults to now when absent
    pub timestamp: Option<DateTime<Utc>>,
    /// "mobile" or "desktop"; anything else contributes no device boost
    pub device: Option<String>,
    /// Reserved; contributes no boost in this version
    pub session_id: Option<String>,
    pub previous_queries: Option<Vec<String>>,
}

/// A full-cascade search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub user_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Accepted for forward compatibility; no stage consumes filters yet
    pub filters: Option<Value>,
    pub context: Option<RequestContext>,
}

/// A single ranked result. `content` is an excerpt truncated to
/// [`EXCERPT_CHARS`]; `metadata` merges document metadata with stage
/// diagnostics (score breakdown, similarity, boost values).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub score: f64,
    pub metadata: Value,
}

/// Count and wall-clock time for one cascade stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LayerStat {
    pub count: usize,
    pub execution_time_ms: u64,
}

impl LayerStat {
    pub fn new(count: usize, execution_time_ms: u64) -> Self {
        LayerStat {
            count,
            execution_time_ms,
        }
    }
}

/// Per-stage observability for a single search request. Stages that never ran
/// (short-circuited cascade) report zero counts and timings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LayerStats {
    pub layer1: LayerStat,
    pub layer2: LayerStat,
    pub layer3: LayerStat,
    pub layer4: LayerStat,
}

/// Successful search payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchData {
    pub results: Vec<SearchResult>,
    pub total_count: usize,
    pub execution_time_ms: u64,
    /// Sum of the personalization weights that applied to this request,
    /// clamped to 1.0
    pub personalization_score: f64,
    pub layer_stats: LayerStats,
}

impl SearchData {
    /// An empty result set with whatever layer stats were gathered before the
    /// cascade short-circuited. Not an error.
    pub fn empty(execution_time_ms: u64, layer_stats: LayerStats) -> Self {
        SearchData {
            results: Vec::new(),
            total_count: 0,
            execution_time_ms,
            personalization_score: 0.0,
            layer_stats,
        }
    }
}

/// Truncate content to [`EXCERPT_CHARS`] characters, appending an ellipsis
/// when anything was cut.
pub fn excerpt(content: &str) -> String {
    let mut out: String = content.chars().take(EXCERPT_CHARS).collect();
    if content.chars().count() > EXCERPT_CHARS {
        out.push('…');
    }
    out
}

/// Materialize a result from a stored document. Document metadata is carried
/// over (when it is a JSON object) and the first-class fields the boost rules
/// read are injected alongside it.
pub fn materialize(document: &Document, score: f64) -> SearchResult {
    let mut metadata = match &document.metadata {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => json!({}),
    };
    if let Some(cat) = &document.category {
        metadata["category"] = json!(cat);
    }
    if let Some(tags) = &document.tags {
        metadata["tags"] = json!(tags);
    }
    metadata["created_at"] = json!(document.created_at.to_rfc3339());

    SearchResult {
        id: document.id.clone(),
        title: document.title.clone(),
        content: excerpt(&document.content),
        url: document.url.clone(),
        score,
        metadata,
    }
}
