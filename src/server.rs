use rmcp::{
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Implementation, ProtocolVersion, ServerCapabilities},
    tool, ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::engine::SearchEngine;
use crate::errors::SearchError;
use crate::index::BooleanOperator;
use crate::personalization::profile::{Demographics, Preferences};
use crate::personalization::{ProfileUpdate, UserProfile};
use crate::types::{DocumentInput, GeoLocation, RequestContext, SearchRequest};

pub struct SearchService {
    engine: Arc<SearchEngine>,
    start_time: Instant,
}

impl SearchService {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self {
            engine,
            start_time: Instant::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// Parameter structs

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ContextParams {
    /// Requester location for proximity boosts
    pub location: Option<GeoLocation>,
    /// ISO-8601 reference timestamp for temporal boosts (default: now)
    pub timestamp: Option<String>,
    /// Device kind: "mobile" or "desktop"
    pub device: Option<String>,
    /// Reserved for session-scoped boosts
    pub session_id: Option<String>,
    /// Earlier queries from the same session
    pub previous_queries: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SearchParams {
    /// Search query (1-500 characters, required)
    pub query: String,
    /// User id enabling profile-based personalization (optional)
    pub user_id: Option<String>,
    /// Maximum results to return (1-100, default: configured final cap)
    pub limit: Option<u32>,
    /// Results to skip for paging (default: 0)
    pub offset: Option<u32>,
    /// Reserved free-form filters (accepted, not yet consumed)
    pub filters: Option<Value>,
    /// Request context for contextual and temporal boosts (optional)
    pub context: Option<ContextParams>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct QuickSearchParams {
    /// Search query (1-500 characters, required)
    pub query: String,
    /// Maximum results to return (1-100, default: configured final cap)
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct BooleanSearchParams {
    /// Query whose tokens are combined by the operator (required)
    pub query: String,
    /// Boolean operator: AND, OR, or NOT
    pub operator: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SemanticSearchParams {
    /// Search query embedded and compared against every stored vector
    pub query: String,
    /// Maximum results to return (default: 10)
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FindSimilarParams {
    /// Document id whose stored vector anchors the similarity search
    pub document_id: String,
    /// Maximum results to return (default: 10)
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct DocumentParams {
    /// Unique document id (required)
    pub id: String,
    /// Document title (required)
    pub title: String,
    /// Document content (required)
    pub content: String,
    /// Canonical URL (optional)
    pub url: Option<String>,
    /// Category used by preference and temporal boosts (optional)
    pub category: Option<String>,
    /// Tags matched against user interests (optional)
    pub tags: Option<Vec<String>>,
    /// ISO-8601 creation timestamp (default: now)
    pub created_at: Option<String>,
    /// ISO-8601 update timestamp (default: now)
    pub updated_at: Option<String>,
    /// Free-form metadata object (optional)
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct AddDocumentsParams {
    /// Documents to index, in order
    pub documents: Vec<DocumentParams>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RemoveDocumentParams {
    /// Document id to remove (required)
    pub id: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RecordBehaviorParams {
    /// User whose profile records the action (required)
    pub user_id: String,
    /// Action kind: "click", "search", or "time_spent"
    pub action: String,
    /// Action payload: document_id for click, query for search,
    /// document_id + time_spent (ms) for time_spent
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct UpdateUserProfileParams {
    /// User id to upsert (required)
    pub user_id: String,
    /// Replacement preferences; omitted fields keep their current value
    pub preferences: Option<Preferences>,
    /// Replacement demographics; omitted fields keep their current value
    pub demographics: Option<Demographics>,
}

// Helper: convert SearchError to CallToolResult with isError: true and an
// operation code. NotInitialized always maps to INITIALIZATION_ERROR.
fn engine_error_to_result(code: &str, err: SearchError) -> CallToolResult {
    match err {
        SearchError::NotFound { id } => CallToolResult::structured_error(json!({
            "isError": true,
            "error": format!("Document not found: {}", id),
            "code": code,
            "hint": "Use stats to inspect the corpus size, or add_document to index it first"
        })),
        SearchError::Validation { message, field } => {
            let mut obj = json!({
                "isError": true,
                "error": message,
                "code": code,
            });
            if let Some(f) = field {
                obj["field"] = json!(f);
            }
            CallToolResult::structured_error(obj)
        }
        SearchError::NotInitialized(msg) => CallToolResult::structured_error(json!({
            "isError": true,
            "error": msg,
            "code": "INITIALIZATION_ERROR",
        })),
        SearchError::Layer { stage, message } => CallToolResult::structured_error(json!({
            "isError": true,
            "error": message,
            "code": code,
            "layer": stage.to_string(),
        })),
    }
}

// Helper: parse optional ISO-8601 string to DateTime<Utc>
fn parse_datetime(s: &str, field: &str) -> Result<DateTime<Utc>, CallToolResult> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            CallToolResult::structured_error(json!({
                "isError": true,
                "error": format!("Invalid datetime format for '{}': expected ISO-8601 (e.g. 2026-08-01T00:00:00Z)", field),
                "field": field
            }))
        })
}

fn parse_optional_datetime(
    value: &Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, CallToolResult> {
    match value {
        Some(s) => parse_datetime(s, field).map(Some),
        None => Ok(None),
    }
}

impl DocumentParams {
    fn into_input(self) -> Result<DocumentInput, CallToolResult> {
        let created_at = parse_optional_datetime(&self.created_at, "created_at")?;
        let updated_at = parse_optional_datetime(&self.updated_at, "updated_at")?;
        Ok(DocumentInput {
            id: self.id,
            title: self.title,
            content: self.content,
            url: self.url,
            category: self.category,
            tags: self.tags,
            created_at,
            updated_at,
            metadata: self.metadata,
        })
    }
}

impl ContextParams {
    fn into_context(self) -> Result<RequestContext, CallToolResult> {
        let timestamp = parse_optional_datetime(&self.timestamp, "context.timestamp")?;
        Ok(RequestContext {
            location: self.location,
            timestamp,
            device: self.device,
            session_id: self.session_id,
            previous_queries: self.previous_queries,
        })
    }
}

fn profile_to_json(profile: &UserProfile) -> Value {
    json!({
        "user_id": profile.user_id,
        "preferences": profile.preferences,
        "click_history_len": profile.behavior.click_history.len(),
        "search_history_len": profile.behavior.search_history.len(),
        "tracked_documents": profile.behavior.time_spent.len(),
        "demographics": profile.demographics,
        "last_updated": profile.last_updated.to_rfc3339(),
    })
}

// Tool implementations
#[rmcp::tool_router]
impl SearchService {
    #[tool(description = "Full multi-stage search: lexical candidate filtering, BM25 relevance scoring, semantic re-ranking, and personalization. Supply user_id and context to enable profile, contextual, and temporal boosts.")]
    async fn search(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            tool = "search",
            query = %params.query,
            user_id = ?params.user_id,
            limit = ?params.limit,
            "Tool called"
        );

        let context = match params.context {
            Some(ctx) => match ctx.into_context() {
                Ok(ctx) => Some(ctx),
                Err(result) => return Ok(result),
            },
            None => None,
        };

        let request = SearchRequest {
            query: params.query,
            user_id: params.user_id,
            limit: params.limit,
            offset: params.offset,
            filters: params.filters,
            context,
        };

        match self.engine.search(request).await {
            Ok(data) => Ok(CallToolResult::structured(json!({
                "success": true,
                "data": data,
            }))),
            Err(e) => Ok(engine_error_to_result("SEARCH_ERROR", e)),
        }
    }

    #[tool(description = "Lexical-only search over the inverted index. Fast candidate retrieval without scoring; use search for ranked results.")]
    async fn quick_search(
        &self,
        Parameters(params): Parameters<QuickSearchParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "quick_search", query = %params.query, "Tool called");

        let request = SearchRequest {
            query: params.query,
            limit: params.limit,
            ..Default::default()
        };

        match self.engine.quick_search(&request) {
            Ok(data) => Ok(CallToolResult::structured(json!({
                "success": true,
                "data": data,
            }))),
            Err(e) => Ok(engine_error_to_result("SEARCH_ERROR", e)),
        }
    }

    #[tool(description = "Boolean retrieval over the inverted index: AND (all tokens), OR (any token), NOT (none of the tokens).")]
    async fn boolean_search(
        &self,
        Parameters(params): Parameters<BooleanSearchParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            tool = "boolean_search",
            query = %params.query,
            operator = %params.operator,
            "Tool called"
        );

        let operator: BooleanOperator = match params.operator.parse() {
            Ok(op) => op,
            Err(e) => return Ok(engine_error_to_result("SEARCH_ERROR", e)),
        };

        match self.engine.boolean_search(&params.query, operator) {
            Ok(results) => Ok(CallToolResult::structured(json!({
                "success": true,
                "operator": params.operator.to_uppercase(),
                "total_count": results.len(),
                "results": results,
            }))),
            Err(e) => Ok(engine_error_to_result("SEARCH_ERROR", e)),
        }
    }

    #[tool(description = "Semantic search over the entire corpus by embedding similarity. Exact cosine against every stored vector, no lexical filtering.")]
    async fn semantic_search(
        &self,
        Parameters(params): Parameters<SemanticSearchParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "semantic_search", query = %params.query, "Tool called");

        let limit = params.limit.unwrap_or(10).clamp(1, 100) as usize;
        match self.engine.semantic_search(&params.query, limit).await {
            Ok(results) => Ok(CallToolResult::structured(json!({
                "success": true,
                "total_count": results.len(),
                "results": results,
            }))),
            Err(e) => Ok(engine_error_to_result("SEARCH_ERROR", e)),
        }
    }

    #[tool(description = "Find documents most similar to a stored document by embedding similarity. The document must have been added first.")]
    async fn find_similar(
        &self,
        Parameters(params): Parameters<FindSimilarParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "find_similar", document_id = %params.document_id, "Tool called");

        if params.document_id.trim().is_empty() {
            return Ok(CallToolResult::structured_error(json!({
                "isError": true,
                "error": "Field 'document_id' is required and cannot be empty",
                "field": "document_id"
            })));
        }

        let limit = params.limit.unwrap_or(10).clamp(1, 100) as usize;
        match self.engine.find_similar(&params.document_id, limit).await {
            Ok(results) => Ok(CallToolResult::structured(json!({
                "success": true,
                "document_id": params.document_id,
                "total_count": results.len(),
                "results": results,
            }))),
            Err(e) => Ok(engine_error_to_result("SEARCH_ERROR", e)),
        }
    }

    #[tool(description = "Add a single document to all search layers. Re-adding an existing id replaces the stored version.")]
    async fn add_document(
        &self,
        Parameters(params): Parameters<DocumentParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "add_document", id = %params.id, "Tool called");

        let input = match params.into_input() {
            Ok(input) => input,
            Err(result) => return Ok(result),
        };

        match self.engine.add_document(input).await {
            Ok(document) => Ok(CallToolResult::structured(json!({
                "success": true,
                "id": document.id,
                "title": document.title,
                "created_at": document.created_at.to_rfc3339(),
                "hint": "Use search or quick_search to retrieve it"
            }))),
            Err(e) => Ok(engine_error_to_result("ADD_DOCUMENT_ERROR", e)),
        }
    }

    #[tool(description = "Add a batch of documents in order. Stops at the first failure; earlier documents stay indexed.")]
    async fn add_documents(
        &self,
        Parameters(params): Parameters<AddDocumentsParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "add_documents", count = params.documents.len(), "Tool called");

        let mut inputs = Vec::with_capacity(params.documents.len());
        for doc in params.documents {
            match doc.into_input() {
                Ok(input) => inputs.push(input),
                Err(result) => return Ok(result),
            }
        }

        match self.engine.add_documents(inputs).await {
            Ok(added) => Ok(CallToolResult::structured(json!({
                "success": true,
                "added": added,
            }))),
            Err(e) => Ok(engine_error_to_result("ADD_DOCUMENT_ERROR", e)),
        }
    }

    #[tool(description = "Remove a document from all search layers by id.")]
    async fn remove_document(
        &self,
        Parameters(params): Parameters<RemoveDocumentParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "remove_document", id = %params.id, "Tool called");

        if params.id.trim().is_empty() {
            return Ok(CallToolResult::structured_error(json!({
                "isError": true,
                "error": "Field 'id' is required and cannot be empty",
                "field": "id"
            })));
        }

        match self.engine.remove_document(&params.id) {
            Ok(()) => Ok(CallToolResult::structured(json!({
                "success": true,
                "removed": true,
                "id": params.id,
            }))),
            Err(e) => Ok(engine_error_to_result("REMOVE_DOCUMENT_ERROR", e)),
        }
    }

    #[tool(description = "Record user behavior for personalization: click (document_id), search (query), or time_spent (document_id + time_spent ms). Creates the profile lazily.")]
    async fn record_behavior(
        &self,
        Parameters(params): Parameters<RecordBehaviorParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            tool = "record_behavior",
            user_id = %params.user_id,
            action = %params.action,
            "Tool called"
        );

        let data = params.data.unwrap_or_else(|| json!({}));
        match self.engine.record_behavior(&params.user_id, &params.action, &data) {
            Ok(profile) => Ok(CallToolResult::structured(json!({
                "success": true,
                "profile": profile_to_json(&profile),
            }))),
            Err(e) => Ok(engine_error_to_result("SEARCH_ERROR", e)),
        }
    }

    #[tool(description = "Create or partially update a user profile. Only the supplied sections are replaced; everything else is preserved.")]
    async fn update_user_profile(
        &self,
        Parameters(params): Parameters<UpdateUserProfileParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "update_user_profile", user_id = %params.user_id, "Tool called");

        let update = ProfileUpdate {
            preferences: params.preferences,
            demographics: params.demographics,
        };

        match self.engine.update_user_profile(&params.user_id, update) {
            Ok(profile) => Ok(CallToolResult::structured(json!({
                "success": true,
                "profile": profile_to_json(&profile),
            }))),
            Err(e) => Ok(engine_error_to_result("SEARCH_ERROR", e)),
        }
    }

    #[tool(description = "Per-layer statistics: index size, corpus averages, vector store, and personalization profiles.")]
    async fn stats(&self) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "stats", "Tool called");

        Ok(CallToolResult::structured(json!({
            "success": true,
            "stats": self.engine.stats(),
        })))
    }

    #[tool(description = "Check server health and per-layer readiness")]
    async fn health_check(&self) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "health_check", "Tool called");

        Ok(CallToolResult::structured(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": self.uptime_seconds(),
            "layers": self.engine.health(),
        })))
    }
}

// ServerHandler implementation
#[rmcp::tool_handler(router = Self::tool_router())]
impl ServerHandler for SearchService {
    fn get_info(&self) -> rmcp::model::InitializeResult {
        rmcp::model::InitializeResult {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "searchcp".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some(
                    "Multi-stage document retrieval server: inverted-index filtering, BM25 scoring, semantic re-ranking, and personalized boosts".to_string(),
                ),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Document search server. Tools: search, quick_search, boolean_search, semantic_search, find_similar, add_document, add_documents, remove_document, record_behavior, update_user_profile, stats, health_check.".to_string(),
            ),
        }
    }
}
