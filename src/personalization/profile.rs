/// In-process user profiles with bounded behavior histories.
///
/// Profiles are created lazily on the first recorded behavior and mutated in
/// place. Updates are upserts: fields missing from the input are preserved.
/// Histories are FIFO-bounded: oldest entries drop first.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SearchError;

/// Most recent clicked document ids kept per user.
pub const CLICK_HISTORY_CAP: usize = 100;
/// Most recent query strings kept per user.
pub const SEARCH_HISTORY_CAP: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Preferences {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Behavior {
    /// Recent clicked document ids, newest last
    pub click_history: Vec<String>,
    /// Recent query strings, newest last
    pub search_history: Vec<String>,
    /// Accumulated milliseconds per document id
    pub time_spent: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Demographics {
    pub age: Option<u32>,
    pub location: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub preferences: Preferences,
    pub behavior: Behavior,
    pub demographics: Option<Demographics>,
    pub last_updated: DateTime<Utc>,
}

impl UserProfile {
    fn empty(user_id: &str) -> Self {
        UserProfile {
            user_id: user_id.to_string(),
            preferences: Preferences::default(),
            behavior: Behavior::default(),
            demographics: None,
            last_updated: Utc::now(),
        }
    }
}

/// Partial profile update; only present fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub preferences: Option<Preferences>,
    pub demographics: Option<Demographics>,
}

/// A single recorded user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorEvent {
    Click { document_id: String },
    Search { query: String },
    TimeSpent { document_id: String, millis: u64 },
}

impl BehaviorEvent {
    /// Parse the wire form (`action` string + free-form `data`) into a typed
    /// event. Unknown actions and missing data fields are validation errors.
    pub fn parse(action: &str, data: &Value) -> Result<Self, SearchError> {
        match action {
            "click" => {
                let document_id = data
                    .get("document_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SearchError::validation("data.document_id", "click requires a document_id")
                    })?;
                Ok(BehaviorEvent::Click {
                    document_id: document_id.to_string(),
                })
            }
            "search" => {
                let query = data.get("query").and_then(Value::as_str).ok_or_else(|| {
                    SearchError::validation("data.query", "search requires a query")
                })?;
                Ok(BehaviorEvent::Search {
                    query: query.to_string(),
                })
            }
            "time_spent" => {
                let document_id = data
                    .get("document_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SearchError::validation(
                            "data.document_id",
                            "time_spent requires a document_id",
                        )
                    })?;
                let millis = data
                    .get("time_spent")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| {
                        SearchError::validation(
                            "data.time_spent",
                            "time_spent requires a non-negative time_spent value in milliseconds",
                        )
                    })?;
                Ok(BehaviorEvent::TimeSpent {
                    document_id: document_id.to_string(),
                    millis,
                })
            }
            other => Err(SearchError::validation(
                "action",
                &format!("Unknown action '{}': expected click, search, or time_spent", other),
            )),
        }
    }
}

/// Drop the oldest entries so at most `cap` remain.
fn trim_front(history: &mut Vec<String>, cap: usize) {
    let excess = history.len().saturating_sub(cap);
    if excess > 0 {
        history.drain(..excess);
    }
}

/// Profile store. Mutations for the same user are serialized by the write
/// lock; reads take the shared lock.
pub struct ProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl ProfileStore {
    pub fn new() -> Self {
        ProfileStore {
            profiles: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles
            .read()
            .expect("profile lock poisoned")
            .get(user_id)
            .cloned()
    }

    /// Upsert: creates an empty profile when absent, then applies only the
    /// fields present in the update.
    pub fn update(&self, user_id: &str, update: ProfileUpdate) -> UserProfile {
        let mut profiles = self.profiles.write().expect("profile lock poisoned");
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::empty(user_id));

        if let Some(preferences) = update.preferences {
            profile.preferences = preferences;
        }
        if let Some(demographics) = update.demographics {
            profile.demographics = Some(demographics);
        }
        profile.last_updated = Utc::now();
        profile.clone()
    }

    /// Record a behavior event, creating the profile lazily.
    pub fn record(&self, user_id: &str, event: BehaviorEvent) -> UserProfile {
        let mut profiles = self.profiles.write().expect("profile lock poisoned");
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::empty(user_id));

        match event {
            BehaviorEvent::Click { document_id } => {
                if !profile.behavior.click_history.contains(&document_id) {
                    profile.behavior.click_history.push(document_id);
                }
                trim_front(&mut profile.behavior.click_history, CLICK_HISTORY_CAP);
            }
            BehaviorEvent::Search { query } => {
                profile.behavior.search_history.push(query);
                trim_front(&mut profile.behavior.search_history, SEARCH_HISTORY_CAP);
            }
            BehaviorEvent::TimeSpent { document_id, millis } => {
                *profile.behavior.time_spent.entry(document_id).or_insert(0) += millis;
            }
        }
        profile.last_updated = Utc::now();
        profile.clone()
    }

    pub fn count(&self) -> usize {
        self.profiles.read().expect("profile lock poisoned").len()
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}
