/// Stage-4 personalization re-ranker.
///
/// Applies three independent boost phases (user profile, request context,
/// temporal), each expressed as a fraction of the incoming score and scaled
/// by its configured weight, then re-sorts and truncates to the final cap.
/// The location part of the context phase carries its own fixed weight.
///
/// Per-phase boost values are written into each result's metadata for
/// observability; a request-level personalization score reports which
/// weights applied.

pub mod boost;
pub mod profile;

pub use profile::{BehaviorEvent, ProfileStore, ProfileUpdate, UserProfile};

use std::cmp::Ordering;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::types::{RequestContext, SearchResult};

/// Weight applied to the location boost, independent of the context weight.
pub const LOCATION_WEIGHT: f64 = 0.1;

/// Configured boost weights for the three phases.
#[derive(Debug, Clone, Copy)]
pub struct PersonalizationWeights {
    pub user_profile: f64,
    pub context: f64,
    pub temporal: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonalizationStats {
    pub profile_count: usize,
    pub user_profile_weight: f64,
    pub context_weight: f64,
    pub temporal_weight: f64,
}

pub struct PersonalizationReranker {
    profiles: ProfileStore,
    weights: PersonalizationWeights,
    max_results: usize,
}

impl PersonalizationReranker {
    pub fn new(weights: PersonalizationWeights, max_results: usize) -> Self {
        PersonalizationReranker {
            profiles: ProfileStore::new(),
            weights,
            max_results,
        }
    }

    /// Re-rank Stage-3 results for a user/context pair. Returns the final
    /// list (truncated to `min(limit, max_results)`) and the request-level
    /// personalization score.
    pub fn rerank(
        &self,
        mut results: Vec<SearchResult>,
        user_id: Option<&str>,
        context: Option<&RequestContext>,
        limit: usize,
    ) -> (Vec<SearchResult>, f64) {
        let now = context
            .and_then(|c| c.timestamp)
            .unwrap_or_else(Utc::now);
        let user_profile = user_id.and_then(|id| self.profiles.get(id));

        for result in &mut results {
            let profile_boost = match &user_profile {
                Some(profile) => {
                    let b = boost::user_profile_boost(profile, result);
                    result.score += result.score * b * self.weights.user_profile;
                    b
                }
                None => 0.0,
            };

            let context_boost = match context {
                Some(ctx) => {
                    let (location, other) = boost::contextual_boosts(ctx, result);
                    result.score +=
                        result.score * (location * LOCATION_WEIGHT + other * self.weights.context);
                    location + other
                }
                None => 0.0,
            };

            let temporal = boost::temporal_boost(result, now);
            result.score += result.score * temporal * self.weights.temporal;

            result.metadata["personalization_boost"] = json!(profile_boost);
            result.metadata["context_boost"] = json!(context_boost);
            result.metadata["temporal_boost"] = json!(temporal);
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(limit.min(self.max_results));

        let mut score = self.weights.temporal;
        if user_id.is_some() {
            score += self.weights.user_profile;
        }
        if context.is_some() {
            score += self.weights.context;
        }
        (results, score.min(1.0))
    }

    pub fn record_behavior(&self, user_id: &str, event: BehaviorEvent) -> UserProfile {
        self.profiles.record(user_id, event)
    }

    pub fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> UserProfile {
        self.profiles.update(user_id, update)
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.get(user_id)
    }

    pub fn stats(&self) -> PersonalizationStats {
        PersonalizationStats {
            profile_count: self.profiles.count(),
            user_profile_weight: self.weights.user_profile,
            context_weight: self.weights.context,
            temporal_weight: self.weights.temporal,
        }
    }
}
