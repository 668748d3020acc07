/// Pure boost functions for the personalization re-ranker.
///
/// Every function here is side-effect free: profile, context, and result
/// fields in, a boost fraction out. The re-ranker in mod.rs owns weighting
/// and score application.
///
/// Boost rules read only documented metadata keys: category, tags,
/// created_at, age_group, mobile_optimized, desktop_optimized,
/// location.{lat,lng}.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde_json::Value;

use crate::types::{RequestContext, SearchResult};

use super::profile::UserProfile;

pub const CATEGORY_PREFERENCE_BOOST: f64 = 0.20;
pub const CLICK_MEMORY_BOOST: f64 = 0.15;
pub const SEARCH_OVERLAP_PER_HIT: f64 = 0.05;
pub const SEARCH_OVERLAP_CAP: f64 = 0.20;
pub const TIME_SPENT_CAP: f64 = 0.10;
pub const AGE_MATCH_BOOST: f64 = 0.10;
pub const INTEREST_MATCH_BOOST: f64 = 0.15;

pub const DEVICE_MOBILE_BOOST: f64 = 0.10;
pub const DEVICE_DESKTOP_BOOST: f64 = 0.05;
pub const QUERY_OVERLAP_PER_HIT: f64 = 0.03;
pub const QUERY_OVERLAP_CAP: f64 = 0.10;

pub const HOUR_OF_DAY_BOOST: f64 = 0.05;
pub const DAY_OF_WEEK_BOOST: f64 = 0.03;

const EARTH_RADIUS_KM: f64 = 6371.0;

// ---------------------------------------------------------------------------
// User-profile boost
// ---------------------------------------------------------------------------

/// Sum of all profile-match contributions for one result.
pub fn user_profile_boost(profile: &UserProfile, result: &SearchResult) -> f64 {
    let mut boost = 0.0;

    if let Some(category) = result.metadata.get("category").and_then(Value::as_str) {
        if profile.preferences.categories.iter().any(|c| c == category) {
            boost += CATEGORY_PREFERENCE_BOOST;
        }
    }

    if profile.behavior.click_history.contains(&result.id) {
        boost += CLICK_MEMORY_BOOST;
    }

    boost += word_overlap_boost(
        &profile.behavior.search_history,
        &format!("{} {}", result.title, result.content),
        SEARCH_OVERLAP_PER_HIT,
        SEARCH_OVERLAP_CAP,
    );

    if let Some(millis) = profile.behavior.time_spent.get(&result.id) {
        boost += (*millis as f64 / 1000.0).min(TIME_SPENT_CAP);
    }

    if let Some(demographics) = &profile.demographics {
        if let (Some(age), Some(group)) = (
            demographics.age,
            result.metadata.get("age_group").and_then(Value::as_str),
        ) {
            if age_group_matches(age, group) {
                boost += AGE_MATCH_BOOST;
            }
        }

        boost += interest_boost(&demographics.interests, result_tags(result));
    }

    boost
}

/// +0.05 per space-split word of any past query found in the text
/// (lowercased substring match), capped overall.
pub fn word_overlap_boost(queries: &[String], text: &str, per_hit: f64, cap: f64) -> f64 {
    if queries.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let mut hits = 0usize;
    for query in queries {
        for word in query.to_lowercase().split_whitespace() {
            if haystack.contains(word) {
                hits += 1;
            }
        }
    }
    (hits as f64 * per_hit).min(cap)
}

/// Age buckets: teen 13-19, young_adult 20-30, adult 31-50, senior 51-100.
pub fn age_group_matches(age: u32, group: &str) -> bool {
    let (lo, hi) = match group {
        "teen" => (13, 19),
        "young_adult" => (20, 30),
        "adult" => (31, 50),
        "senior" => (51, 100),
        _ => return false,
    };
    (lo..=hi).contains(&age)
}

/// Fraction of user interests matched against result tags (case-insensitive
/// substring), scaled by the interest weight.
pub fn interest_boost(interests: &[String], tags: Vec<String>) -> f64 {
    if interests.is_empty() || tags.is_empty() {
        return 0.0;
    }
    let tags_lower: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    let matched = interests
        .iter()
        .filter(|interest| {
            let needle = interest.to_lowercase();
            tags_lower.iter().any(|tag| tag.contains(&needle))
        })
        .count();
    INTEREST_MATCH_BOOST * matched as f64 / interests.len() as f64
}

fn result_tags(result: &SearchResult) -> Vec<String> {
    result
        .metadata
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Contextual boost
// ---------------------------------------------------------------------------

/// Location and non-location contributions from the request context,
/// returned separately: the location part carries its own fixed weight.
pub fn contextual_boosts(context: &RequestContext, result: &SearchResult) -> (f64, f64) {
    let mut location = 0.0;
    if let (Some(user_location), Some((lat, lng))) =
        (&context.location, result_location(result))
    {
        let distance = haversine_km(user_location.lat, user_location.lng, lat, lng);
        location = location_boost(distance);
    }

    let mut other = 0.0;
    if let Some(device) = context.device.as_deref() {
        other += device_boost(device, &result.metadata);
    }
    // session_id is reserved and contributes nothing in this version
    if let Some(previous) = &context.previous_queries {
        other += word_overlap_boost(
            previous,
            &format!("{} {}", result.title, result.content),
            QUERY_OVERLAP_PER_HIT,
            QUERY_OVERLAP_CAP,
        );
    }

    (location, other)
}

/// Great-circle distance in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Tiered proximity boost; the request radius has no effect.
pub fn location_boost(distance_km: f64) -> f64 {
    if distance_km < 1.0 {
        0.20
    } else if distance_km < 5.0 {
        0.10
    } else if distance_km < 10.0 {
        0.05
    } else {
        0.0
    }
}

pub fn device_boost(device: &str, metadata: &Value) -> f64 {
    let flag = |key: &str| metadata.get(key).and_then(Value::as_bool).unwrap_or(false);
    match device {
        "mobile" if flag("mobile_optimized") => DEVICE_MOBILE_BOOST,
        "desktop" if flag("desktop_optimized") => DEVICE_DESKTOP_BOOST,
        _ => 0.0,
    }
}

fn result_location(result: &SearchResult) -> Option<(f64, f64)> {
    let location = result.metadata.get("location")?;
    let lat = location.get("lat").and_then(Value::as_f64)?;
    let lng = location.get("lng").and_then(Value::as_f64)?;
    Some((lat, lng))
}

// ---------------------------------------------------------------------------
// Temporal boost
// ---------------------------------------------------------------------------

/// Hour-of-day, day-of-week, and recency contributions, evaluated at `now`.
pub fn temporal_boost(result: &SearchResult, now: DateTime<Utc>) -> f64 {
    let mut boost = 0.0;

    if let Some(category) = result.metadata.get("category").and_then(Value::as_str) {
        boost += hour_of_day_boost(category, now.hour());
        boost += day_of_week_boost(category, now.weekday());
    }

    if let Some(created_at) = result
        .metadata
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        boost += recency_boost(created_at.with_timezone(&Utc), now);
    }

    boost
}

pub fn hour_of_day_boost(category: &str, hour: u32) -> f64 {
    let hours: &[u32] = match category {
        "news" => &[6, 7, 8, 18, 19, 20],
        "entertainment" => &[19, 20, 21, 22, 23],
        "work" => &[9, 10, 11, 14, 15, 16],
        "shopping" => &[10, 11, 12, 15, 16, 17, 20, 21],
        _ => return 0.0,
    };
    if hours.contains(&hour) {
        HOUR_OF_DAY_BOOST
    } else {
        0.0
    }
}

pub fn day_of_week_boost(category: &str, day: Weekday) -> f64 {
    let matches = match category {
        "news" => true,
        "work" => !matches!(day, Weekday::Sat | Weekday::Sun),
        "entertainment" => matches!(day, Weekday::Fri | Weekday::Sat | Weekday::Sun),
        "shopping" => matches!(day, Weekday::Sat | Weekday::Sun),
        _ => false,
    };
    if matches {
        DAY_OF_WEEK_BOOST
    } else {
        0.0
    }
}

/// Recency tiers over the document's age in hours.
pub fn recency_boost(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = (now - created_at).num_seconds() as f64 / 3600.0;
    if age_hours < 0.0 {
        return 0.0;
    }
    if age_hours < 1.0 {
        0.10
    } else if age_hours < 24.0 {
        0.05
    } else if age_hours < 168.0 {
        0.02
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personalization::profile::{Behavior, Demographics, Preferences};
    use crate::types::GeoLocation;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn result_with_metadata(metadata: Value) -> SearchResult {
        SearchResult {
            id: "d1".to_string(),
            title: "Machine Learning".to_string(),
            content: "algorithms that learn from data".to_string(),
            url: None,
            score: 1.0,
            metadata,
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            user_id: "u1".to_string(),
            preferences: Preferences {
                categories: vec!["technology".to_string()],
                ..Default::default()
            },
            behavior: Behavior {
                click_history: vec!["d1".to_string()],
                search_history: Vec::new(),
                time_spent: Default::default(),
            },
            demographics: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_category_and_click_boosts_stack() {
        let result = result_with_metadata(json!({"category": "technology"}));
        let boost = user_profile_boost(&profile(), &result);
        assert!((boost - (CATEGORY_PREFERENCE_BOOST + CLICK_MEMORY_BOOST)).abs() < 1e-12);
    }

    #[test]
    fn test_search_overlap_capped() {
        let mut p = profile();
        p.behavior.click_history.clear();
        // Each query word hits the text; 6 hits * 0.05 would be 0.30, capped at 0.20
        p.behavior.search_history = vec![
            "machine learning data".to_string(),
            "learning algorithms learn".to_string(),
        ];
        let result = result_with_metadata(json!({}));
        let boost = user_profile_boost(&p, &result);
        assert!((boost - SEARCH_OVERLAP_CAP).abs() < 1e-12);
    }

    #[test]
    fn test_time_spent_capped() {
        let mut p = profile();
        p.behavior.click_history.clear();
        p.behavior.time_spent.insert("d1".to_string(), 5_000);
        let result = result_with_metadata(json!({}));
        assert!((user_profile_boost(&p, &result) - TIME_SPENT_CAP).abs() < 1e-12);

        p.behavior.time_spent.insert("d1".to_string(), 40);
        assert!((user_profile_boost(&p, &result) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_age_group_buckets() {
        assert!(age_group_matches(15, "teen"));
        assert!(age_group_matches(25, "young_adult"));
        assert!(age_group_matches(40, "adult"));
        assert!(age_group_matches(70, "senior"));
        assert!(!age_group_matches(25, "teen"));
        assert!(!age_group_matches(40, "unknown_bucket"));
    }

    #[test]
    fn test_age_boost_applies() {
        let mut p = profile();
        p.behavior.click_history.clear();
        p.demographics = Some(Demographics {
            age: Some(35),
            ..Default::default()
        });
        let result = result_with_metadata(json!({"age_group": "adult"}));
        assert!((user_profile_boost(&p, &result) - AGE_MATCH_BOOST).abs() < 1e-12);
    }

    #[test]
    fn test_interest_fraction() {
        let interests = vec!["rust".to_string(), "gardening".to_string()];
        let tags = vec!["Rust-Programming".to_string(), "systems".to_string()];
        // One of two interests matches a tag by substring
        let boost = interest_boost(&interests, tags);
        assert!((boost - INTEREST_MATCH_BOOST * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Berlin -> Potsdam is roughly 27 km
        let d = haversine_km(52.5200, 13.4050, 52.3906, 13.0645);
        assert!((20.0..35.0).contains(&d), "distance was {d}");
    }

    #[test]
    fn test_location_tiers() {
        assert_eq!(location_boost(0.5), 0.20);
        assert_eq!(location_boost(3.0), 0.10);
        assert_eq!(location_boost(8.0), 0.05);
        assert_eq!(location_boost(50.0), 0.0);
    }

    #[test]
    fn test_contextual_location_and_device() {
        let result = result_with_metadata(json!({
            "location": {"lat": 52.5200, "lng": 13.4050},
            "mobile_optimized": true,
        }));
        let context = RequestContext {
            location: Some(GeoLocation {
                lat: 52.5205,
                lng: 13.4049,
                radius: Some(99.0),
            }),
            device: Some("mobile".to_string()),
            ..Default::default()
        };
        let (location, other) = contextual_boosts(&context, &result);
        assert_eq!(location, 0.20);
        assert_eq!(other, DEVICE_MOBILE_BOOST);
    }

    #[test]
    fn test_device_requires_matching_flag() {
        let metadata = json!({"desktop_optimized": true});
        assert_eq!(device_boost("desktop", &metadata), DEVICE_DESKTOP_BOOST);
        assert_eq!(device_boost("mobile", &metadata), 0.0);
        assert_eq!(device_boost("tablet", &metadata), 0.0);
    }

    #[test]
    fn test_previous_query_overlap_capped() {
        let result = result_with_metadata(json!({}));
        let context = RequestContext {
            previous_queries: Some(vec![
                "machine learning".to_string(),
                "data algorithms learn".to_string(),
            ]),
            ..Default::default()
        };
        let (_, other) = contextual_boosts(&context, &result);
        // 5 hits * 0.03 = 0.15, capped at 0.10
        assert!((other - QUERY_OVERLAP_CAP).abs() < 1e-12);
    }

    #[test]
    fn test_hour_of_day_by_category() {
        assert_eq!(hour_of_day_boost("news", 7), HOUR_OF_DAY_BOOST);
        assert_eq!(hour_of_day_boost("news", 12), 0.0);
        assert_eq!(hour_of_day_boost("entertainment", 22), HOUR_OF_DAY_BOOST);
        assert_eq!(hour_of_day_boost("unlisted", 7), 0.0);
    }

    #[test]
    fn test_day_of_week_by_category() {
        assert_eq!(day_of_week_boost("work", Weekday::Tue), DAY_OF_WEEK_BOOST);
        assert_eq!(day_of_week_boost("work", Weekday::Sun), 0.0);
        assert_eq!(day_of_week_boost("shopping", Weekday::Sat), DAY_OF_WEEK_BOOST);
        assert_eq!(day_of_week_boost("news", Weekday::Wed), DAY_OF_WEEK_BOOST);
    }

    #[test]
    fn test_recency_tiers() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        assert_eq!(recency_boost(now - Duration::minutes(30), now), 0.10);
        assert_eq!(recency_boost(now - Duration::hours(5), now), 0.05);
        assert_eq!(recency_boost(now - Duration::hours(100), now), 0.02);
        assert_eq!(recency_boost(now - Duration::days(30), now), 0.0);
    }

    #[test]
    fn test_temporal_boost_reads_result_metadata() {
        let now = Utc.with_ymd_and_hms(2026, 3, 11, 7, 0, 0).unwrap(); // Wednesday 07:00
        let created = (now - Duration::hours(2)).to_rfc3339();
        let result = result_with_metadata(json!({
            "category": "news",
            "created_at": created,
        }));
        let boost = temporal_boost(&result, now);
        // hour (0.05) + day (0.03) + recency < 24h (0.05)
        assert!((boost - 0.13).abs() < 1e-12);
    }
}
