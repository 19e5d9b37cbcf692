//! Single-user Strava API toolkit.
//!
//! The core is the persisted OAuth2 credential flow: exchanging a refresh
//! token for an access token, detecting insufficient-permission failures,
//! walking the user through a one-time browser re-authorization with a local
//! callback listener, and writing the resulting tokens back to disk. On top
//! of that sits a cached, paginating query layer for arbitrary GET paths.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod auth;
pub mod cache;
pub mod callback;
pub mod config;
pub mod http_client;
pub mod paths;
pub mod query;
pub mod token;

/// Base URL of the Strava v3 API.
pub const API_BASE_URL: &str = "https://www.strava.com/api/v3";

#[derive(Debug, Error)]
pub enum StravaError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authorization error: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("api error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("token exchange error: {0}")]
    Token(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StravaError {
    /// Map an HTTP status to the matching error variant.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => StravaError::Auth(body),
            404 => StravaError::NotFound(body),
            429 => StravaError::RateLimited(body),
            _ => StravaError::Api { status, body },
        }
    }

    /// Whether this error signals missing or insufficient authorization.
    pub fn is_auth(&self) -> bool {
        matches!(self, StravaError::Auth(_))
    }
}

/// The authenticated athlete's profile. Fields the toolkit does not
/// interpret are preserved in `extra` so re-serialization is lossless.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Athlete {
    #[serde(deserialize_with = "deserialize_u64_lenient")]
    pub id: u64,
    pub username: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One entry from `/athlete/activities`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ActivitySummary {
    #[serde(deserialize_with = "deserialize_u64_lenient")]
    pub id: u64,
    pub name: String,
    pub sport_type: Option<String>,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub kudos_count: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A detailed activity, fetched with `include_all_efforts=true` so the
/// segment efforts are present.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DetailedActivity {
    #[serde(deserialize_with = "deserialize_u64_lenient")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub segment_efforts: Vec<SegmentEffort>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SegmentEffort {
    pub segment: Segment,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Segment {
    #[serde(deserialize_with = "deserialize_u64_lenient")]
    pub id: u64,
    pub name: String,
}

/// Ids normally come back as numbers but have been observed as strings in
/// some payloads; accept both.
fn deserialize_u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match &value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("expected unsigned id, got {n}"))),
        serde_json::Value::String(s) => s
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("expected numeric id, got {s:?}"))),
        other => Err(D::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

/// Seam between the authenticated HTTP client and the query layer.
#[async_trait]
pub trait StravaApi: Send + Sync + 'static {
    async fn get_athlete(&self) -> Result<Athlete, StravaError>;
    async fn get_activities_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ActivitySummary>, StravaError>;
    async fn get_activity(
        &self,
        activity_id: u64,
        include_all_efforts: bool,
    ) -> Result<DetailedActivity, StravaError>;
    /// GET an arbitrary API path with query parameters, returning raw JSON.
    async fn get_json(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value, StravaError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    #[test]
    fn activity_summary_keeps_unknown_fields() {
        let payload = json!({
            "id": 42,
            "name": "Morning Ride",
            "sport_type": "Ride",
            "distance": 16093.4,
            "kudos_count": 3,
            "average_watts": 180.5
        });
        let act: super::ActivitySummary = serde_json::from_value(payload).expect("activity");
        assert_eq!(act.id, 42);
        assert_eq!(
            act.extra.get("average_watts").and_then(|v| v.as_f64()),
            Some(180.5)
        );

        let back = serde_json::to_value(&act).expect("serialize");
        assert_eq!(back.get("average_watts").and_then(|v| v.as_f64()), Some(180.5));
    }

    #[test]
    fn ids_deserialize_from_strings() {
        let payload = json!({"id": "1234", "name": "Hill sprint"});
        let seg: super::Segment = serde_json::from_value(payload).expect("segment");
        assert_eq!(seg.id, 1234);
    }

    #[test]
    fn non_numeric_id_errors() {
        let payload = json!({"id": {"nested": true}, "name": "x"});
        let res: Result<super::Segment, _> = serde_json::from_value(payload);
        assert!(res.is_err());
    }

    #[test]
    fn detailed_activity_defaults_efforts() {
        let payload = json!({"id": 9, "name": "Commute"});
        let act: super::DetailedActivity = serde_json::from_value(payload).expect("activity");
        assert!(act.segment_efforts.is_empty());
    }

    #[test]
    fn from_status_maps_auth_statuses() {
        assert!(super::StravaError::from_status(401, String::new()).is_auth());
        assert!(super::StravaError::from_status(403, String::new()).is_auth());
        assert!(matches!(
            super::StravaError::from_status(429, String::new()),
            super::StravaError::RateLimited(_)
        ));
        assert!(matches!(
            super::StravaError::from_status(500, "boom".into()),
            super::StravaError::Api { status: 500, .. }
        ));
    }
}
