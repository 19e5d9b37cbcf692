//! On-disk response cache.
//!
//! Each cached response lives in its own directory under the cache root,
//! keyed on the request path and its sorted query parameters:
//! `cache/<host>/<path>/<k1=v1,k2=v2>/`. The directory holds two files, a
//! `creation_time` with unix seconds and the response body in
//! `content.json`. Entries older than a week are considered stale. This is
//! only suitable for idempotent GETs, which is all the toolkit issues.

use crate::StravaError;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

pub const CACHE_FOLDER: &str = "cache";
const CREATION_TIME_FILE_NAME: &str = "creation_time";
const CONTENT_FILE_NAME: &str = "content.json";

/// What a cache probe found.
#[derive(Debug, PartialEq)]
pub enum CacheLookup {
    Fresh(serde_json::Value),
    /// Entry exists but is older than the max age.
    Stale { created: DateTime<Utc> },
    Miss,
}

pub struct ResponseCache {
    root: PathBuf,
    max_age: Duration,
}

impl ResponseCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_age: Duration::days(7),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Sorted `k=v` pairs joined by commas, giving every parameter set a
    /// stable directory name.
    pub fn params_key(params: &[(String, String)]) -> String {
        let mut pairs: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        pairs.join(",")
    }

    fn entry_dir(&self, url: &str, params: &[(String, String)]) -> PathBuf {
        // Full URLs key on host/path; API-relative paths key on the path
        // alone, mirroring how they are requested.
        let trimmed = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        let mut dir = self.root.clone();
        for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
            dir.push(segment);
        }
        dir.push(Self::params_key(params));
        dir
    }

    pub fn lookup(&self, url: &str, params: &[(String, String)]) -> CacheLookup {
        let dir = self.entry_dir(url, params);
        let Some(created) = read_creation_time(&dir.join(CREATION_TIME_FILE_NAME)) else {
            return CacheLookup::Miss;
        };
        let content_path = dir.join(CONTENT_FILE_NAME);
        if !content_path.is_file() {
            return CacheLookup::Miss;
        }
        if created + self.max_age < Utc::now() {
            return CacheLookup::Stale { created };
        }
        match std::fs::read_to_string(&content_path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
        {
            Some(value) => {
                tracing::info!(
                    "retrieving cached result from {created} for {url} with parameters {:?}",
                    Self::params_key(params)
                );
                CacheLookup::Fresh(value)
            }
            // Unreadable content is the same as no content.
            None => CacheLookup::Miss,
        }
    }

    pub fn store(
        &self,
        url: &str,
        params: &[(String, String)],
        value: &serde_json::Value,
    ) -> Result<(), StravaError> {
        let dir = self.entry_dir(url, params);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(
            dir.join(CREATION_TIME_FILE_NAME),
            Utc::now().timestamp().to_string(),
        )?;
        std::fs::write(dir.join(CONTENT_FILE_NAME), serde_json::to_string(value)?)?;
        Ok(())
    }
}

/// Accepts both integer and float unix timestamps; older versions of the
/// toolkit wrote floats.
fn read_creation_time(path: &Path) -> Option<DateTime<Utc>> {
    let text = std::fs::read_to_string(path).ok()?;
    let seconds = text.trim().parse::<f64>().ok()?;
    DateTime::<Utc>::from_timestamp(seconds as i64, 0)
}
