//! Catalog of queryable API paths.
//!
//! Built from the published swagger definition: every path with a `get`
//! operation is queryable, and a path is flagged paginated when one of its
//! parameters is a `$ref` to the shared page/perPage parameter definitions.
//! Path templates (`/activities/{id}`) match concrete paths by treating
//! each `{...}` segment as a single wildcard path component.

use crate::StravaError;
use crate::cache::{CacheLookup, ResponseCache};
use regex::Regex;

/// Published machine-readable definition of the Strava v3 API.
pub const API_DEFINITION_URL: &str = "https://developers.strava.com/swagger/swagger.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathData {
    pub paginated: bool,
}

pub struct PathCatalog {
    entries: Vec<(String, Regex, PathData)>,
}

impl PathCatalog {
    /// Parse a swagger document into a catalog.
    pub fn from_swagger(doc: &serde_json::Value) -> Result<Self, StravaError> {
        let paths = doc
            .get("paths")
            .and_then(|p| p.as_object())
            .ok_or_else(|| {
                StravaError::InvalidInput("API definition has no \"paths\" object".into())
            })?;

        let mut entries = Vec::with_capacity(paths.len());
        for (spec, operations) in paths {
            // GET-only toolkit; paths without a get operation are skipped.
            let Some(get_op) = operations.get("get") else {
                continue;
            };
            let paginated = get_op
                .get("parameters")
                .and_then(|p| p.as_array())
                .is_some_and(|params| {
                    params.iter().any(|param| {
                        // The page and perPage parameters are shared
                        // definitions referenced by `$ref`.
                        param
                            .get("$ref")
                            .and_then(|r| r.as_str())
                            .is_some_and(|r| r.ends_with("age"))
                    })
                });
            let regex = spec_to_regex(spec)?;
            entries.push((spec.clone(), regex, PathData { paginated }));
        }
        Ok(Self { entries })
    }

    /// Fetch and parse the API definition, going through the response cache
    /// like any other idempotent GET. The definition endpoint is public, so
    /// this uses a bare client rather than the authenticated one.
    pub async fn fetch(
        cache: &ResponseCache,
        force_refresh: bool,
    ) -> Result<Self, StravaError> {
        if !force_refresh
            && let CacheLookup::Fresh(doc) = cache.lookup(API_DEFINITION_URL, &[])
        {
            return Self::from_swagger(&doc);
        }
        let doc: serde_json::Value = reqwest::get(API_DEFINITION_URL)
            .await?
            .error_for_status()?
            .json()
            .await?;
        cache.store(API_DEFINITION_URL, &[], &doc)?;
        Self::from_swagger(&doc)
    }

    /// Metadata for the first path template matching `query_path`, or
    /// `None` when the path is not part of the API.
    pub fn lookup(&self, query_path: &str) -> Option<PathData> {
        self.entries
            .iter()
            .find(|(_, regex, _)| regex.is_match(query_path))
            .map(|(_, _, data)| *data)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compile a path template into a full-match regex, substituting `[^/]*`
/// for every `{...}` placeholder and escaping everything else.
fn spec_to_regex(spec: &str) -> Result<Regex, StravaError> {
    let mut pattern = String::from("^");
    let mut rest = spec;
    while let Some(open) = rest.find('{') {
        let close = rest[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| {
                StravaError::InvalidInput(format!("unbalanced braces in path template {spec}"))
            })?;
        pattern.push_str(&regex::escape(&rest[..open]));
        pattern.push_str("[^/]*");
        rest = &rest[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Regex::new(&pattern)
        .map_err(|e| StravaError::InvalidInput(format!("bad path template {spec}: {e}")))
}
