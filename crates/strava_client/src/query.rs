//! Validated, cached, paginating query layer.
//!
//! [`QueryDatabase`] wraps a [`StravaApi`] so that arbitrary GET queries
//! are checked against the path catalog, transparently paginated when the
//! path requires it, and cached on disk so reruns do not wait on the API
//! (or eat into its rate limits).

use crate::StravaApi;
use crate::StravaError;
use crate::cache::{CacheLookup, ResponseCache};
use crate::http_client::get_paginated;
use crate::paths::PathCatalog;

pub struct QueryDatabase<C: StravaApi> {
    api: C,
    catalog: PathCatalog,
    cache: ResponseCache,
}

impl<C: StravaApi> QueryDatabase<C> {
    pub fn new(api: C, catalog: PathCatalog, cache: ResponseCache) -> Self {
        Self {
            api,
            catalog,
            cache,
        }
    }

    /// Query `path` with the given parameters.
    ///
    /// Cached results may be up to a week old; pass `force_refresh` (or
    /// delete the entry under `cache/`) to bypass them. Paginated paths can
    /// fan out into many individual API requests.
    pub async fn query(
        &self,
        path: &str,
        params: &[(String, String)],
        force_refresh: bool,
    ) -> Result<serde_json::Value, StravaError> {
        let data = self
            .catalog
            .lookup(path)
            .ok_or_else(|| StravaError::InvalidInput(format!("{path} is not a valid path")))?;

        match self.cache.lookup(path, params) {
            CacheLookup::Fresh(value) if !force_refresh => return Ok(value),
            CacheLookup::Stale { created } => {
                tracing::info!(
                    "cache entry for {path} from {created} is older than the max age; refetching"
                );
            }
            _ => {}
        }

        let result = if data.paginated {
            serde_json::Value::Array(get_paginated(&self.api, path, params).await?)
        } else {
            self.api.get_json(path, params).await?
        };

        self.cache.store(path, params, &result)?;
        Ok(result)
    }
}
