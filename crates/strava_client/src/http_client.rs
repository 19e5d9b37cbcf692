//! Authenticated HTTP access to the Strava API.
//!
//! [`ApiAccess`] owns the client credentials and the persisted token state.
//! Before every request it refreshes the access token if it has expired;
//! when a request comes back 401/403 it runs the one-time browser
//! re-authorization flow and retries the request exactly once.

use crate::auth::{self, TokenEndpoint};
use crate::callback;
use crate::config::ClientSecrets;
use crate::token::TokenState;
use crate::{ActivitySummary, Athlete, DetailedActivity, StravaApi, StravaError};
use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Paged endpoints are drained with this page size.
pub const RESPONSES_PER_PAGE: u32 = 200;

/// How the client reacts to an insufficient-permission response.
enum Reauth {
    /// Open the OAuth portal in a browser, capture the redirect on the
    /// given local port, then retry once.
    Browser { port: u16 },
    /// Surface the error as-is (used during the retry, and in tests).
    Disabled,
}

pub struct ApiAccess {
    secrets: ClientSecrets,
    tokens: Mutex<TokenState>,
    client: reqwest::Client,
    base_url: String,
    token_endpoint: TokenEndpoint,
    authorize_url: String,
    reauth: Reauth,
}

impl ApiAccess {
    pub fn new(secrets: ClientSecrets, tokens: TokenState) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client build should not fail");
        let token_endpoint = TokenEndpoint::new(auth::OAUTH_TOKEN_URL, client.clone());
        Self {
            secrets,
            tokens: Mutex::new(tokens),
            client,
            base_url: crate::API_BASE_URL.to_string(),
            token_endpoint,
            authorize_url: auth::OAUTH_AUTHORIZE_URL.to_string(),
            reauth: Reauth::Browser {
                port: callback::CALLBACK_PORT,
            },
        }
    }

    /// Point the API base and token endpoint somewhere else (tests).
    pub fn with_endpoints(mut self, base_url: &str, token_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.token_endpoint = TokenEndpoint::new(token_url, self.client.clone());
        self
    }

    /// Disable the browser re-authorization flow; 401/403 then surface as
    /// [`StravaError::Auth`].
    pub fn without_reauth(mut self) -> Self {
        self.reauth = Reauth::Disabled;
        self
    }

    /// Refresh the access token through the refresh-token grant if it has
    /// expired, persisting whatever comes back.
    async fn ensure_fresh_token(&self) -> Result<(), StravaError> {
        let mut tokens = self.tokens.lock().await;
        let now = Utc::now();
        if !tokens.is_expired(now) {
            return Ok(());
        }
        if tokens.expires_at == 0 {
            tracing::info!("no access token expiry on record; retrieving an access token");
        } else {
            tracing::info!(
                expired_at = tokens.expires_at,
                "access token expired; refreshing"
            );
        }
        let response = self
            .token_endpoint
            .refresh_grant(&self.secrets, tokens.refresh_token.expose_secret())
            .await?;
        tokens.apply(&response)
    }

    /// GET an API path (e.g. `/athlete`) with a bearer token, re-authorizing
    /// through the browser once if the server reports missing permissions.
    pub async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, StravaError> {
        let resp = self.get_once(path, params).await?;
        let status = resp.status().as_u16();
        if matches!(status, 401 | 403)
            && let Reauth::Browser { port } = self.reauth
        {
            tracing::warn!(status, path, "failed authorization");
            self.attempt_oauth(port).await?;
            // Authorized with new scopes; try again, but only once.
            let resp = self.get_once(path, params).await?;
            return check_success(resp).await;
        }
        check_success(resp).await
    }

    async fn get_once(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, StravaError> {
        self.ensure_fresh_token().await?;
        let bearer = {
            let tokens = self.tokens.lock().await;
            tokens
                .access_token
                .as_ref()
                .map(|t| t.expose_secret().to_string())
                .ok_or_else(|| StravaError::Token("no access token after refresh".into()))?
        };
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .query(params)
            .send()
            .await?;
        Ok(resp)
    }

    /// Expand the authorized scopes through the OAuth portal: run the local
    /// callback listener, open the portal in a browser, exchange the
    /// captured code, and persist the new tokens.
    async fn attempt_oauth(&self, port: u16) -> Result<(), StravaError> {
        tracing::info!(
            "attempting to expand the authorized scopes; a browser window will open. \
             Select whichever scopes you consider appropriate, then return here. \
             Write access is never requested."
        );

        // Bind before opening the browser so the redirect cannot race us.
        let listener = callback::bind_local(port).await?;
        let redirect_uri = format!("http://localhost:{port}");
        let url = auth::authorization_url(&self.authorize_url, self.secrets.client_id, &redirect_uri);
        if let Err(e) = open::that(&url) {
            tracing::warn!("could not open a browser ({e}); visit this URL manually:\n{url}");
        }

        let grant = callback::wait_for_grant(listener).await?;
        let response = self
            .token_endpoint
            .code_grant(&self.secrets, &grant.code)
            .await?;
        if let Some(scope) = response.scope.as_deref().or(grant.scope.as_deref()) {
            tracing::info!(scope, "authorization granted");
        }
        let mut tokens = self.tokens.lock().await;
        tokens.apply(&response)
    }
}

async fn check_success(resp: reqwest::Response) -> Result<reqwest::Response, StravaError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(256).collect();
    Err(StravaError::from_status(status.as_u16(), snippet))
}

#[async_trait]
impl StravaApi for ApiAccess {
    async fn get_athlete(&self) -> Result<Athlete, StravaError> {
        let resp = self.get("/athlete", &[]).await?;
        Ok(resp.json().await?)
    }

    async fn get_activities_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ActivitySummary>, StravaError> {
        let params = [
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), per_page.to_string()),
        ];
        let resp = self.get("/athlete/activities", &params).await?;
        Ok(resp.json().await?)
    }

    async fn get_activity(
        &self,
        activity_id: u64,
        include_all_efforts: bool,
    ) -> Result<DetailedActivity, StravaError> {
        let params = [(
            "include_all_efforts".to_string(),
            include_all_efforts.to_string(),
        )];
        let resp = self.get(&format!("/activities/{activity_id}"), &params).await?;
        Ok(resp.json().await?)
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value, StravaError> {
        let resp = self.get(path, params).await?;
        Ok(resp.json().await?)
    }
}

/// Drain a paged endpoint: request `page`/`per_page` until an empty array
/// comes back, concatenating the elements. Progress is logged at most every
/// five seconds so long pulls stay visible without being noisy.
pub async fn get_paginated<C: StravaApi + ?Sized>(
    api: &C,
    path: &str,
    params: &[(String, String)],
) -> Result<Vec<serde_json::Value>, StravaError> {
    let mut result = Vec::new();
    let mut page = 1u32;
    let mut last_progress_report = Instant::now();
    loop {
        let mut page_params: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| k != "page" && k != "per_page")
            .cloned()
            .collect();
        page_params.push(("page".to_string(), page.to_string()));
        page_params.push(("per_page".to_string(), RESPONSES_PER_PAGE.to_string()));

        let value = api.get_json(path, &page_params).await?;
        let serde_json::Value::Array(items) = value else {
            return Err(StravaError::InvalidInput(format!(
                "{path} is paginated but did not return an array"
            )));
        };
        if items.is_empty() {
            return Ok(result);
        }
        result.extend(items);
        page += 1;

        if last_progress_report.elapsed() > Duration::from_secs(5) {
            tracing::info!("still querying {path}; received {} values so far", result.len());
            last_progress_report = Instant::now();
        }
    }
}
