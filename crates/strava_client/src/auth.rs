//! OAuth2 token exchange.
//!
//! Two grants against the Strava token endpoint: `refresh_token` whenever
//! the persisted access token has expired, and `authorization_code` once
//! after the browser re-authorization flow. Both return the same response
//! shape, and both may rotate the refresh token.
//! See <https://developers.strava.com/docs/authentication/>.

use crate::StravaError;
use crate::config::ClientSecrets;
use secrecy::ExposeSecret;
use serde::Deserialize;

pub const OAUTH_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
pub const OAUTH_AUTHORIZE_URL: &str = "http://www.strava.com/oauth/authorize";

/// Read-only scopes requested during re-authorization. Write access is
/// deliberately never asked for.
pub const READ_SCOPES: &[&str] = &[
    "read",
    "read_all",
    "profile:read_all",
    "activity:read",
    "activity:read_all",
];

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    /// Only present on the authorization-code grant.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Thin wrapper around the token endpoint; the URL is a field so tests can
/// point it at a mock server.
#[derive(Clone, Debug)]
pub struct TokenEndpoint {
    url: String,
    client: reqwest::Client,
}

impl TokenEndpoint {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    /// Exchange a refresh token for a (possibly rotated) token pair.
    pub async fn refresh_grant(
        &self,
        secrets: &ClientSecrets,
        refresh_token: &str,
    ) -> Result<TokenResponse, StravaError> {
        let body = serde_json::json!({
            "client_id": secrets.client_id,
            "client_secret": secrets.client_secret.expose_secret(),
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        self.post(&body).await
    }

    /// Exchange a freshly granted authorization code for a token pair.
    pub async fn code_grant(
        &self,
        secrets: &ClientSecrets,
        code: &str,
    ) -> Result<TokenResponse, StravaError> {
        let body = serde_json::json!({
            "client_id": secrets.client_id,
            "client_secret": secrets.client_secret.expose_secret(),
            "grant_type": "authorization_code",
            "code": code,
        });
        self.post(&body).await
    }

    async fn post(&self, body: &serde_json::Value) -> Result<TokenResponse, StravaError> {
        let resp = self.client.post(&self.url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(256).collect();
            return Err(StravaError::Token(format!("HTTP {status}: {snippet}")));
        }
        Ok(resp.json().await?)
    }
}

/// Authorization portal URL requesting all read scopes, redirecting back to
/// the local callback listener.
/// See <https://developers.strava.com/docs/authentication/#details-about-requesting-access>.
pub fn authorization_url(authorize_url: &str, client_id: u64, redirect_uri: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&approval_prompt=force&scope={}",
        authorize_url,
        client_id,
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&READ_SCOPES.join(","))
    )
}
