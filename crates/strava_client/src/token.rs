//! Persisted athlete token state.
//!
//! The refresh token is long-lived (but single-use: it may rotate on every
//! exchange); the access token expires after roughly six hours. Both are
//! kept in `ephemeral_secrets.json` together with the expiry so restarts
//! pick up where the last run left off. The file format matches what
//! earlier versions of the toolkit wrote, so existing files keep working.

use crate::StravaError;
use crate::auth::TokenResponse;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default on-disk location of the token state.
pub const EPHEMERAL_SECRETS_FILE: &str = "ephemeral_secrets.json";

#[derive(Debug)]
pub struct TokenState {
    path: PathBuf,
    pub refresh_token: SecretString,
    pub access_token: Option<SecretString>,
    /// Unix seconds; 0 means "no access token has been obtained yet".
    pub expires_at: i64,
}

#[derive(Deserialize)]
struct RawTokens {
    refresh_token: Option<String>,
    access_token: Option<String>,
    #[serde(default)]
    expiration_time: i64,
}

impl TokenState {
    /// Load from `path`; when the file is missing, ask `prompt` for a
    /// refresh token and persist it immediately with a zero expiry so the
    /// first request forces a refresh.
    pub fn load_or_init(
        path: &Path,
        mut prompt: impl FnMut(&str) -> std::io::Result<String>,
    ) -> Result<Self, StravaError> {
        if path.is_file() {
            let text = std::fs::read_to_string(path)?;
            let raw: RawTokens = serde_json::from_str(&text)?;
            let refresh = raw.refresh_token.ok_or_else(|| {
                StravaError::Config("input JSON must have a \"refresh_token\" field".into())
            })?;
            return Ok(Self {
                path: path.to_path_buf(),
                refresh_token: SecretString::new(refresh.into()),
                access_token: raw.access_token.map(|t| SecretString::new(t.into())),
                expires_at: raw.expiration_time,
            });
        }

        let refresh = prompt("Please enter your current Refresh Token: ")?
            .trim()
            .to_string();
        let state = Self {
            path: path.to_path_buf(),
            refresh_token: SecretString::new(refresh.into()),
            access_token: None,
            expires_at: 0,
        };
        state.save()?;
        Ok(state)
    }

    /// Whether the access token is missing or expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_none() || self.expires_at < now.timestamp()
    }

    /// Fold a token response into the state, logging whether anything
    /// actually rotated, and persist.
    pub fn apply(&mut self, response: &TokenResponse) -> Result<(), StravaError> {
        let expiry = DateTime::<Utc>::from_timestamp(response.expires_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| response.expires_at.to_string());
        tracing::info!("retrieved access token expiring at {expiry}");

        if response.refresh_token == self.refresh_token.expose_secret() {
            tracing::debug!("refresh token did not change");
        }
        if self
            .access_token
            .as_ref()
            .is_some_and(|t| t.expose_secret() == response.access_token)
        {
            tracing::debug!("access token did not change");
        }

        self.refresh_token = SecretString::new(response.refresh_token.clone().into());
        self.access_token = Some(SecretString::new(response.access_token.clone().into()));
        self.expires_at = response.expires_at;

        // Even when the tokens themselves did not change, the expiry moved.
        self.save()
    }

    pub fn save(&self) -> Result<(), StravaError> {
        let mut doc = serde_json::json!({
            "refresh_token": self.refresh_token.expose_secret(),
            "expiration_time": self.expires_at,
        });
        if let Some(token) = &self.access_token {
            doc["access_token"] = serde_json::Value::String(token.expose_secret().to_string());
        }
        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(serde_json::to_string_pretty(&doc)?.as_bytes())?;
        Ok(())
    }
}
