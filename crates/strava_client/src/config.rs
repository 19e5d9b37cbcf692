//! Client application credentials.
//!
//! The client id and secret identify the registered API application, not
//! the athlete. They are looked up in `client_secrets.json`, then in the
//! environment, and finally requested interactively and written back to
//! disk so the next run finds them.

use crate::StravaError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;

/// Default on-disk location of the client credentials.
pub const CLIENT_SECRETS_FILE: &str = "client_secrets.json";

#[derive(Clone, Debug)]
pub struct ClientSecrets {
    pub client_id: u64,
    pub client_secret: SecretString,
}

#[derive(Deserialize)]
struct RawSecrets {
    client_id: Option<serde_json::Value>,
    client_secret: Option<String>,
}

impl ClientSecrets {
    /// Load from `path`, falling back to the environment, falling back to
    /// `prompt`. Prompted values are persisted to `path`.
    pub fn load_or_init(
        path: &Path,
        mut prompt: impl FnMut(&str) -> std::io::Result<String>,
    ) -> Result<Self, StravaError> {
        if path.is_file() {
            return Self::from_file(path);
        }
        if let Some(cfg) = Self::from_env_with(|k| std::env::var(k).ok())? {
            return Ok(cfg);
        }
        let client_id = prompt("Please enter your Client ID: ")?
            .trim()
            .parse::<u64>()
            .map_err(|_| StravaError::Config("Client ID must be an integer".into()))?;
        let client_secret = prompt("Please enter your Client Secret: ")?.trim().to_string();
        let cfg = Self {
            client_id,
            client_secret: SecretString::new(client_secret.into()),
        };
        cfg.save(path)?;
        tracing::info!("saved client credentials to {}", path.display());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, StravaError> {
        let text = std::fs::read_to_string(path)?;
        let raw: RawSecrets = serde_json::from_str(&text)?;
        let client_id = match raw.client_id {
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| StravaError::Config("\"client_id\" must be an integer".into()))?,
            Some(serde_json::Value::String(s)) => s.parse::<u64>().map_err(|_| {
                StravaError::Config("\"client_id\" must be an integer".into())
            })?,
            _ => {
                return Err(StravaError::Config(
                    "input JSON must have a \"client_id\" field".into(),
                ));
            }
        };
        let client_secret = raw.client_secret.ok_or_else(|| {
            StravaError::Config("input JSON must have a \"client_secret\" field".into())
        })?;
        Ok(Self {
            client_id,
            client_secret: SecretString::new(client_secret.into()),
        })
    }

    /// Testable helper that reads configuration values using the provided
    /// function, so tests never touch the process environment. `None` when
    /// the variables are not set.
    pub fn from_env_with<F>(mut get: F) -> Result<Option<Self>, StravaError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let (Some(id), Some(secret)) = (get("STRAVA_CLIENT_ID"), get("STRAVA_CLIENT_SECRET"))
        else {
            return Ok(None);
        };
        let client_id = id
            .parse::<u64>()
            .map_err(|_| StravaError::Config("STRAVA_CLIENT_ID must be an integer".into()))?;
        Ok(Some(Self {
            client_id,
            client_secret: SecretString::new(secret.into()),
        }))
    }

    pub fn save(&self, path: &Path) -> Result<(), StravaError> {
        let doc = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret.expose_secret(),
        });
        let mut file = std::fs::File::create(path)?;
        file.write_all(serde_json::to_string_pretty(&doc)?.as_bytes())?;
        Ok(())
    }
}

/// Print `label` and read one trimmed line from stdin.
pub fn prompt_line(label: &str) -> std::io::Result<String> {
    let mut out = std::io::stdout();
    out.write_all(label.as_bytes())?;
    out.flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn no_prompt(_: &str) -> std::io::Result<String> {
        panic!("prompt should not be reached");
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client_secrets.json");
        let cfg = ClientSecrets {
            client_id: 4242,
            client_secret: SecretString::new("hunter2".into()),
        };
        cfg.save(&path).expect("save");

        let loaded = ClientSecrets::load_or_init(&path, no_prompt).expect("load");
        assert_eq!(loaded.client_id, 4242);
        assert_eq!(loaded.client_secret.expose_secret(), "hunter2");
    }

    #[test]
    fn from_file_accepts_string_client_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client_secrets.json");
        std::fs::write(&path, r#"{"client_id": "99", "client_secret": "s"}"#).expect("write");
        let cfg = ClientSecrets::from_file(&path).expect("load");
        assert_eq!(cfg.client_id, 99);
    }

    #[test]
    fn from_file_missing_field_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client_secrets.json");
        std::fs::write(&path, r#"{"client_id": 1}"#).expect("write");
        let err = ClientSecrets::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn from_env_with_reads_values() {
        let get = |k: &str| match k {
            "STRAVA_CLIENT_ID" => Some("7".into()),
            "STRAVA_CLIENT_SECRET" => Some("sekrit".into()),
            _ => None,
        };
        let cfg = ClientSecrets::from_env_with(get).expect("ok").expect("some");
        assert_eq!(cfg.client_id, 7);
    }

    #[test]
    fn from_env_with_rejects_non_integer_id() {
        let get = |k: &str| match k {
            "STRAVA_CLIENT_ID" => Some("seven".into()),
            "STRAVA_CLIENT_SECRET" => Some("sekrit".into()),
            _ => None,
        };
        assert!(ClientSecrets::from_env_with(get).is_err());
    }

    #[test]
    fn prompted_values_are_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client_secrets.json");
        let mut answers = vec!["topsecret".to_string(), "123".to_string()];
        let cfg = ClientSecrets::load_or_init(&path, |_| Ok(answers.pop().unwrap()))
            .expect("init");
        assert_eq!(cfg.client_id, 123);
        assert!(path.is_file());

        let reloaded = ClientSecrets::from_file(&path).expect("reload");
        assert_eq!(reloaded.client_secret.expose_secret(), "topsecret");
    }
}
