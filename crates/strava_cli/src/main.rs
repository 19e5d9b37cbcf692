use std::path::Path;

use anyhow::{Context, bail};
use strava_client::config::{self, ClientSecrets};
use strava_client::http_client::ApiAccess;
use strava_client::token::{self, TokenState};

mod commands;
mod segments;

const USAGE: &str = "usage: strava <command>

commands:
  athlete                          print the authenticated athlete profile
  activities                       list every activity and write activities.json
  segments                         rank your most frequently ridden segments
  query <path> [k=v ...] [--force-refresh]
                                   cached GET of an arbitrary API path";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configure logging from `STRAVA_LOG_LEVEL` (or fallback to `RUST_LOG`,
    // default `info`).
    let log_env = std::env::var("STRAVA_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&log_env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        bail!("{USAGE}");
    };

    match command {
        "athlete" => commands::run_athlete(&build_api()?).await,
        "activities" => commands::run_activities(&build_api()?).await,
        "segments" => commands::run_segments(build_api()?).await,
        "query" => {
            // Parse before prompting for credentials so argument mistakes
            // fail fast.
            let query = commands::QueryArgs::parse(&args[1..])?;
            commands::run_query(build_api()?, query).await
        }
        other => bail!("unknown command {other:?}\n\n{USAGE}"),
    }
}

/// Assemble the authenticated client from the credential files in the
/// working directory, prompting for anything missing.
fn build_api() -> anyhow::Result<ApiAccess> {
    let secrets =
        ClientSecrets::load_or_init(Path::new(config::CLIENT_SECRETS_FILE), config::prompt_line)
            .context("loading client credentials")?;
    let tokens =
        TokenState::load_or_init(Path::new(token::EPHEMERAL_SECRETS_FILE), config::prompt_line)
            .context("loading token state")?;
    Ok(ApiAccess::new(secrets, tokens))
}
