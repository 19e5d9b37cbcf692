use std::path::Path;
use strava_client::StravaApi;
use strava_client::config::{self, ClientSecrets};
use strava_client::http_client::ApiAccess;
use strava_client::token::TokenState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Looks for client_secrets.json / ephemeral_secrets.json in the working
    // directory and prompts for anything missing.
    let secrets =
        ClientSecrets::load_or_init(Path::new(config::CLIENT_SECRETS_FILE), config::prompt_line)?;
    let tokens = TokenState::load_or_init(
        Path::new(strava_client::token::EPHEMERAL_SECRETS_FILE),
        config::prompt_line,
    )?;

    let api = ApiAccess::new(secrets, tokens);
    let athlete = api.get_athlete().await?;
    println!(
        "Athlete: {} {} ({})",
        athlete.firstname.unwrap_or_default(),
        athlete.lastname.unwrap_or_default(),
        athlete.id
    );
    Ok(())
}
