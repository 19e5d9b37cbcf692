use secrecy::{ExposeSecret, SecretString};
use strava_client::config::ClientSecrets;
use strava_client::http_client::{ApiAccess, get_paginated};
use strava_client::token::TokenState;
use strava_client::{StravaApi, StravaError};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn secrets() -> ClientSecrets {
    ClientSecrets {
        client_id: 4242,
        client_secret: SecretString::new("sekrit".into()),
    }
}

fn no_prompt(_: &str) -> std::io::Result<String> {
    panic!("prompt should not be reached");
}

/// Token state persisted at `dir`, with the given expiry.
fn token_state(dir: &std::path::Path, expires_at: i64, access: Option<&str>) -> TokenState {
    let path = dir.join("ephemeral_secrets.json");
    let mut doc = serde_json::json!({
        "refresh_token": "r1",
        "expiration_time": expires_at,
    });
    if let Some(a) = access {
        doc["access_token"] = serde_json::Value::String(a.into());
    }
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    TokenState::load_or_init(&path, no_prompt).expect("token state")
}

fn far_future() -> i64 {
    chrono::Utc::now().timestamp() + 6 * 3600
}

#[tokio::test]
async fn expired_token_is_refreshed_and_rotation_persisted() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_partial_json(serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": "r1",
            "client_id": 4242,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "a1",
            "refresh_token": "r2",
            "expires_at": far_future(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/athlete"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 7, "firstname": "Alice"
        })))
        .mount(&server)
        .await;

    let api = ApiAccess::new(secrets(), token_state(dir.path(), 0, None))
        .with_endpoints(&server.uri(), &format!("{}/oauth/token", server.uri()))
        .without_reauth();

    let athlete = api.get_athlete().await.expect("athlete");
    assert_eq!(athlete.id, 7);

    // The rotated refresh token must have hit the disk.
    let reloaded = TokenState::load_or_init(&dir.path().join("ephemeral_secrets.json"), no_prompt)
        .expect("reload");
    assert_eq!(reloaded.refresh_token.expose_secret(), "r2");
}

#[tokio::test]
async fn valid_token_skips_the_token_endpoint() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    // No token-endpoint mock mounted: a refresh attempt would 404 and fail
    // the request.
    Mock::given(method("GET"))
        .and(path("/athlete"))
        .and(header("authorization", "Bearer live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
        .mount(&server)
        .await;

    let api = ApiAccess::new(secrets(), token_state(dir.path(), far_future(), Some("live")))
        .with_endpoints(&server.uri(), &format!("{}/oauth/token", server.uri()))
        .without_reauth();

    let athlete = api.get_athlete().await.expect("athlete");
    assert_eq!(athlete.id, 1);
}

#[tokio::test]
async fn insufficient_permissions_surface_as_auth_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("GET"))
        .and(path("/athlete"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let api = ApiAccess::new(secrets(), token_state(dir.path(), far_future(), Some("live")))
        .with_endpoints(&server.uri(), &format!("{}/oauth/token", server.uri()))
        .without_reauth();

    let err = api.get_athlete().await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn insufficient_permissions_trigger_reauth_and_a_single_retry() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    // The first request carries the old token and is refused.
    Mock::given(method("GET"))
        .and(path("/athlete"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("missing scope"))
        .expect(1)
        .mount(&server)
        .await;
    // The retry carries the token granted through the authorization flow.
    Mock::given(method("GET"))
        .and(path("/athlete"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_partial_json(serde_json::json!({
            "grant_type": "authorization_code",
            "code": "granted-code",
            "client_id": 4242,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "a2",
            "refresh_token": "r2",
            "expires_at": far_future(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Re-authorization left enabled: the 401 sends the client into the
    // browser flow, where it waits on the local callback listener. (If no
    // browser can be opened the client logs the portal URL and still
    // waits, which is what happens here.)
    let api = ApiAccess::new(secrets(), token_state(dir.path(), far_future(), Some("a1")))
        .with_endpoints(&server.uri(), &format!("{}/oauth/token", server.uri()));

    // Play the part of the browser: once the listener is up, deliver the
    // redirect carrying the authorization code.
    let redirect = tokio::spawn(async {
        let url = format!(
            "http://127.0.0.1:{}/?code=granted-code&scope=read,activity:read",
            strava_client::callback::CALLBACK_PORT
        );
        for _ in 0..100 {
            if reqwest::get(&url).await.is_ok() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        panic!("callback listener never came up");
    });

    let athlete = api.get_athlete().await.expect("athlete after re-authorization");
    assert_eq!(athlete.id, 7);
    redirect.await.expect("redirect delivery");

    // The granted tokens must survive for the next run.
    let reloaded = TokenState::load_or_init(&dir.path().join("ephemeral_secrets.json"), no_prompt)
        .expect("reload");
    assert_eq!(reloaded.refresh_token.expose_secret(), "r2");
}

#[tokio::test]
async fn rate_limiting_is_reported_not_slept_on() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("GET"))
        .and(path("/athlete"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate Limit Exceeded"))
        .mount(&server)
        .await;

    let api = ApiAccess::new(secrets(), token_state(dir.path(), far_future(), Some("live")))
        .with_endpoints(&server.uri(), &format!("{}/oauth/token", server.uri()))
        .without_reauth();

    let err = api.get_athlete().await.unwrap_err();
    assert!(matches!(err, StravaError::RateLimited(_)));
}

#[tokio::test]
async fn activity_pages_are_drained_until_empty() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("GET"))
        .and(path("/athlete/activities"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 1, "name": "Ride"},
            {"id": 2, "name": "Run"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/athlete/activities"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let api = ApiAccess::new(secrets(), token_state(dir.path(), far_future(), Some("live")))
        .with_endpoints(&server.uri(), &format!("{}/oauth/token", server.uri()))
        .without_reauth();

    let items = get_paginated(&api, "/athlete/activities", &[])
        .await
        .expect("pages");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get("name").and_then(|v| v.as_str()), Some("Ride"));
}

#[tokio::test]
async fn detailed_activity_requests_all_efforts() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("GET"))
        .and(path("/activities/555"))
        .and(query_param("include_all_efforts", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 555,
            "name": "Loop",
            "segment_efforts": [
                {"segment": {"id": 9, "name": "The Wall"}},
                {"segment": {"id": 9, "name": "The Wall"}}
            ]
        })))
        .mount(&server)
        .await;

    let api = ApiAccess::new(secrets(), token_state(dir.path(), far_future(), Some("live")))
        .with_endpoints(&server.uri(), &format!("{}/oauth/token", server.uri()))
        .without_reauth();

    let activity = api.get_activity(555, true).await.expect("activity");
    assert_eq!(activity.segment_efforts.len(), 2);
    assert_eq!(activity.segment_efforts[0].segment.name, "The Wall");
}
