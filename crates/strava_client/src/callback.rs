//! Local authorization callback listener.
//!
//! During re-authorization the browser is sent to the Strava OAuth portal
//! with `redirect_uri` pointing at `http://localhost:8001`. This module
//! runs a short-lived plain-HTTP server on that port, captures the `code`
//! and granted `scope` from the redirect query string, answers the browser
//! with a small "you can close this tab" page, and shuts down.

use crate::StravaError;
use axum::{Router, extract::Query, response::Html, routing::get};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Port Strava redirects back to; must match the redirect URI registered
/// with the application.
pub const CALLBACK_PORT: u16 = 8001;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a successful redirect: the grant code plus the scopes the
/// user actually enabled (they may have unchecked some).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub code: String,
    pub scope: Option<String>,
}

/// Bind the callback listener on the loopback interface.
pub async fn bind_local(port: u16) -> Result<TcpListener, StravaError> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    Ok(listener)
}

/// Serve on `listener` until a single redirect arrives, then return its
/// outcome. An `error` query parameter (user denied, bad client, ...) is
/// surfaced as an authorization error.
///
/// Shutdown is graceful so the "close this tab" page reaches the browser
/// before the listener goes away.
pub async fn wait_for_grant(listener: TcpListener) -> Result<AuthorizationGrant, StravaError> {
    let slot: Arc<Mutex<Option<Result<AuthorizationGrant, StravaError>>>> =
        Arc::new(Mutex::new(None));
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let shutdown_tx = Arc::new(Mutex::new(Some(shutdown_tx)));

    let handler_slot = Arc::clone(&slot);
    let app = Router::new().route(
        "/",
        get(move |Query(params): Query<CallbackParams>| {
            let slot = Arc::clone(&handler_slot);
            let shutdown_tx = Arc::clone(&shutdown_tx);
            async move {
                let result = match (params.code, params.error) {
                    (_, Some(error)) => {
                        Err(StravaError::Auth(format!("failed to authorize: {error}")))
                    }
                    (Some(code), None) => Ok(AuthorizationGrant {
                        code,
                        scope: params.scope,
                    }),
                    (None, None) => Err(StravaError::Auth(
                        "redirect carried neither code nor error".into(),
                    )),
                };
                // Only the first redirect counts.
                if let Ok(mut guard) = slot.lock()
                    && guard.is_none()
                {
                    *guard = Some(result);
                }
                if let Ok(mut guard) = shutdown_tx.lock()
                    && let Some(tx) = guard.take()
                {
                    let _ = tx.send(());
                }
                Html(CALLBACK_HTML)
            }
        }),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    let outcome = slot
        .lock()
        .map_err(|_| StravaError::Auth("callback state poisoned".into()))?
        .take();
    match outcome {
        Some(result) => result,
        None => Err(StravaError::Auth(
            "callback server shut down before a redirect arrived".into(),
        )),
    }
}

const CALLBACK_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><title>Authorization complete</title></head>\n<body>\n<p>Success! You may close this tab and return to the command line.</p>\n</body>\n</html>\n";
