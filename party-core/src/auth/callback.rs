//! One-shot OAuth redirect listener
//!
//! Serves `/callback` on the redirect URI's port until the browser delivers an
//! authorization code (or an error), then shuts itself down.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use reqwest::Url;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization complete</h1>\
<p>You can close this window and return to the game.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>Authorization failed</h1>\
<p>No authorization code was received. Please try again.</p></body></html>";

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("failed to bind callback listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("callback listener stopped before a code arrived")]
    Closed,
}

type Outcome = Result<String, String>;

#[derive(Clone)]
struct CallbackState {
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

async fn callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let outcome = match (params.get("code"), params.get("error")) {
        (Some(code), _) if !code.is_empty() => Ok(code.clone()),
        (_, Some(error)) => Err(error.clone()),
        _ => Err("missing code parameter".to_string()),
    };
    let page = if outcome.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };

    if let Some(tx) = state.tx.lock().take() {
        let _ = tx.send(outcome);
    }
    Html(page)
}

/// Socket address the redirect URI points at
pub fn callback_addr(redirect_uri: &str) -> Option<SocketAddr> {
    let url = Url::parse(redirect_uri).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    let host = if host == "localhost" { "127.0.0.1" } else { host };
    format!("{}:{}", host, port).parse().ok()
}

/// Running callback server
pub struct CallbackListener {
    local_addr: SocketAddr,
    code_rx: oneshot::Receiver<Outcome>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CallbackListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, CallbackError> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/callback", get(callback))
            .with_state(CallbackState {
                tx: Arc::new(Mutex::new(Some(code_tx))),
            });

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!("OAuth callback server error: {}", e);
            }
        });

        info!("OAuth callback listening on http://{}/callback", local_addr);
        Ok(Self {
            local_addr,
            code_rx,
            shutdown_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the browser redirect, then stop the server
    pub async fn wait_for_code(self) -> Result<String, CallbackError> {
        let outcome = self.code_rx.await;
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;

        match outcome {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(reason)) => Err(CallbackError::Denied(reason)),
            Err(_) => Err(CallbackError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_addr() {
        assert_eq!(
            callback_addr("http://127.0.0.1:8888/callback"),
            Some("127.0.0.1:8888".parse().unwrap())
        );
        assert_eq!(
            callback_addr("http://localhost:9000/callback"),
            Some("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(callback_addr("not a url"), None);
    }

    #[tokio::test]
    async fn test_receives_code() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let url = format!("http://{}/callback?code=abc123&state=xyz", listener.local_addr());

        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Authorization complete"));
        assert_eq!(listener.wait_for_code().await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_reports_denial() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let url = format!("http://{}/callback?error=access_denied", listener.local_addr());

        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Authorization failed"));
        assert!(matches!(
            listener.wait_for_code().await,
            Err(CallbackError::Denied(reason)) if reason == "access_denied"
        ));
    }
}
