use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::deploy::lifecycle::LifecycleError;
use crate::deploy::{Outcome, ReconcileError, Reconciler};
use crate::port;

/// Path registries post push notifications to.
pub const PUSH_PATH: &str = "/v1/docker-images/push";

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct PushNotification {
    pub repository: PushRepository,
    pub callback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushRepository {
    pub repo_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackState {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub state: CallbackState,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Push for '{received}' does not match the configured image '{expected}'")]
    RepositoryMismatch { expected: String, received: String },
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("Failed to bind webhook listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Webhook server error: {0}")]
    Serve(#[source] std::io::Error),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// State shared across axum handlers.
struct AppState {
    reconciler: Arc<Reconciler>,
    http: reqwest::Client,
}

pub fn callback_client() -> Result<reqwest::Client, WebhookError> {
    Ok(reqwest::Client::builder().timeout(CALLBACK_TIMEOUT).build()?)
}

pub fn router(reconciler: Arc<Reconciler>, http: reqwest::Client) -> Router {
    let state = Arc::new(AppState { reconciler, http });
    Router::new()
        .route(PUSH_PATH, post(handle_push))
        .with_state(state)
}

/// Bind the port derived from the configured image.
pub async fn bind(reconciler: &Reconciler) -> Result<TcpListener, WebhookError> {
    let addr = port::listen_addr(&reconciler.config().image.to_string());
    TcpListener::bind(addr)
        .await
        .map_err(|source| WebhookError::Bind { addr, source })
}

/// Serve push notifications until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    reconciler: Arc<Reconciler>,
    shutdown: F,
) -> Result<(), WebhookError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening for image pushes on http://{addr}{PUSH_PATH}");
    }
    let app = router(reconciler, callback_client()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(WebhookError::Serve)
}

/// Validate a push against the configured image and run a pass for it.
///
/// A push for an image that is already current still restores a container
/// that an earlier failed pass left stopped or removed.
pub async fn process_push(
    reconciler: &Reconciler,
    notification: &PushNotification,
) -> Result<Outcome, WebhookError> {
    let expected = &reconciler.config().image.name;
    let received = &notification.repository.repo_name;
    if received != expected {
        return Err(WebhookError::RepositoryMismatch {
            expected: expected.clone(),
            received: received.clone(),
        });
    }
    log::info!("Received push for {received}");
    let outcome = reconciler.reconcile().await?;
    if outcome == Outcome::Unchanged {
        reconciler.ensure_running().await?;
    }
    Ok(outcome)
}

/// Report the outcome to the callback URL. Failures are only logged.
pub async fn notify_callback(http: reqwest::Client, callback_url: String, state: CallbackState) {
    let url = match url::Url::parse(&callback_url) {
        Ok(url) => url,
        Err(e) => {
            log::error!("Invalid callback URL '{callback_url}': {e}");
            return;
        }
    };

    let result = http
        .post(url)
        .json(&CallbackPayload { state })
        .send()
        .await
        .and_then(|response| response.error_for_status());

    match result {
        Ok(_) => log::debug!("Reported {state:?} to {callback_url}"),
        Err(e) => log::warn!("Failed to report {state:?} to {callback_url}: {e}"),
    }
}

async fn handle_push(
    State(state): State<Arc<AppState>>,
    Json(notification): Json<PushNotification>,
) -> StatusCode {
    let callback_state = match process_push(&state.reconciler, &notification).await {
        Ok(Outcome::Redeployed { container_id }) => {
            log::info!(
                "Push for {} deployed container {container_id}",
                notification.repository.repo_name
            );
            CallbackState::Success
        }
        Ok(Outcome::Unchanged) => CallbackState::Success,
        Err(e) => {
            log::error!("Push handling failed: {e}");
            CallbackState::Error
        }
    };

    tokio::spawn(notify_callback(
        state.http.clone(),
        notification.callback_url,
        callback_state,
    ));

    StatusCode::NO_CONTENT
}
