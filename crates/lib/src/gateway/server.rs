//! Gateway HTTP server: function invocation envelope, raw Telegram webhook, health.

use crate::channels::{InboundMessage, TelegramUpdate};
use crate::config::Settings;
use crate::dispatch::{DispatchError, Dispatcher, Outcome};
use crate::gateway::envelope::{FunctionRequest, FunctionResponse, SECRET_HEADER};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long in-flight invocations may keep running after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Shared state for the gateway. Everything here is read-only after startup.
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    pub dispatcher: Arc<Dispatcher>,
    /// Cancelled on shutdown; each invocation runs under a child token.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(settings: Settings) -> Self {
        let dispatcher = Dispatcher::from_settings(&settings);
        Self {
            settings: Arc::new(settings),
            dispatcher: Arc::new(dispatcher),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Why an invocation did not complete normally.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("invalid invocation envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid telegram update: {0}")]
    Update(#[source] serde_json::Error),
    #[error("webhook secret mismatch")]
    Forbidden,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl InvocationError {
    pub fn status(&self) -> StatusCode {
        match self {
            InvocationError::Envelope(_) | InvocationError::Base64(_) | InvocationError::Update(_) => {
                StatusCode::BAD_REQUEST
            }
            InvocationError::Forbidden => StatusCode::FORBIDDEN,
            InvocationError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Build the router (exposed for tests and embedding).
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", post(invoke))
        .route("/telegram/webhook", post(telegram_webhook))
        .route("/health", get(health_http))
        .with_state(state)
}

/// Handle one invocation envelope end to end.
pub async fn handle_invocation(
    state: &GatewayState,
    envelope: &[u8],
) -> Result<Option<Outcome>, InvocationError> {
    let request: FunctionRequest =
        serde_json::from_slice(envelope).map_err(InvocationError::Envelope)?;
    log::debug!("invocation: {} request, {} body bytes", request.http_method, request.body.len());
    let body = request.body_bytes()?;
    handle_update(state, &body, request.header(SECRET_HEADER)).await
}

/// Verify the secret, decode the update and dispatch its message, if any.
/// `Ok(None)` means the update carried no message and nothing was sent.
pub async fn handle_update(
    state: &GatewayState,
    body: &[u8],
    secret: Option<&str>,
) -> Result<Option<Outcome>, InvocationError> {
    if let Some(ref expected) = state.settings.webhook_secret {
        if !secret_matches(expected, secret) {
            return Err(InvocationError::Forbidden);
        }
    }
    let update: TelegramUpdate = serde_json::from_slice(body).map_err(InvocationError::Update)?;
    let Some(message) = update.message else {
        log::debug!("invocation: update {:?} has no message, ignoring", update.update_id);
        return Ok(None);
    };
    let msg = InboundMessage::from(message);
    let invocation_id = uuid::Uuid::new_v4();
    log::info!(
        "invocation {}: {} message {} in chat {}",
        invocation_id,
        msg.kind(),
        msg.message_id,
        msg.chat_id
    );
    let cancel = state.shutdown.child_token();
    let outcome = state.dispatcher.dispatch(&msg, &cancel).await?;
    log::info!("invocation {}: done ({:?})", invocation_id, outcome);
    Ok(Some(outcome))
}

fn secret_matches(expected: &str, provided: Option<&str>) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn respond(result: Result<Option<Outcome>, InvocationError>) -> (StatusCode, Json<FunctionResponse>) {
    match result {
        Ok(_) => (StatusCode::OK, Json(FunctionResponse::ok())),
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                log::error!("invocation failed: {}", e);
            } else {
                log::warn!("invocation rejected: {}", e);
            }
            let reason = status.canonical_reason().unwrap_or("error");
            (status, Json(FunctionResponse::error(status.as_u16(), reason)))
        }
    }
}

/// POST /: function invocation envelope.
async fn invoke(State(state): State<GatewayState>, body: Bytes) -> (StatusCode, Json<FunctionResponse>) {
    respond(handle_invocation(&state, &body).await)
}

/// POST /telegram/webhook: Telegram update JSON posted directly.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<FunctionResponse>) {
    let secret = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    respond(handle_update(&state, &body, secret).await)
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.settings.port,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Run the gateway; binds to settings.bind:settings.port and blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_gateway(settings: Settings) -> Result<()> {
    let bind_addr = format!("{}:{}", settings.bind, settings.port);
    let state = GatewayState::new(settings);
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("gateway server exited")?;
    shutdown.cancel();
    log::info!("gateway stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM. In-flight invocations get [`SHUTDOWN_GRACE`]
/// to finish before their tokens are cancelled.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => return,
    }
    log::info!(
        "shutdown signal received, draining in-flight invocations for {}s",
        SHUTDOWN_GRACE.as_secs()
    );
    cancel_after(shutdown, SHUTDOWN_GRACE);
}

fn cancel_after(token: CancellationToken, grace: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(grace) => {
                log::warn!("shutdown grace period elapsed, cancelling in-flight invocations");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}
