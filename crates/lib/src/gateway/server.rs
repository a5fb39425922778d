//! Gateway HTTP server: provider webhooks, one-shot sends and a health check.

use crate::backend::MemoryBackend;
use crate::config::{self, Config};
use crate::dispatch::{Dispatcher, ReceiveOutcome};
use crate::error::Error;
use crate::gateway::protocol::{SendRequest, WebhookResponse};
use crate::handlers::InboundRequest;
use crate::msg::MsgId;
use crate::registry;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Shared state for the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    /// Ids handed to `/send` requests that do not carry their own.
    next_msg_id: Arc<AtomicI64>,
}

impl GatewayState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            next_msg_id: Arc::new(AtomicI64::new(1)),
        }
    }

    fn next_msg_id(&self) -> MsgId {
        MsgId(self.next_msg_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Routes served by the gateway.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(
            "/c/:channel_type/:uuid/:action",
            get(channel_webhook).post(channel_webhook),
        )
        .route("/send", post(send_http))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Configured channels seed an in-memory backend. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to non-loopback address {}; webhook and send routes are unauthenticated",
            bind
        );
    }

    let registry = registry::global();
    let backend = Arc::new(MemoryBackend::new(config.channels.iter().cloned()));
    for channel in backend.channels() {
        if registry.get(channel.channel_type.as_str()).is_err() {
            log::warn!(
                "channel {} has unknown type {}; its webhooks will 404",
                channel.uuid,
                channel.channel_type
            );
        }
    }
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        backend,
        config::resolve_send_timeout(&config),
    ));
    let app = router(GatewayState::new(dispatcher));

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "gateway listening on {} with {} channel(s)",
        bind_addr,
        config.channels.len()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

fn error_status(err: &Error) -> StatusCode {
    if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(err: &Error) -> Response {
    let status = error_status(err);
    if status.is_server_error() {
        log::error!("request failed: {}", err);
    } else {
        log::debug!("request rejected ({}): {}", status, err);
    }
    (status, Json(WebhookResponse::error(err.to_string()))).into_response()
}

/// GET or POST /c/{channel_type}/{uuid}/{action}: hand the raw request to the channel's handler.
async fn channel_webhook(
    State(state): State<GatewayState>,
    Path((channel_type, uuid, action)): Path<(String, String, String)>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let Ok(uuid) = Uuid::parse_str(&uuid) else {
        return (
            StatusCode::NOT_FOUND,
            Json(WebhookResponse::error(format!("invalid channel uuid '{}'", uuid))),
        )
            .into_response();
    };
    let request = InboundRequest::new(method, headers, query, body.to_vec());
    match state
        .dispatcher
        .receive(&channel_type, uuid, &action, &request)
        .await
    {
        Ok(ReceiveOutcome::Accepted(events)) => Json(WebhookResponse::handled(&events)).into_response(),
        Ok(ReceiveOutcome::Ignored(reason)) => Json(WebhookResponse::ignored(reason)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /send: run one send attempt and return the resulting status update.
async fn send_http(State(state): State<GatewayState>, body: Bytes) -> Response {
    let request: SendRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::error(format!("invalid send request: {}", e))),
            )
                .into_response()
        }
    };
    let channel_type = request.channel_type.clone();
    let msg = match request.into_message(state.next_msg_id()) {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };
    let ctx = state.dispatcher.send_context();
    match state.dispatcher.send(&ctx, &channel_type, &msg).await {
        Ok(update) => Json(update).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET / returns a simple health JSON.
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let registry = state.dispatcher.registry();
    let handlers: Vec<serde_json::Value> = registry
        .channel_types()
        .into_iter()
        .filter_map(|code| {
            let handler = registry.get(code.as_str()).ok()?;
            Some(json!({ "channelType": code, "name": handler.name() }))
        })
        .collect();
    Json(json!({
        "runtime": "running",
        "handlers": handlers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_http_status() {
        assert_eq!(
            error_status(&Error::UnknownChannelType("XX".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&Error::invalid_address("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&Error::missing_config("CS".into(), "username")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&Error::Backend("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
