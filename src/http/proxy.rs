use crate::constants::service::PROXY_NAME;
use crate::envelope::FileReply;
use crate::errors::ServeError;
use crate::managers::channel::RemoteChannel;
use crate::managers::ssh::SshChannel;
use crate::services::config::{ChannelConfig, ServerConfig};
use crate::services::interpreter::interpret;
use crate::services::logger::{init_tracing, Logger};
use crate::utils::time::local_iso_timestamp;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct ProxyState {
    logger: Logger,
    channel: Arc<dyn RemoteChannel>,
}

/// Per-request bookkeeping, dropped once the reply is sent.
#[derive(Debug)]
struct RequestContext {
    request_id: uuid::Uuid,
    filename: String,
    received_at: DateTime<Local>,
    started: Instant,
}

impl RequestContext {
    fn new(filename: String) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4(),
            filename,
            received_at: Local::now(),
            started: Instant::now(),
        }
    }
}

pub fn router(logger: Logger, channel: Arc<dyn RemoteChannel>) -> Router {
    let state = ProxyState {
        logger: logger.child("proxy"),
        channel,
    };
    Router::new()
        .route("/file/{filename}", get(get_file))
        .route("/health", get(health))
        .with_state(state)
}

/// A decoded `%2F` yields a name with `/`, which the route as written never
/// matches; such requests get the same 404 as `/file/a/b`.
async fn get_file(
    State(state): State<ProxyState>,
    Path(filename): Path<String>,
) -> Result<Json<FileReply>, StatusCode> {
    if filename.contains('/') {
        state.logger.warn(
            "Rejected filename containing a path separator",
            Some(&serde_json::json!({"filename": filename})),
        );
        return Err(StatusCode::NOT_FOUND);
    }

    let ctx = RequestContext::new(filename);
    state.logger.info(
        "Received request for file",
        Some(&serde_json::json!({
            "request_id": ctx.request_id,
            "filename": ctx.filename,
            "received_at": ctx.received_at.to_rfc3339(),
        })),
    );

    let outcome = state.channel.execute(&ctx.filename).await;
    if let Err(err) = &outcome {
        state.logger.error(
            "Error communicating with legacy system",
            Some(&serde_json::json!({
                "request_id": ctx.request_id,
                "kind": err.kind(),
                "error": err.to_string(),
            })),
        );
    }
    let reply = interpret(&ctx.filename, outcome);

    let elapsed = ctx.started.elapsed();
    state.logger.info(
        &format!("Request completed in {:.2} seconds", elapsed.as_secs_f64()),
        Some(&serde_json::json!({
            "request_id": ctx.request_id,
            "filename": ctx.filename,
            "status": reply.status_label(),
            "duration_ms": elapsed.as_millis() as u64,
        })),
    );
    Ok(Json(reply))
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": local_iso_timestamp(),
        "service": PROXY_NAME,
    }))
}

/// Entry point of the `local-server` binary.
pub async fn run() -> Result<(), ServeError> {
    init_tracing()?;
    let logger = Logger::new(PROXY_NAME);

    let channel_config = Arc::new(ChannelConfig::from_env()?);
    let server_config = ServerConfig::proxy_from_env()?;
    logger.info("SSH config", Some(&channel_config.describe()));

    let channel = Arc::new(SshChannel::new(logger.clone(), channel_config));
    let app = router(logger.clone(), channel);
    logger.info(
        &format!("Starting Local Server on port {}", server_config.port),
        None,
    );
    super::serve(&server_config, app, &logger).await
}
