// Message submission endpoint - the request/response half of the duplex front end

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::flow::run_checkpoint;
use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::core::constants::jsonrpc;
use crate::core::errors::GatewayError;
use crate::core::models::{Direction, RpcEnvelope};

#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    /// Duplex connection this submission belongs to, when known.
    #[serde(default)]
    pub connection: Option<String>,
    /// Application identity for the legacy route, which has no path params.
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
}

/// POST /{app}/{server}/message
pub async fn submit_handler(
    State(state): State<AppState>,
    Path((app_name, server_name)): Path<(String, String)>,
    Query(params): Query<SubmitParams>,
    body: String,
) -> Result<Response, ApiError> {
    submit(state, app_name, server_name, params.connection, body).await
}

/// POST /message (legacy)
///
/// Older relays post here without path identity. An unresolved application
/// name degrades to `unknown`, which intentionally fails correlation on
/// the response side and downgrades to forward-without-verification.
pub async fn legacy_submit_handler(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    body: String,
) -> Result<Response, ApiError> {
    let app_name = params.app.unwrap_or_else(|| "unknown".to_string());
    let server_name = params.server.unwrap_or_else(|| "unknown".to_string());
    submit(state, app_name, server_name, params.connection, body).await
}

async fn submit(
    state: AppState,
    app_name: String,
    server_name: String,
    connection: Option<String>,
    body: String,
) -> Result<Response, ApiError> {
    let envelope: RpcEnvelope = serde_json::from_str(&body).map_err(|e| {
        GatewayError::ValidationError(format!("malformed envelope: {}", e))
    })?;

    let upstream_url = resolve_target(&state, &app_name, &server_name, connection.as_deref())
        .await
        .ok_or_else(|| {
            GatewayError::UnknownUpstream(format!("{}:{}", app_name, server_name))
        })?;

    // Tool invocations are verified before anything reaches the upstream;
    // every other envelope is relayed untouched.
    let tracked_key = if envelope.is_tool_call() {
        let tool_name = envelope.tool_name().unwrap_or("unknown").to_string();
        let arguments = envelope.tool_arguments();

        let outcome = run_checkpoint(
            &state,
            &app_name,
            &server_name,
            &tool_name,
            &arguments,
            Direction::Request,
        )
        .await;

        if !outcome.allowed {
            let reason = outcome
                .reason
                .unwrap_or_else(|| "blocked by security scan".to_string());
            let blocked = RpcEnvelope::error_response(
                envelope.id.clone(),
                jsonrpc::ERROR_SECURITY_BLOCK,
                &format!("Blocked by security scan: {}", reason),
            );
            // Blocking is a protocol-level outcome, not a transport failure.
            return Ok((StatusCode::OK, Json(blocked)).into_response());
        }

        envelope.id_string().map(|request_id| {
            state.correlator.track(
                &tool_name,
                &request_id,
                &server_name,
                &app_name,
                arguments,
            )
        })
    } else {
        debug!(method = ?envelope.method, "Relaying non-tool envelope unverified");
        None
    };

    let reply = match state.upstream.post_envelope(&upstream_url, &envelope).await {
        Ok(reply) => reply,
        Err(e) => {
            // The forward failed outright; the pending entry will never see
            // a response, so drop it rather than waiting out the sweep.
            if let Some(ref key) = tracked_key {
                state.correlator.remove(key);
            }
            return Err(e.into());
        }
    };

    let Some(reply_envelope) = reply.envelope else {
        // Asynchronous acknowledgment; the real payload arrives later over
        // the duplex stream. Passed through untouched.
        debug!(status = reply.status, "Upstream acknowledged without a direct payload");
        let status =
            StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Ok(status.into_response());
    };

    // A direct JSON reply answers the call synchronously: verify the
    // response direction before relaying, and consume the pending entry.
    if let Some(ref key) = tracked_key {
        state.correlator.remove(key);
    }

    if envelope.is_tool_call() {
        let tool_name = envelope.tool_name().unwrap_or("unknown").to_string();
        let payload = reply_envelope
            .result
            .clone()
            .unwrap_or(serde_json::Value::Null);

        let outcome = run_checkpoint(
            &state,
            &app_name,
            &server_name,
            &tool_name,
            &payload,
            Direction::Response,
        )
        .await;

        if !outcome.allowed {
            let reason = outcome
                .reason
                .unwrap_or_else(|| "blocked by security scan".to_string());
            warn!(tool = %tool_name, "Direct tool response blocked");
            let blocked = RpcEnvelope::error_response(
                reply_envelope.id.clone(),
                jsonrpc::ERROR_SECURITY_BLOCK,
                &format!("Response blocked by security scan: {}", reason),
            );
            return Ok((StatusCode::OK, Json(blocked)).into_response());
        }
    }

    info!(method = ?envelope.method, "Relaying upstream reply");
    Ok((StatusCode::OK, Json(reply_envelope)).into_response())
}

/// Pick the upstream message URL for a submission: the connection's learned
/// route when present, any live route for the pair, else the resolver's
/// base address.
async fn resolve_target(
    state: &AppState,
    app_name: &str,
    server_name: &str,
    connection: Option<&str>,
) -> Option<String> {
    if let Some(connection_id) = connection {
        if let Some(url) = state
            .registry
            .get(connection_id)
            .and_then(|e| e.upstream_message_url)
        {
            return Some(url);
        }
    }

    if let Some(url) = state.registry.find_route(app_name, server_name) {
        return Some(url);
    }

    state.resolver.resolve(app_name, server_name).await
}
