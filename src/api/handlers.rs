// Request handlers for the synchronous relay API

use axum::{extract::State, response::Json};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::flow::run_checkpoint;
use crate::api::responses::{ApiError, HealthResponse, VerifyResponse};
use crate::api::AppState;
use crate::core::models::{Direction, ToolDescriptor};

/// Default application identity for relay calls that do not carry one.
const RELAY_APP: &str = "cli";

/// Body of a relay verification call.
///
/// The relay tracks correlation out of process, so both operations are
/// stateless pass-throughs into the verification pipeline: no correlator
/// entry is created or consumed here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequestBody {
    pub tool_name: String,
    pub server_name: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponseBody {
    pub tool_name: String,
    pub server_name: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterToolsBody {
    pub app_name: String,
    pub server_name: String,
    pub tools: Vec<ToolDescriptor>,
}

/// POST /verify/request
///
/// Verify an outbound tool call on behalf of the command-line relay.
pub async fn verify_request_handler(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequestBody>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let app_name = body.app_name.as_deref().unwrap_or(RELAY_APP);
    info!(
        tool = %body.tool_name,
        server = %body.server_name,
        app = %app_name,
        "Relay request verification"
    );

    let outcome = run_checkpoint(
        &state,
        app_name,
        &body.server_name,
        &body.tool_name,
        &body.args,
        Direction::Request,
    )
    .await;

    Ok(Json(VerifyResponse {
        blocked: !outcome.allowed,
        reason: outcome.reason,
    }))
}

/// POST /verify/response
///
/// Verify a tool result on behalf of the command-line relay.
pub async fn verify_response_handler(
    State(state): State<AppState>,
    Json(body): Json<VerifyResponseBody>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let app_name = body.app_name.as_deref().unwrap_or(RELAY_APP);
    info!(
        tool = %body.tool_name,
        server = %body.server_name,
        app = %app_name,
        "Relay response verification"
    );

    let outcome = run_checkpoint(
        &state,
        app_name,
        &body.server_name,
        &body.tool_name,
        &body.response,
        Direction::Response,
    )
    .await;

    Ok(Json(VerifyResponse {
        blocked: !outcome.allowed,
        reason: outcome.reason,
    }))
}

/// POST /register-tools
///
/// Record a discovered tool catalog under its composite key and republish
/// it to the settings/configuration collaborator. Performs no verification.
pub async fn register_tools_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterToolsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = format!("{}:{}", body.app_name, body.server_name);
    info!(
        key = %key,
        tool_count = body.tools.len(),
        "Registering tool catalog"
    );

    {
        let mut catalogs = state.catalogs.lock().unwrap_or_else(|e| e.into_inner());
        catalogs.insert(key, body.tools.clone());
    }

    state
        .catalog
        .publish_tools(&body.app_name, &body.server_name, body.tools)
        .await;

    Ok(Json(json!({ "ok": true })))
}

/// GET /health
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        tracked_calls: state.correlator.len(),
        pending_alerts: state.alerts.pending_count(),
        scan_records: state.ledger.len(),
    }))
}
