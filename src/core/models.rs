// Domain models - pure data structures with no I/O dependencies

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Traffic direction of a verified payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// A tool call on its way to the upstream server.
    Request,
    /// A tool result on its way back to the client.
    Response,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Request => write!(f, "request"),
            Direction::Response => write!(f, "response"),
        }
    }
}

/// Which traffic directions get verified at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    /// No verification in either direction.
    #[serde(rename = "none")]
    Disabled,
    RequestsOnly,
    ResponsesOnly,
    #[default]
    Both,
}

impl ScanMode {
    /// Whether this mode covers the given direction.
    pub fn covers(&self, direction: Direction) -> bool {
        match (self, direction) {
            (ScanMode::Disabled, _) => false,
            (ScanMode::Both, _) => true,
            (ScanMode::RequestsOnly, Direction::Request) => true,
            (ScanMode::ResponsesOnly, Direction::Response) => true,
            _ => false,
        }
    }
}

/// The check a signature performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureCheck {
    /// Natural-language prompt evaluated by the judge backend.
    Judged { prompt: String },
    /// Deterministic built-in function identified by name.
    Native { function: String },
}

/// A named security check evaluated against tool calls or their responses.
///
/// Signatures are immutable once loaded; the active set is replaced
/// wholesale on reload and individual ids can be disabled through settings
/// without removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(flatten)]
    pub check: SignatureCheck,
}

/// One judge's verdict for one signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureVerdict {
    pub allowed: bool,
    pub reason: String,
    /// Identifier of the judge that produced this verdict.
    pub judge: String,
}

/// Outcome of checking one payload against the active signature set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub allowed: bool,
    /// Per-signature verdicts keyed by signature id. Synthetic entries use
    /// the reserved ids `system` and `user_override`.
    pub verdicts: HashMap<String, SignatureVerdict>,
}

/// Reserved verdict id for engine-synthesized outcomes.
pub const SYSTEM_VERDICT_ID: &str = "system";
/// Reserved verdict id for a human override decision.
pub const USER_OVERRIDE_VERDICT_ID: &str = "user_override";

impl VerificationResult {
    /// Single-verdict result synthesized by the engine itself.
    pub fn system(allowed: bool, reason: impl Into<String>) -> Self {
        let mut verdicts = HashMap::new();
        verdicts.insert(
            SYSTEM_VERDICT_ID.to_string(),
            SignatureVerdict {
                allowed,
                reason: reason.into(),
                judge: SYSTEM_VERDICT_ID.to_string(),
            },
        );
        Self { allowed, verdicts }
    }

    /// Allowed result annotated with a human override verdict, replacing
    /// whatever the automated pipeline decided.
    pub fn user_override() -> Self {
        let mut verdicts = HashMap::new();
        verdicts.insert(
            USER_OVERRIDE_VERDICT_ID.to_string(),
            SignatureVerdict {
                allowed: true,
                reason: "Operation approved by user decision".to_string(),
                judge: USER_OVERRIDE_VERDICT_ID.to_string(),
            },
        );
        Self {
            allowed: true,
            verdicts,
        }
    }

    /// First blocking reason, if any. Used for error envelopes and alerts.
    pub fn block_reason(&self) -> Option<&str> {
        self.verdicts
            .values()
            .find(|v| !v.allowed)
            .map(|v| v.reason.as_str())
    }
}

/// Lifecycle state of a scan record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    InProgress,
    Completed,
    Error,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanStatus::InProgress)
    }
}

/// Durable audit record for one verified operation.
///
/// Created in `InProgress` state the instant a call is observed and updated
/// to a terminal state once a verdict is known. The id is stable across
/// that transition so observers can track a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub app_name: String,
    pub server_name: String,
    pub tool_name: String,
    /// Serialized arguments (request direction) or response body.
    pub payload: String,
    pub direction: Direction,
    pub allowed: bool,
    pub verdicts: HashMap<String, SignatureVerdict>,
    pub elapsed_ms: u64,
    pub status: ScanStatus,
}

/// Escalation envelope asking an external surface for a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlertRequest {
    pub id: String,
    pub scan: ScanResult,
}

/// The human decision for a previously emitted alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlertResponse {
    pub id: String,
    pub allowed: bool,
}

/// Credentials for the judge backend.
///
/// A hosted login token takes precedence when present and its provider
/// matches the configured one; otherwise the directly-configured model key
/// is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeCredentials {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
}

/// Read-only settings snapshot supplied by the external settings
/// collaborator on every verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub scan_mode: ScanMode,
    pub disabled_signature_ids: HashSet<String>,
    pub judge: JudgeCredentials,
}

/// Tool metadata discovered from an upstream server's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: serde_json::Value,
}

/// JSON-RPC 2.0 envelope carried over both wire styles.
///
/// A single struct with optional fields covers requests, responses, and
/// notifications; the gateway inspects rather than owns the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcEnvelope {
    /// Whether this envelope is a tool invocation.
    pub fn is_tool_call(&self) -> bool {
        self.method.as_deref() == Some("tools/call")
    }

    /// Tool name from `params.name`, if this is a tool call.
    pub fn tool_name(&self) -> Option<&str> {
        self.params.as_ref()?.get("name")?.as_str()
    }

    /// Tool arguments from `params.arguments`; defaults to null.
    pub fn tool_arguments(&self) -> serde_json::Value {
        self.params
            .as_ref()
            .and_then(|p| p.get("arguments"))
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }

    /// Response id as a correlation string, if present.
    pub fn id_string(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Build an error envelope answering `id`.
    pub fn error_response(id: Option<serde_json::Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: None,
            params: None,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_mode_covers() {
        assert!(ScanMode::Both.covers(Direction::Request));
        assert!(ScanMode::Both.covers(Direction::Response));
        assert!(ScanMode::RequestsOnly.covers(Direction::Request));
        assert!(!ScanMode::RequestsOnly.covers(Direction::Response));
        assert!(ScanMode::ResponsesOnly.covers(Direction::Response));
        assert!(!ScanMode::ResponsesOnly.covers(Direction::Request));
        assert!(!ScanMode::Disabled.covers(Direction::Request));
        assert!(!ScanMode::Disabled.covers(Direction::Response));
    }

    #[test]
    fn test_scan_mode_serde_names() {
        assert_eq!(serde_json::to_string(&ScanMode::Disabled).unwrap(), "\"none\"");
        assert_eq!(
            serde_json::to_string(&ScanMode::RequestsOnly).unwrap(),
            "\"requests-only\""
        );
        let mode: ScanMode = serde_json::from_str("\"responses-only\"").unwrap();
        assert_eq!(mode, ScanMode::ResponsesOnly);
    }

    #[test]
    fn test_signature_check_yaml_tagging() {
        let sig: Signature = serde_yaml::from_str(
            r#"
id: sig-001
name: Env exfiltration
description: Flags attempts to read environment variables
category: exfiltration
kind: judged
prompt: Does this call read environment variables?
"#,
        )
        .unwrap();
        assert_eq!(sig.id, "sig-001");
        match sig.check {
            SignatureCheck::Judged { ref prompt } => {
                assert!(prompt.contains("environment"));
            }
            _ => panic!("Expected judged signature"),
        }
    }

    #[test]
    fn test_system_result_block_reason() {
        let result = VerificationResult::system(false, "no signatures available");
        assert!(!result.allowed);
        assert_eq!(result.block_reason(), Some("no signatures available"));
        assert_eq!(result.verdicts[SYSTEM_VERDICT_ID].judge, "system");
    }

    #[test]
    fn test_user_override_result() {
        let result = VerificationResult::user_override();
        assert!(result.allowed);
        assert!(result.verdicts.contains_key(USER_OVERRIDE_VERDICT_ID));
        assert!(result.block_reason().is_none());
    }

    #[test]
    fn test_envelope_tool_call_accessors() {
        let envelope: RpcEnvelope = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "add", "arguments": {"a": 2, "b": 3}}
        }))
        .unwrap();
        assert!(envelope.is_tool_call());
        assert_eq!(envelope.tool_name(), Some("add"));
        assert_eq!(envelope.tool_arguments()["a"], 2);
        assert_eq!(envelope.id_string().as_deref(), Some("7"));
    }

    #[test]
    fn test_envelope_error_response_shape() {
        let envelope =
            RpcEnvelope::error_response(Some(json!("req-1")), -32000, "Blocked by security scan");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["error"]["code"], -32000);
        assert!(value.get("method").is_none());
        assert!(value.get("result").is_none());
    }
}
