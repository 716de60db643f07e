// Native signature functions - deterministic checks that run in-process

use tracing::warn;

use crate::core::models::SignatureVerdict;

/// Evaluate a native signature function against a tool call.
///
/// A function name the build does not provide evaluates to allowed with a
/// warning; blocking on a wiring mistake would take down every tool at
/// once, the same stance as the response-side fail-open default.
pub fn evaluate(function: &str, tool_name: &str, payload: &serde_json::Value) -> SignatureVerdict {
    let verdict = |allowed: bool, reason: String| SignatureVerdict {
        allowed,
        reason,
        judge: format!("native:{}", function),
    };

    match function {
        "deny_shell_exec" => {
            let shell_tools = ["exec", "shell", "bash", "sh", "run_command", "execute"];
            if shell_tools.contains(&tool_name) {
                verdict(false, format!("tool '{}' executes shell commands", tool_name))
            } else {
                verdict(true, "not a shell execution tool".to_string())
            }
        }
        "deny_env_dump" => {
            let env_tools = ["printEnv", "print_env", "env", "getenv"];
            let mentions_env = payload.to_string().contains("process.env");
            if env_tools.contains(&tool_name) || mentions_env {
                verdict(false, "environment variable dump".to_string())
            } else {
                verdict(true, "no environment access detected".to_string())
            }
        }
        other => {
            warn!(function = %other, "Unknown native signature function; defaulting to allowed");
            verdict(true, format!("unknown native function: {}", other))
        }
    }
}
