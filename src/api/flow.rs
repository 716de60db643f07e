// Checkpoint flow - the shared verify/escalate/record sequence
//
// Every front end funnels a tool call or tool response through this one
// sequence: open a ledger record, verify, escalate on block, fold the
// outcome back into the record. The lifecycle is
// observed -> verifying -> (allowed -> forwarded)
//                        | (blocked -> escalated -> override | blocked-final)
// and each terminal state is exactly one ledger record reaching a terminal
// status.

use std::time::Instant;

use tracing::{info, warn};

use crate::api::AppState;
use crate::core::models::{Direction, ScanResult, VerificationResult, SYSTEM_VERDICT_ID};

/// Outcome of one checkpointed operation.
#[derive(Debug, Clone)]
pub struct CheckpointOutcome {
    pub allowed: bool,
    /// First blocking reason when not allowed.
    pub reason: Option<String>,
    pub scan: ScanResult,
}

/// Run one payload through verification, escalation, and the ledger.
pub async fn run_checkpoint(
    state: &AppState,
    app_name: &str,
    server_name: &str,
    tool_name: &str,
    payload: &serde_json::Value,
    direction: Direction,
) -> CheckpointOutcome {
    let started = Instant::now();

    let scan = state
        .ledger
        .begin(app_name, server_name, tool_name, payload, direction)
        .await;

    let mut result = state.engine.verify(direction, tool_name, payload).await;

    if !result.allowed {
        // Hand the pending record, with the blocking verdicts attached, to
        // the human decision surface.
        let mut alert_scan = scan.clone();
        alert_scan.verdicts = result.verdicts.clone();

        if state.alerts.escalate(&alert_scan).await {
            info!(
                scan_id = %scan.id,
                tool = %tool_name,
                "Block overridden by user decision"
            );
            result = VerificationResult::user_override();
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let reason = result.block_reason().map(String::from);

    let updated = if is_engine_failure(&result) {
        state
            .ledger
            .error(scan.id, result.allowed, result.verdicts, elapsed_ms)
            .await
    } else {
        state
            .ledger
            .complete(scan.id, result.allowed, result.verdicts, elapsed_ms)
            .await
    };

    let scan = updated.unwrap_or(scan);
    if !scan.allowed {
        warn!(
            scan_id = %scan.id,
            tool = %tool_name,
            direction = %direction,
            reason = ?reason,
            "Operation blocked"
        );
    }

    CheckpointOutcome {
        allowed: scan.allowed,
        reason,
        scan,
    }
}

/// Whether a result was synthesized from a judge failure rather than an
/// actual evaluation. Such records land in the ledger's error state, with
/// the raw error text preserved as the reason.
fn is_engine_failure(result: &VerificationResult) -> bool {
    result
        .verdicts
        .get(SYSTEM_VERDICT_ID)
        .map(|v| v.reason.starts_with("Judge error:"))
        .unwrap_or(false)
}
