// Security alert coordination - bounded-time human escalation of blocked calls

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::constants::timing;
use crate::core::models::{ScanResult, SecurityAlertRequest, SecurityAlertResponse};
use crate::core::traits::DecisionSurface;

/// Surface that only logs alerts. The deny backstop answers for it.
pub struct TracingDecisionSurface;

#[async_trait::async_trait]
impl DecisionSurface for TracingDecisionSurface {
    async fn request_decision(&self, request: SecurityAlertRequest) {
        info!(
            alert_id = %request.id,
            tool = %request.scan.tool_name,
            "Security alert raised; no decision surface attached, timeout will deny"
        );
    }
}

/// Requests a human decision for a blocked operation with a hard ceiling.
///
/// Exactly one response resolves a given alert id: the pending entry is
/// removed on first resolution, so a duplicate or late response finds
/// nothing and is ignored. If nothing arrives before the timeout the
/// decision is deny - the fail-safe default against an unresponsive human.
pub struct AlertCoordinator {
    pending: Mutex<HashMap<String, oneshot::Sender<bool>>>,
    surface: Arc<dyn DecisionSurface>,
    timeout: Duration,
}

impl AlertCoordinator {
    pub fn new(surface: Arc<dyn DecisionSurface>) -> Self {
        Self::with_timeout(surface, Duration::from_secs(timing::ALERT_TIMEOUT_SECS))
    }

    pub fn with_timeout(surface: Arc<dyn DecisionSurface>, timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            surface,
            timeout,
        }
    }

    /// Escalate a blocked scan and wait for the human decision.
    ///
    /// Returns the decision: `true` to override the block, `false` to keep
    /// it. Timeout resolves to `false`.
    pub async fn escalate(&self, scan: &ScanResult) -> bool {
        let alert_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(alert_id.clone(), tx);
        }

        info!(
            alert_id = %alert_id,
            scan_id = %scan.id,
            tool = %scan.tool_name,
            "Requesting human decision for blocked operation"
        );

        self.surface
            .request_decision(SecurityAlertRequest {
                id: alert_id.clone(),
                scan: scan.clone(),
            })
            .await;

        let decision = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(allowed)) => {
                info!(alert_id = %alert_id, allowed, "Human decision received");
                allowed
            }
            Ok(Err(_)) => {
                // Sender dropped without a decision; treat as deny.
                warn!(alert_id = %alert_id, "Alert resolver dropped without decision; denying");
                false
            }
            Err(_) => {
                info!(alert_id = %alert_id, "Alert timed out; denying");
                false
            }
        };

        // On timeout the entry is still registered; discard it so a late
        // response is ignored as unknown rather than resolving anything.
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&alert_id);

        decision
    }

    /// Deliver a decision from the external surface.
    ///
    /// A response whose id matches no pending alert - late, duplicate, or
    /// simply unknown - is logged and ignored.
    pub fn resolve(&self, response: SecurityAlertResponse) {
        let sender = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(&response.id)
        };

        match sender {
            Some(tx) => {
                if tx.send(response.allowed).is_err() {
                    debug!(alert_id = %response.id, "Alert already resolved by timeout");
                }
            }
            None => {
                warn!(alert_id = %response.id, "Response for unknown alert id ignored");
            }
        }
    }

    /// Number of alerts currently awaiting a decision.
    pub fn pending_count(&self) -> usize {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Direction, ScanStatus};
    use chrono::Utc;
    use std::time::Instant;

    fn scan() -> ScanResult {
        ScanResult {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            app_name: "editor".to_string(),
            server_name: "calc".to_string(),
            tool_name: "printEnv".to_string(),
            payload: "{}".to_string(),
            direction: Direction::Request,
            allowed: false,
            verdicts: HashMap::new(),
            elapsed_ms: 3,
            status: ScanStatus::InProgress,
        }
    }

    /// Surface double that captures the emitted alert id.
    struct CapturingSurface {
        captured: Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl DecisionSurface for CapturingSurface {
        async fn request_decision(&self, request: SecurityAlertRequest) {
            *self.captured.lock().unwrap() = Some(request.id);
        }
    }

    fn coordinator_with_capture(
        timeout: Duration,
    ) -> (Arc<AlertCoordinator>, Arc<CapturingSurface>) {
        let surface = Arc::new(CapturingSurface {
            captured: Mutex::new(None),
        });
        let coordinator = Arc::new(AlertCoordinator::with_timeout(surface.clone(), timeout));
        (coordinator, surface)
    }

    #[tokio::test]
    async fn test_timeout_resolves_to_deny_within_bounded_margin() {
        let (coordinator, _) = coordinator_with_capture(Duration::from_millis(50));
        let started = Instant::now();
        let decision = coordinator.escalate(&scan()).await;

        assert!(!decision);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500));
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_matching_response_cancels_timer_and_carries_value() {
        let (coordinator, surface) = coordinator_with_capture(Duration::from_secs(30));

        let resolver = coordinator.clone();
        let surface_clone = surface.clone();
        tokio::spawn(async move {
            // Wait for the alert to be emitted, then answer it.
            loop {
                let id = surface_clone.captured.lock().unwrap().clone();
                if let Some(id) = id {
                    resolver.resolve(SecurityAlertResponse { id, allowed: true });
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let started = Instant::now();
        let decision = coordinator.escalate(&scan()).await;
        assert!(decision);
        // Resolved well before the 30-second ceiling.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_non_matching_id_never_resolves_pending_alert() {
        let (coordinator, _) = coordinator_with_capture(Duration::from_millis(80));

        let resolver = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve(SecurityAlertResponse {
                id: "not-a-real-alert".to_string(),
                allowed: true,
            });
        });

        // The stray response is ignored; the timeout denies.
        let decision = coordinator.escalate(&scan()).await;
        assert!(!decision);
    }

    #[tokio::test]
    async fn test_second_resolution_is_a_no_op() {
        let (coordinator, surface) = coordinator_with_capture(Duration::from_secs(30));

        let resolver = coordinator.clone();
        let surface_clone = surface.clone();
        tokio::spawn(async move {
            loop {
                let id = surface_clone.captured.lock().unwrap().clone();
                if let Some(id) = id {
                    resolver.resolve(SecurityAlertResponse {
                        id: id.clone(),
                        allowed: false,
                    });
                    // Second response with the opposite value must be ignored.
                    resolver.resolve(SecurityAlertResponse { id, allowed: true });
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let decision = coordinator.escalate(&scan()).await;
        assert!(!decision);
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_is_ignored() {
        let (coordinator, surface) = coordinator_with_capture(Duration::from_millis(30));
        let decision = coordinator.escalate(&scan()).await;
        assert!(!decision);

        // The alert has expired; its id is gone from the pending map.
        let id = surface.captured.lock().unwrap().clone().unwrap();
        coordinator.resolve(SecurityAlertResponse { id, allowed: true });
        assert_eq!(coordinator.pending_count(), 0);
    }
}
