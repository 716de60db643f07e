// Verification engine - turns a raw tool-call payload into an allow/block decision

pub mod judge;
pub mod native;
pub mod parser;
pub mod prompt;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::models::{
    Direction, SettingsSnapshot, Signature, SignatureCheck, SignatureVerdict, VerificationResult,
};
use crate::core::traits::{SettingsProvider, SignatureStore};
use crate::engine::judge::Judge;

/// Checks payloads against the active signature set through a judge backend.
///
/// The engine is pure decision logic: it never writes the ledger or talks
/// to upstream tool servers. Callers own all side effects.
pub struct VerificationEngine {
    signatures: Arc<dyn SignatureStore>,
    settings: Arc<dyn SettingsProvider>,
    judge: Arc<dyn Judge>,
}

impl VerificationEngine {
    pub fn new(
        signatures: Arc<dyn SignatureStore>,
        settings: Arc<dyn SettingsProvider>,
        judge: Arc<dyn Judge>,
    ) -> Self {
        Self {
            signatures,
            settings,
            judge,
        }
    }

    /// Verify one payload in one direction.
    ///
    /// Missing policy fails closed on the request side and open on the
    /// response side: a broken signature feed should not break functioning
    /// tool output, but must never wave an unchecked call through. Judge
    /// failures collapse to the same asymmetry.
    pub async fn verify(
        &self,
        direction: Direction,
        tool_name: &str,
        payload: &serde_json::Value,
    ) -> VerificationResult {
        let settings = self.settings.snapshot().await;

        if !settings.scan_mode.covers(direction) {
            debug!(
                tool = %tool_name,
                direction = %direction,
                mode = ?settings.scan_mode,
                "Scan skipped by mode"
            );
            return VerificationResult::system(
                true,
                format!(
                    "scan skipped: {} direction is excluded by the configured scan mode",
                    direction
                ),
            );
        }

        let signatures: Vec<Signature> = self
            .signatures
            .active_signatures()
            .await
            .into_iter()
            .filter(|s| !settings.disabled_signature_ids.contains(&s.id))
            .collect();

        if signatures.is_empty() {
            return match direction {
                Direction::Request => {
                    warn!(tool = %tool_name, "No signatures available; blocking request");
                    VerificationResult::system(false, "no signatures available")
                }
                Direction::Response => {
                    VerificationResult::system(true, "no signatures available")
                }
            };
        }

        match self
            .evaluate_signatures(&settings, direction, tool_name, payload, &signatures)
            .await
        {
            Ok(verdicts) => {
                let allowed = verdicts.values().all(|v| v.allowed);
                if !allowed {
                    info!(
                        tool = %tool_name,
                        direction = %direction,
                        "Verification blocked by signature verdict"
                    );
                }
                VerificationResult { allowed, verdicts }
            }
            Err(e) => {
                // Failure inside the judge path collapses to a single
                // synthetic verdict with the same request/response asymmetry
                // as the empty signature set.
                let allowed = direction == Direction::Response;
                warn!(
                    tool = %tool_name,
                    direction = %direction,
                    allowed,
                    error = %e,
                    "Verification failed; applying direction default"
                );
                VerificationResult::system(allowed, e.to_string())
            }
        }
    }

    async fn evaluate_signatures(
        &self,
        settings: &SettingsSnapshot,
        direction: Direction,
        tool_name: &str,
        payload: &serde_json::Value,
        signatures: &[Signature],
    ) -> Result<HashMap<String, SignatureVerdict>, crate::core::errors::GatewayError> {
        let mut verdicts = HashMap::new();
        let mut judged: Vec<Signature> = Vec::new();

        for signature in signatures {
            match &signature.check {
                SignatureCheck::Native { function } => {
                    verdicts.insert(
                        signature.id.clone(),
                        native::evaluate(function, tool_name, payload),
                    );
                }
                SignatureCheck::Judged { .. } => judged.push(signature.clone()),
            }
        }

        if !judged.is_empty() {
            let instructions = prompt::direction_instructions(direction);
            let input = prompt::build_input(&judged, tool_name, payload);

            let reply = self
                .judge
                .evaluate(&settings.judge, instructions, &input)
                .await?;

            let ids: Vec<&str> = judged.iter().map(|s| s.id.as_str()).collect();
            verdicts.extend(parser::parse_signature_verdicts(
                &reply.output,
                &ids,
                &reply.judge_id,
            ));
        }

        Ok(verdicts)
    }
}
