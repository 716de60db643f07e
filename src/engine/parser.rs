// Judge output parsing - extracts per-signature verdict blocks
//
// The judge answers in loosely structured text. The matching contract is
// narrow and deliberate: for each signature id, find a block of the form
// `SIGNATURE ID: <id> ... ALLOWED: <true|false> ... REASON: <text>`;
// absence of a match defaults that signature to allowed. Everything about
// that contract lives behind this module so the text format can be swapped
// for structured output without touching the engine's control flow.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::core::models::SignatureVerdict;

/// Default reason recorded when the judge returned no block for an id.
const NO_VERDICT_REASON: &str = "no verdict returned for this signature";

/// Parse the judge's raw output into one verdict per requested signature id.
///
/// Ids with no matching block are defaulted to allowed.
pub fn parse_signature_verdicts(
    output: &str,
    signature_ids: &[&str],
    judge: &str,
) -> HashMap<String, SignatureVerdict> {
    let mut verdicts = HashMap::new();

    for id in signature_ids {
        let verdict = match extract_block(output, id) {
            Some((allowed, reason)) => SignatureVerdict {
                allowed,
                reason,
                judge: judge.to_string(),
            },
            None => {
                debug!(signature_id = %id, "No verdict block in judge output; defaulting to allowed");
                SignatureVerdict {
                    allowed: true,
                    reason: NO_VERDICT_REASON.to_string(),
                    judge: judge.to_string(),
                }
            }
        };
        verdicts.insert((*id).to_string(), verdict);
    }

    verdicts
}

/// Find the `ALLOWED` / `REASON` pair belonging to one signature id.
fn extract_block(output: &str, signature_id: &str) -> Option<(bool, String)> {
    let pattern = format!(
        r"(?is)SIGNATURE\s+ID:\s*{}\s.*?ALLOWED:\s*(true|false)\b(?:.*?REASON:\s*([^\r\n]*))?",
        regex::escape(signature_id)
    );
    // Pattern construction only fails on an invalid expression, which the
    // escape above rules out; treat failure as no match.
    let re = Regex::new(&pattern).ok()?;
    let captures = re.captures(output)?;

    let allowed = captures
        .get(1)
        .map(|m| m.as_str().eq_ignore_ascii_case("true"))?;
    let reason = captures
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "no reason given".to_string());

    Some((allowed, reason))
}
