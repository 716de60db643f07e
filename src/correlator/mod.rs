// In-flight tool call correlation - pairs an asynchronous response with its request

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::core::constants::timing;

/// Correlation entry for an in-flight tool call.
///
/// Created when a request is forwarded upstream; consumed when its matching
/// response is verified, or reaped once older than the max age.
#[derive(Debug, Clone)]
pub struct PendingToolCall {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub tracked_at: Instant,
}

/// Maps an in-flight request key to its metadata so the matching response
/// can be found later.
///
/// The key is `app:server:request_id` and must be constructed identically
/// on the request-tracking and response-matching sides; a mismatch silently
/// produces no match, which downgrades to forward-without-verification
/// rather than an error.
pub struct ToolCallCorrelator {
    entries: Mutex<HashMap<String, PendingToolCall>>,
    max_age: Duration,
}

impl Default for ToolCallCorrelator {
    fn default() -> Self {
        Self::new(Duration::from_secs(timing::CORRELATOR_MAX_AGE_SECS))
    }
}

impl ToolCallCorrelator {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    /// Deterministic composite key shared by both sides of a correlation.
    pub fn key(app_name: &str, server_name: &str, request_id: &str) -> String {
        format!("{}:{}:{}", app_name, server_name, request_id)
    }

    /// Track a forwarded request. Sweeps stale entries opportunistically so
    /// an idle map does not grow without bound under steady traffic.
    pub fn track(
        &self,
        tool_name: &str,
        request_id: &str,
        server_name: &str,
        app_name: &str,
        arguments: serde_json::Value,
    ) -> String {
        let swept = self.sweep_stale();
        if swept > 0 {
            info!(swept, "Reaped stale pending tool calls");
        }

        let key = Self::key(app_name, server_name, request_id);
        let entry = PendingToolCall {
            tool_name: tool_name.to_string(),
            arguments,
            tracked_at: Instant::now(),
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.clone(), entry);
        debug!(key = %key, tool = %tool_name, "Tracked pending tool call");
        key
    }

    /// Look up a pending call by key. Entries past the max age are never
    /// matched, even before a sweep has removed them.
    pub fn lookup(&self, key: &str) -> Option<PendingToolCall> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|e| e.tracked_at.elapsed() <= self.max_age)
            .cloned()
    }

    /// Remove a consumed entry.
    pub fn remove(&self, key: &str) -> Option<PendingToolCall> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key)
    }

    /// Remove every entry older than the max age; returns the count removed.
    pub fn sweep_stale(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.tracked_at.elapsed() <= self.max_age);
        before - entries.len()
    }

    /// Number of currently tracked calls.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_track_then_lookup_same_key() {
        let correlator = ToolCallCorrelator::default();
        let key = correlator.track("add", "42", "calc", "editor", json!({"a": 2, "b": 3}));
        assert_eq!(key, "editor:calc:42");

        let entry = correlator.lookup(&key).expect("tracked entry must match");
        assert_eq!(entry.tool_name, "add");
        assert_eq!(entry.arguments["b"], 3);
    }

    #[test]
    fn test_lookup_with_differing_component_is_absent() {
        let correlator = ToolCallCorrelator::default();
        correlator.track("add", "42", "calc", "editor", json!({}));

        assert!(correlator
            .lookup(&ToolCallCorrelator::key("editor", "calc", "43"))
            .is_none());
        assert!(correlator
            .lookup(&ToolCallCorrelator::key("editor", "files", "42"))
            .is_none());
        assert!(correlator
            .lookup(&ToolCallCorrelator::key("unknown", "calc", "42"))
            .is_none());
    }

    #[test]
    fn test_remove_consumes_entry() {
        let correlator = ToolCallCorrelator::default();
        let key = correlator.track("add", "1", "calc", "editor", json!({}));
        assert!(correlator.remove(&key).is_some());
        assert!(correlator.lookup(&key).is_none());
        assert!(correlator.remove(&key).is_none());
    }

    #[test]
    fn test_stale_entry_swept_and_never_matched() {
        let correlator = ToolCallCorrelator::new(Duration::from_millis(0));
        let key = correlator.track("add", "1", "calc", "editor", json!({}));
        std::thread::sleep(Duration::from_millis(5));

        // Past max age: excluded from lookup even before the sweep runs.
        assert!(correlator.lookup(&key).is_none());

        let swept = correlator.sweep_stale();
        assert_eq!(swept, 1);
        assert!(correlator.is_empty());
        assert!(correlator.lookup(&key).is_none());
    }

    #[test]
    fn test_track_sweeps_opportunistically() {
        let correlator = ToolCallCorrelator::new(Duration::from_millis(0));
        correlator.track("old", "1", "calc", "editor", json!({}));
        std::thread::sleep(Duration::from_millis(5));

        correlator.track("new", "2", "calc", "editor", json!({}));
        // The stale entry was reaped on arrival of the new request.
        assert_eq!(correlator.len(), 1);
    }
}
