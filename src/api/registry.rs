// Connection registry - live duplex connections and their learned routes

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// State of one live duplex connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub app_name: String,
    pub server_name: String,
    /// Upstream message-submission URL, learned from the upstream endpoint
    /// event. Absent until that event arrives.
    pub upstream_message_url: Option<String>,
    /// Id of this connection's in-flight discovery probe, if any. The
    /// matching message event is consumed instead of relayed.
    pub probe_id: Option<String>,
}

/// Registry of live duplex connections keyed by connection id.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<String, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection_id: &str, entry: ConnectionEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(connection_id.to_string(), entry);
    }

    pub fn remove(&self, connection_id: &str) -> Option<ConnectionEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let removed = entries.remove(connection_id);
        if removed.is_some() {
            debug!(connection_id = %connection_id, "Connection removed from registry");
        }
        removed
    }

    pub fn get(&self, connection_id: &str) -> Option<ConnectionEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(connection_id).cloned()
    }

    /// Record the upstream message URL learned from an endpoint event.
    pub fn set_upstream_url(&self, connection_id: &str, url: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(connection_id) {
            entry.upstream_message_url = Some(url.to_string());
        }
    }

    /// Record the discovery probe id for a connection.
    pub fn set_probe_id(&self, connection_id: &str, probe_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(connection_id) {
            entry.probe_id = Some(probe_id.to_string());
        }
    }

    /// Find the learned message URL for any live connection serving the
    /// given (application, server) pair.
    pub fn find_route(&self, app_name: &str, server_name: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .find(|e| e.app_name == app_name && e.server_name == server_name)
            .and_then(|e| e.upstream_message_url.clone())
    }

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

    fn entry(app: &str, server: &str) -> ConnectionEntry {
        ConnectionEntry {
            app_name: app.to_string(),
            server_name: server.to_string(),
            upstream_message_url: None,
            probe_id: None,
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = ConnectionRegistry::new();
        registry.insert("conn-1", entry("editor", "calc"));
        assert!(registry.get("conn-1").is_some());
        assert!(registry.remove("conn-1").is_some());
        assert!(registry.get("conn-1").is_none());
    }

    #[test]
    fn test_route_found_after_endpoint_learned() {
        let registry = ConnectionRegistry::new();
        registry.insert("conn-1", entry("editor", "calc"));
        assert!(registry.find_route("editor", "calc").is_none());

        registry.set_upstream_url("conn-1", "http://localhost:9000/message?sessionId=s1");
        assert_eq!(
            registry.find_route("editor", "calc").as_deref(),
            Some("http://localhost:9000/message?sessionId=s1")
        );
        assert!(registry.find_route("editor", "files").is_none());
    }
}
