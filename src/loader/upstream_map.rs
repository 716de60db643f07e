// Static upstream map - resolves (application, server) pairs to base URLs

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::core::errors::GatewayError;
use crate::core::traits::UpstreamResolver;

#[derive(Debug, Deserialize)]
struct UpstreamEntry {
    app: String,
    server: String,
    url: String,
}

/// Upstream resolver backed by a fixed table loaded at startup.
///
/// The real deployment resolves addresses from per-application client
/// configuration; this table is the standalone equivalent.
pub struct StaticUpstreamMap {
    routes: HashMap<String, String>,
}

impl StaticUpstreamMap {
    pub fn from_file(path: &Path) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::ConfigurationError(format!(
                "Failed to read upstream map {:?}: {}",
                path, e
            ))
        })?;

        let entries: Vec<UpstreamEntry> = serde_yaml::from_str(&raw).map_err(|e| {
            GatewayError::ConfigurationError(format!(
                "Failed to parse upstream map {:?}: {}",
                path, e
            ))
        })?;

        let mut routes = HashMap::new();
        for entry in entries {
            url::Url::parse(&entry.url).map_err(|e| {
                GatewayError::ConfigurationError(format!(
                    "Invalid upstream URL '{}' for {}:{}: {}",
                    entry.url, entry.app, entry.server, e
                ))
            })?;
            routes.insert(format!("{}:{}", entry.app, entry.server), entry.url);
        }

        info!(path = ?path, count = routes.len(), "Loaded upstream map");
        Ok(Self { routes })
    }

    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Insert a route directly. Used by tests and programmatic wiring.
    pub fn insert(&mut self, app: &str, server: &str, url: &str) {
        self.routes
            .insert(format!("{}:{}", app, server), url.to_string());
    }
}

#[async_trait::async_trait]
impl UpstreamResolver for StaticUpstreamMap {
    async fn resolve(&self, app_name: &str, server_name: &str) -> Option<String> {
        self.routes
            .get(&format!("{}:{}", app_name, server_name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_resolve_known_pair() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"- app: editor\n  server: calc\n  url: http://localhost:9000/sse\n",
        )
        .unwrap();

        let map = StaticUpstreamMap::from_file(file.path()).unwrap();
        assert_eq!(
            map.resolve("editor", "calc").await.as_deref(),
            Some("http://localhost:9000/sse")
        );
        assert!(map.resolve("editor", "files").await.is_none());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"- app: editor\n  server: calc\n  url: not-a-url\n")
            .unwrap();
        assert!(StaticUpstreamMap::from_file(file.path()).is_err());
    }
}
