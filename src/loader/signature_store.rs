// YAML-backed signature store - default SignatureStore for the standalone binary

use std::path::Path;
use std::sync::RwLock;

use tracing::info;

use crate::core::errors::GatewayError;
use crate::core::models::Signature;
use crate::core::traits::SignatureStore;

/// Signature set loaded from a YAML file.
///
/// The set is immutable between reloads; `reload` replaces it wholesale,
/// never merges.
pub struct YamlSignatureStore {
    signatures: RwLock<Vec<Signature>>,
}

impl YamlSignatureStore {
    /// Load signatures from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, GatewayError> {
        let signatures = Self::parse_file(path)?;
        info!(
            path = ?path,
            count = signatures.len(),
            "Loaded signature set"
        );
        Ok(Self {
            signatures: RwLock::new(signatures),
        })
    }

    /// Empty store for configurations without a signature file. Requests
    /// will fail closed until a real set is loaded.
    pub fn empty() -> Self {
        Self {
            signatures: RwLock::new(Vec::new()),
        }
    }

    /// Replace the active set wholesale from the same file format.
    pub fn reload(&self, path: &Path) -> Result<usize, GatewayError> {
        let signatures = Self::parse_file(path)?;
        let count = signatures.len();
        let mut active = self.signatures.write().unwrap_or_else(|e| e.into_inner());
        *active = signatures;
        Ok(count)
    }

    fn parse_file(path: &Path) -> Result<Vec<Signature>, GatewayError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::ConfigurationError(format!(
                "Failed to read signatures file {:?}: {}",
                path, e
            ))
        })?;

        let signatures: Vec<Signature> = serde_yaml::from_str(&raw).map_err(|e| {
            GatewayError::ConfigurationError(format!(
                "Failed to parse signatures file {:?}: {}",
                path, e
            ))
        })?;

        // Duplicate ids would make per-id disablement ambiguous.
        let mut seen = std::collections::HashSet::new();
        for signature in &signatures {
            if !seen.insert(signature.id.as_str()) {
                return Err(GatewayError::ConfigurationError(format!(
                    "Duplicate signature id '{}' in {:?}",
                    signature.id, path
                )));
            }
        }

        Ok(signatures)
    }
}

#[async_trait::async_trait]
impl SignatureStore for YamlSignatureStore {
    async fn active_signatures(&self) -> Vec<Signature> {
        let signatures = self.signatures.read().unwrap_or_else(|e| e.into_inner());
        signatures.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::SignatureCheck;
    use std::io::Write;

    const SIGNATURES_YAML: &str = r#"
- id: sig-exfil
  name: Environment exfiltration
  description: Flags tool calls that read environment variables
  category: exfiltration
  kind: judged
  prompt: Does this tool call attempt to read environment variables or secrets?
- id: sig-shell
  name: Shell execution
  description: Blocks shell execution tools outright
  category: execution
  kind: native
  function: deny_shell_exec
"#;

    fn write_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_mixed_signature_kinds() {
        let file = write_yaml(SIGNATURES_YAML);
        let store = YamlSignatureStore::from_file(file.path()).unwrap();
        let signatures = store.active_signatures().await;

        assert_eq!(signatures.len(), 2);
        assert!(matches!(signatures[0].check, SignatureCheck::Judged { .. }));
        match &signatures[1].check {
            SignatureCheck::Native { function } => assert_eq!(function, "deny_shell_exec"),
            other => panic!("Expected native check, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let file = write_yaml(
            r#"
- id: sig-1
  name: a
  description: d
  category: c
  kind: judged
  prompt: p
- id: sig-1
  name: b
  description: d
  category: c
  kind: judged
  prompt: p
"#,
        );
        assert!(YamlSignatureStore::from_file(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_reload_replaces_wholesale() {
        let first = write_yaml(SIGNATURES_YAML);
        let store = YamlSignatureStore::from_file(first.path()).unwrap();

        let second = write_yaml(
            r#"
- id: sig-new
  name: replacement
  description: d
  category: c
  kind: judged
  prompt: p
"#,
        );
        let count = store.reload(second.path()).unwrap();
        assert_eq!(count, 1);

        let signatures = store.active_signatures().await;
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].id, "sig-new");
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = YamlSignatureStore::empty();
        assert!(store.active_signatures().await.is_empty());
    }
}
