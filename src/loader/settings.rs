// Env-backed settings provider - the standalone binary's settings collaborator

use std::collections::HashSet;
use std::env;

use crate::core::models::{JudgeCredentials, ScanMode, SettingsSnapshot};
use crate::core::traits::SettingsProvider;

/// Settings provider that reads the environment on every snapshot.
///
/// The deployed system receives settings from its desktop shell; reading
/// env vars per call keeps the same always-fresh contract for the
/// standalone binary.
#[derive(Default)]
pub struct EnvSettingsProvider;

impl EnvSettingsProvider {
    pub fn new() -> Self {
        Self
    }

    fn scan_mode() -> ScanMode {
        match env::var("SCAN_MODE").as_deref() {
            Ok("none") => ScanMode::Disabled,
            Ok("requests-only") => ScanMode::RequestsOnly,
            Ok("responses-only") => ScanMode::ResponsesOnly,
            _ => ScanMode::Both,
        }
    }

    fn disabled_ids() -> HashSet<String> {
        env::var("DISABLED_SIGNATURES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn judge_credentials() -> JudgeCredentials {
        JudgeCredentials {
            provider: env::var("JUDGE_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
            hosted_token: env::var("HOSTED_LOGIN_TOKEN").ok().filter(|s| !s.is_empty()),
            hosted_provider: env::var("HOSTED_PROVIDER").ok().filter(|s| !s.is_empty()),
            api_key: env::var("JUDGE_API_KEY").ok().filter(|s| !s.is_empty()),
            model: env::var("JUDGE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        }
    }
}

#[async_trait::async_trait]
impl SettingsProvider for EnvSettingsProvider {
    async fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            scan_mode: Self::scan_mode(),
            disabled_signature_ids: Self::disabled_ids(),
            judge: Self::judge_credentials(),
        }
    }
}

/// Fixed settings for programmatic wiring and tests.
pub struct StaticSettingsProvider {
    snapshot: SettingsSnapshot,
}

impl StaticSettingsProvider {
    pub fn new(snapshot: SettingsSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait::async_trait]
impl SettingsProvider for StaticSettingsProvider {
    async fn snapshot(&self) -> SettingsSnapshot {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var parsing is exercised through the pure helpers; the env itself
    // is process-global and other tests run in parallel.

    #[test]
    fn test_disabled_ids_parsing() {
        env::set_var("DISABLED_SIGNATURES", "sig-1, sig-2,,sig-3 ");
        let ids = EnvSettingsProvider::disabled_ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("sig-2"));
        env::remove_var("DISABLED_SIGNATURES");
    }

    #[tokio::test]
    async fn test_static_provider_returns_fixed_snapshot() {
        let provider = StaticSettingsProvider::new(SettingsSnapshot {
            scan_mode: ScanMode::RequestsOnly,
            ..Default::default()
        });
        let snapshot = provider.snapshot().await;
        assert_eq!(snapshot.scan_mode, ScanMode::RequestsOnly);
    }
}
