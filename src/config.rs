// Configuration management

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::constants::{limits, timing};
use crate::core::errors::GatewayError;

/// Application configuration loaded from environment variables.
///
/// All configuration is validated on load with clear error messages.
/// Scan-time settings (scan mode, disabled signatures, judge credentials)
/// are not here: those come from the settings collaborator on every
/// verification so they can change without a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,

    // Collaborator file paths (defaults for the standalone binary)
    pub signatures_path: Option<PathBuf>,
    pub upstream_map_path: Option<PathBuf>,

    // Judge backends
    pub hosted_judge_url: String,
    pub model_judge_url: String,
    pub judge_timeout_secs: u64,

    // Upstream forwarding
    pub upstream_timeout_secs: u64,

    // Escalation
    pub alert_timeout_secs: u64,

    // Middleware configuration
    pub request_timeout_secs: u64,
    pub body_size_limit_bytes: usize,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    pub fn from_env() -> Result<Self, GatewayError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok(); // Ignore errors (file may not exist)
        }

        let config = Self {
            bind_address: Self::get_env_or_default("BIND_ADDRESS", "127.0.0.1"),
            port: Self::parse_port()?,
            signatures_path: Self::get_optional_path("SIGNATURES_PATH"),
            upstream_map_path: Self::get_optional_path("UPSTREAM_MAP_PATH"),
            hosted_judge_url: Self::get_env_or_default(
                "HOSTED_JUDGE_URL",
                "https://judge.toolgate.dev",
            ),
            model_judge_url: Self::get_env_or_default(
                "MODEL_JUDGE_URL",
                "https://api.openai.com",
            ),
            judge_timeout_secs: Self::parse_u64_or_default("JUDGE_TIMEOUT_SECS", 60)?,
            upstream_timeout_secs: Self::parse_u64_or_default("UPSTREAM_TIMEOUT_SECS", 30)?,
            alert_timeout_secs: Self::parse_u64_or_default(
                "ALERT_TIMEOUT_SECS",
                timing::ALERT_TIMEOUT_SECS,
            )?,
            request_timeout_secs: Self::parse_u64_or_default("REQUEST_TIMEOUT_SECS", 120)?,
            body_size_limit_bytes: Self::parse_usize_or_default(
                "BODY_SIZE_LIMIT_BYTES",
                limits::MAX_BODY_SIZE_BYTES,
            )?,
            log_level: Self::get_env_or_default("LOG_LEVEL", "info"),
            log_format: Self::get_env_or_default("LOG_FORMAT", "text"),
        };

        config.validate()?;
        Ok(config)
    }

    fn get_env_or_default(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    fn get_optional_path(key: &str) -> Option<PathBuf> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Some(PathBuf::from(value)),
            _ => None,
        }
    }

    fn parse_port() -> Result<u16, GatewayError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8127".to_string());
        let port = port_str.parse::<u16>().map_err(|e| {
            GatewayError::ConfigurationError(format!("Invalid PORT value '{}': {}", port_str, e))
        })?;

        if port == 0 {
            return Err(GatewayError::ConfigurationError(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }

        Ok(port)
    }

    fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, GatewayError> {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.parse::<u64>().map_err(|e| {
                    GatewayError::ConfigurationError(format!(
                        "Invalid {} value '{}': {}",
                        key, value, e
                    ))
                })?;

                if parsed == 0 {
                    return Err(GatewayError::ConfigurationError(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }

                Ok(parsed)
            }
            _ => Ok(default),
        }
    }

    fn parse_usize_or_default(key: &str, default: usize) -> Result<usize, GatewayError> {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.parse::<usize>().map_err(|e| {
                    GatewayError::ConfigurationError(format!(
                        "Invalid {} value '{}': {}",
                        key, value, e
                    ))
                })?;

                if parsed == 0 {
                    return Err(GatewayError::ConfigurationError(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }

                Ok(parsed)
            }
            _ => Ok(default),
        }
    }

    /// Validate all configuration values
    fn validate(&self) -> Result<(), GatewayError> {
        // The global request timeout must outlast the escalation ceiling,
        // or every escalated call would time out at the transport first.
        if self.request_timeout_secs <= self.alert_timeout_secs {
            return Err(GatewayError::ConfigurationError(format!(
                "REQUEST_TIMEOUT_SECS ({}) must exceed ALERT_TIMEOUT_SECS ({})",
                self.request_timeout_secs, self.alert_timeout_secs
            )));
        }

        if let Some(ref path) = self.signatures_path {
            Self::validate_file_path(path, "Signatures file")?;
        }
        if let Some(ref path) = self.upstream_map_path {
            Self::validate_file_path(path, "Upstream map file")?;
        }

        Self::validate_url(&self.hosted_judge_url, "Hosted judge URL")?;
        Self::validate_url(&self.model_judge_url, "Model judge URL")?;
        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;

        Ok(())
    }

    fn validate_file_path(path: &PathBuf, description: &str) -> Result<(), GatewayError> {
        if !path.exists() {
            return Err(GatewayError::ConfigurationError(format!(
                "{} not found at {:?}",
                description, path
            )));
        }

        if !path.is_file() {
            return Err(GatewayError::ConfigurationError(format!(
                "{} is not a file: {:?}",
                description, path
            )));
        }

        Ok(())
    }

    fn validate_url(url: &str, description: &str) -> Result<(), GatewayError> {
        url::Url::parse(url).map_err(|e| {
            GatewayError::ConfigurationError(format!(
                "Invalid {} '{}': {}",
                description, url, e
            ))
        })?;
        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<(), GatewayError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(GatewayError::ConfigurationError(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), GatewayError> {
        if format != "json" && format != "text" {
            return Err(GatewayError::ConfigurationError(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Create a test configuration for unit and integration tests.
    ///
    /// Bypasses environment loading and file validation.
    pub fn test_config() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8127,
            signatures_path: None,
            upstream_map_path: None,
            hosted_judge_url: "http://localhost:9901".to_string(),
            model_judge_url: "http://localhost:9902".to_string(),
            judge_timeout_secs: 5,
            upstream_timeout_secs: 5,
            alert_timeout_secs: 1,
            request_timeout_secs: 120,
            body_size_limit_bytes: limits::MAX_BODY_SIZE_BYTES,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_log_level() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(Config::validate_log_level(level).is_ok());
        }
        assert!(Config::validate_log_level("loud").is_err());
    }

    #[test]
    fn test_validate_log_format() {
        assert!(Config::validate_log_format("json").is_ok());
        assert!(Config::validate_log_format("text").is_ok());
        assert!(Config::validate_log_format("xml").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(Config::validate_url("http://localhost:9901", "Judge URL").is_ok());
        assert!(Config::validate_url("not-a-url", "Judge URL").is_err());
    }

    #[test]
    fn test_request_timeout_must_exceed_alert_timeout() {
        let mut config = Config::test_config();
        config.request_timeout_secs = 30;
        config.alert_timeout_secs = 30;
        assert!(config.validate().is_err());

        config.request_timeout_secs = 31;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_file_path_not_exists() {
        let path = PathBuf::from("/nonexistent/signatures.yaml");
        assert!(Config::validate_file_path(&path, "Signatures file").is_err());
    }

    #[test]
    fn test_validate_file_path_exists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("signatures.yaml");
        std::fs::write(&path, "[]").unwrap();
        assert!(Config::validate_file_path(&path, "Signatures file").is_ok());
    }
}
