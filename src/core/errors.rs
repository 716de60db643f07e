// Domain error types - secure error handling with no information disclosure

use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed request payload (HTTP 400)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No upstream registered for the requested application/server (HTTP 404)
    #[error("Unknown upstream: {0}")]
    UnknownUpstream(String),

    /// Caller did not declare stream-event acceptance (HTTP 406)
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    /// Judge backend failure during verification (absorbed, never a transport error)
    #[error("Judge error: {0}")]
    JudgeError(String),

    /// Upstream server unreachable or misbehaving (HTTP 502)
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Upstream request timed out (HTTP 504)
    #[error("Upstream timeout: {0}")]
    TransientError(String),

    /// Internal state management error (HTTP 500)
    #[error("State error: {0}")]
    StateError(String),

    /// Configuration error (HTTP 500)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl GatewayError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::ValidationError(_) => 400,
            GatewayError::UnknownUpstream(_) => 404,
            GatewayError::NotAcceptable(_) => 406,
            GatewayError::JudgeError(_) => 500,
            GatewayError::UpstreamError(_) => 502,
            GatewayError::TransientError(_) => 504,
            GatewayError::StateError(_) => 500,
            GatewayError::ConfigurationError(_) => 500,
        }
    }

    /// Get user-friendly error message (no sensitive information)
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::ValidationError(reason) => format!("Validation error: {}", reason),
            GatewayError::UnknownUpstream(target) => format!("Unknown upstream: {}", target),
            GatewayError::NotAcceptable(reason) => format!("Not acceptable: {}", reason),
            GatewayError::JudgeError(_) => "Internal error".to_string(),
            GatewayError::UpstreamError(_) => "Upstream unavailable".to_string(),
            GatewayError::TransientError(_) => "Upstream timeout".to_string(),
            GatewayError::StateError(_) => "Internal error".to_string(),
            GatewayError::ConfigurationError(_) => "Internal error".to_string(),
        }
    }
}
