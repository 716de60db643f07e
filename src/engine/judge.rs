// Judge backends - hosted service or directly-configured model over HTTP

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::core::errors::GatewayError;
use crate::core::models::JudgeCredentials;

/// Raw judge reply: the free-text evaluation plus the identifier of the
/// backend that produced it (recorded in every verdict).
#[derive(Debug, Clone)]
pub struct JudgeReply {
    pub output: String,
    pub judge_id: String,
}

/// Backend that evaluates an instruction/input pair into verdict text.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(
        &self,
        credentials: &JudgeCredentials,
        instructions: &str,
        input: &str,
    ) -> Result<JudgeReply, GatewayError>;
}

/// Which backend a credential set selects.
#[derive(Debug, Clone, PartialEq)]
enum JudgeTarget {
    /// Hosted evaluation service, authenticated by login token.
    Hosted { token: String },
    /// OpenAI-compatible chat completions endpoint, authenticated by key.
    Direct { api_key: String, model: String },
}

/// Select the backend for a credential set.
///
/// A hosted login token wins when present and its provider matches the
/// configured one; otherwise the directly-configured model key is used.
fn select_target(credentials: &JudgeCredentials) -> Result<JudgeTarget, GatewayError> {
    if let Some(ref token) = credentials.hosted_token {
        let provider_matches = credentials
            .hosted_provider
            .as_deref()
            .map(|p| p == credentials.provider)
            .unwrap_or(false);
        if provider_matches {
            return Ok(JudgeTarget::Hosted {
                token: token.clone(),
            });
        }
    }

    if let Some(ref api_key) = credentials.api_key {
        return Ok(JudgeTarget::Direct {
            api_key: api_key.clone(),
            model: credentials.model.clone(),
        });
    }

    Err(GatewayError::JudgeError(
        "no judge credentials configured".to_string(),
    ))
}

/// HTTP judge speaking both backend styles through one pooled client.
pub struct HttpJudge {
    http_client: Client,
    hosted_base_url: String,
    model_base_url: String,
}

#[derive(Debug, Deserialize)]
struct HostedReply {
    output: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionReply {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpJudge {
    /// Create a judge client with connection pooling.
    ///
    /// No hard timeout is enforced here beyond the backend call's own; the
    /// escalation ceiling elsewhere is the system's only hard deadline.
    pub fn new(
        hosted_base_url: String,
        model_base_url: String,
        timeout_secs: u64,
    ) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                GatewayError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            hosted_base_url,
            model_base_url,
        })
    }

    async fn evaluate_hosted(
        &self,
        token: &str,
        provider: &str,
        model: &str,
        instructions: &str,
        input: &str,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/v1/judge", self.hosted_base_url.trim_end_matches('/'));
        debug!(url = %url, provider = %provider, "Invoking hosted judge");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "provider": provider,
                "model": model,
                "instructions": instructions,
                "input": input,
            }))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Hosted judge returned HTTP error");
            return Err(GatewayError::JudgeError(format!(
                "hosted judge error: HTTP {} - {}",
                status, body
            )));
        }

        let reply: HostedReply = response.json().await.map_err(|e| {
            GatewayError::JudgeError(format!("failed to parse hosted judge reply: {}", e))
        })?;
        Ok(reply.output)
    }

    async fn evaluate_direct(
        &self,
        api_key: &str,
        model: &str,
        instructions: &str,
        input: &str,
    ) -> Result<String, GatewayError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.model_base_url.trim_end_matches('/')
        );
        debug!(url = %url, model = %model, "Invoking model judge");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": model,
                "messages": [
                    {"role": "system", "content": instructions},
                    {"role": "user", "content": input},
                ],
            }))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Model judge returned HTTP error");
            return Err(GatewayError::JudgeError(format!(
                "model judge error: HTTP {} - {}",
                status, body
            )));
        }

        let reply: ChatCompletionReply = response.json().await.map_err(|e| {
            GatewayError::JudgeError(format!("failed to parse model judge reply: {}", e))
        })?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::JudgeError("model judge reply had no choices".to_string()))
    }
}

fn map_send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::JudgeError(format!("judge request timed out: {}", e))
    } else if e.is_connect() {
        GatewayError::JudgeError(format!("judge connection failed: {}", e))
    } else {
        GatewayError::JudgeError(format!("judge request failed: {}", e))
    }
}

#[async_trait]
impl Judge for HttpJudge {
    async fn evaluate(
        &self,
        credentials: &JudgeCredentials,
        instructions: &str,
        input: &str,
    ) -> Result<JudgeReply, GatewayError> {
        match select_target(credentials)? {
            JudgeTarget::Hosted { token } => {
                let output = self
                    .evaluate_hosted(
                        &token,
                        &credentials.provider,
                        &credentials.model,
                        instructions,
                        input,
                    )
                    .await?;
                Ok(JudgeReply {
                    output,
                    judge_id: format!("hosted:{}", credentials.provider),
                })
            }
            JudgeTarget::Direct { api_key, model } => {
                let output = self
                    .evaluate_direct(&api_key, &model, instructions, input)
                    .await?;
                Ok(JudgeReply {
                    output,
                    judge_id: format!("model:{}", model),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(
        hosted_token: Option<&str>,
        hosted_provider: Option<&str>,
        api_key: Option<&str>,
    ) -> JudgeCredentials {
        JudgeCredentials {
            provider: "securityhub".to_string(),
            hosted_token: hosted_token.map(String::from),
            hosted_provider: hosted_provider.map(String::from),
            api_key: api_key.map(String::from),
            model: "judge-small".to_string(),
        }
    }

    #[test]
    fn test_hosted_preferred_when_provider_matches() {
        let creds = credentials(Some("tok"), Some("securityhub"), Some("key"));
        match select_target(&creds).unwrap() {
            JudgeTarget::Hosted { token } => assert_eq!(token, "tok"),
            other => panic!("Expected hosted target, got {:?}", other),
        }
    }

    #[test]
    fn test_direct_used_on_provider_mismatch() {
        let creds = credentials(Some("tok"), Some("otherhub"), Some("key"));
        match select_target(&creds).unwrap() {
            JudgeTarget::Direct { api_key, model } => {
                assert_eq!(api_key, "key");
                assert_eq!(model, "judge-small");
            }
            other => panic!("Expected direct target, got {:?}", other),
        }
    }

    #[test]
    fn test_direct_used_without_hosted_token() {
        let creds = credentials(None, None, Some("key"));
        assert!(matches!(
            select_target(&creds).unwrap(),
            JudgeTarget::Direct { .. }
        ));
    }

    #[test]
    fn test_no_credentials_is_an_error() {
        let creds = credentials(None, None, None);
        assert!(select_target(&creds).is_err());
    }
}
