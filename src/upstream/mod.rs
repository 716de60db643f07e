// Upstream transport - HTTP client for the true tool servers

pub mod sse;

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, error};

use crate::core::errors::GatewayError;
use crate::core::models::RpcEnvelope;

/// Reply from a synchronous envelope submission.
///
/// An upstream may answer a submission directly with a JSON envelope, or
/// acknowledge with an empty/non-JSON status and deliver the real payload
/// later over the event stream. Both shapes are preserved for the caller.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub envelope: Option<RpcEnvelope>,
}

/// Pooled HTTP client for upstream servers.
///
/// Two underlying clients: envelope submissions carry a request timeout,
/// while stream connections must stay open indefinitely and only bound the
/// connection handshake.
pub struct UpstreamClient {
    rpc_client: Client,
    stream_client: Client,
}

impl UpstreamClient {
    pub fn new(timeout_secs: u64) -> Result<Self, GatewayError> {
        let connect_timeout = Duration::from_secs(5);

        let rpc_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(connect_timeout)
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                GatewayError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;

        let stream_client = Client::builder()
            .connect_timeout(connect_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                GatewayError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            rpc_client,
            stream_client,
        })
    }

    /// Open the upstream event stream. The returned response is consumed
    /// incrementally through `bytes_stream()` by the relay.
    pub async fn open_stream(&self, url: &str) -> Result<reqwest::Response, GatewayError> {
        debug!(url = %url, "Opening upstream event stream");

        let response = self
            .stream_client
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Upstream stream connection rejected");
            return Err(GatewayError::UpstreamError(format!(
                "upstream stream error: HTTP {}",
                status
            )));
        }

        Ok(response)
    }

    /// Submit one envelope to the upstream message endpoint.
    pub async fn post_envelope(
        &self,
        url: &str,
        envelope: &RpcEnvelope,
    ) -> Result<UpstreamReply, GatewayError> {
        debug!(url = %url, method = ?envelope.method, "Forwarding envelope upstream");

        let response = self
            .rpc_client
            .post(url)
            .header("Content-Type", "application/json")
            .json(envelope)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        let body = response.bytes().await.map_err(|e| {
            GatewayError::UpstreamError(format!("failed to read upstream reply: {}", e))
        })?;

        // A no-body or non-JSON status is an asynchronous acknowledgment;
        // the real payload arrives later over the event stream.
        let envelope = if is_json && !body.is_empty() {
            match serde_json::from_slice::<RpcEnvelope>(&body) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    debug!(error = %e, "Upstream reply body is not a protocol envelope");
                    None
                }
            }
        } else {
            None
        };

        Ok(UpstreamReply { status, envelope })
    }
}

fn map_send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::TransientError(format!("upstream request timed out: {}", e))
    } else if e.is_connect() {
        GatewayError::UpstreamError("upstream connection failed".to_string())
    } else {
        GatewayError::UpstreamError(format!("upstream request failed: {}", e))
    }
}
