// Incremental server-sent-event frame parser
//
// Decodes `event:`/`data:` framing from an upstream byte stream. Chunks
// arrive at arbitrary boundaries, so the parser buffers partial lines and
// dispatches an event at each blank line. Buffering is bounded to protect
// against a misbehaving upstream.

use bytes::{Buf, BytesMut};

use crate::core::constants::limits;
use crate::core::errors::GatewayError;

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; the protocol default is `message`.
    pub event: String,
    pub data: String,
}

/// Stateful decoder fed with raw upstream chunks.
#[derive(Default)]
pub struct SseFrameParser {
    buffer: BytesMut,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk and return every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, GatewayError> {
        if self.buffer.remaining() + chunk.len() > limits::MAX_EVENT_SIZE_BYTES {
            return Err(GatewayError::UpstreamError(format!(
                "stream event exceeded size limit of {} bytes",
                limits::MAX_EVENT_SIZE_BYTES
            )));
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw_line = self.buffer.split_to(newline + 1);
            let line = String::from_utf8_lossy(&raw_line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(value) = line.strip_prefix("event:") {
                self.event_name = Some(value.trim_start().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data_lines.push(value.trim_start().to_string());
            } else if line.starts_with(':') {
                // Comment / keep-alive line; ignored.
            }
            // Unknown fields (id:, retry:) are ignored for this relay.
        }

        Ok(events)
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.event_name.is_none() && self.data_lines.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.event_name.take().unwrap_or_else(|| "message".to_string()),
            data: self.data_lines.drain(..).collect::<Vec<_>>().join("\n"),
        };
        Some(event)
    }
}
