// Duplex stream front end - terminates the client's event stream and
// re-originates it against the true upstream server
//
// The caller never learns the upstream address: every endpoint event is
// rewritten to point back at this gateway's own message-submission path,
// and message events are inspected so correlated tool responses get
// verified before relay.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::flow::run_checkpoint;
use crate::api::registry::ConnectionEntry;
use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::core::constants::{jsonrpc, methods};
use crate::core::errors::GatewayError;
use crate::core::models::{Direction, RpcEnvelope, ToolDescriptor};
use crate::correlator::ToolCallCorrelator;
use crate::upstream::sse::{SseEvent, SseFrameParser};

/// Channel carrying relayed events to one downstream caller.
pub type DownstreamSender = mpsc::Sender<Result<Event, Infallible>>;

/// GET /{app}/{server}/sse
pub async fn stream_handler(
    State(state): State<AppState>,
    Path((app_name, server_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Sse<ReceiverStream<Result<Event, Infallible>>>, ApiError> {
    let accept = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !accept.contains("text/event-stream") && !accept.contains("*/*") {
        return Err(GatewayError::NotAcceptable(
            "caller must accept text/event-stream".to_string(),
        )
        .into());
    }

    let upstream_url = state
        .resolver
        .resolve(&app_name, &server_name)
        .await
        .ok_or_else(|| {
            GatewayError::UnknownUpstream(format!("{}:{}", app_name, server_name))
        })?;

    let connection_id = Uuid::new_v4().to_string();
    state.registry.insert(
        &connection_id,
        ConnectionEntry {
            app_name: app_name.clone(),
            server_name: server_name.clone(),
            upstream_message_url: None,
            probe_id: None,
        },
    );

    info!(
        connection_id = %connection_id,
        app = %app_name,
        server = %server_name,
        upstream = %upstream_url,
        "Duplex connection opened"
    );

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(64);

    // The caller submits through this gateway, never to the upstream
    // directly; hand it our own submission path immediately.
    let _ = tx
        .send(Ok(endpoint_event(&app_name, &server_name, &connection_id)))
        .await;

    tokio::spawn(relay_connection(
        state,
        connection_id,
        app_name,
        server_name,
        upstream_url,
        tx,
    ));

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

fn endpoint_event(app_name: &str, server_name: &str, connection_id: &str) -> Event {
    Event::default().event("endpoint").data(format!(
        "/{}/{}/message?connection={}",
        app_name, server_name, connection_id
    ))
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "error": message }).to_string())
}

/// Relay the upstream stream into the downstream channel until either side
/// goes away. Downstream disconnect aborts the upstream connection and
/// deregisters; upstream disconnect is reported as an error event while the
/// downstream stays open for further submissions.
async fn relay_connection(
    state: AppState,
    connection_id: String,
    app_name: String,
    server_name: String,
    upstream_url: String,
    tx: DownstreamSender,
) {
    let response = match state.upstream.open_stream(&upstream_url).await {
        Ok(response) => response,
        Err(e) => {
            error!(connection_id = %connection_id, error = %e, "Upstream stream connection failed");
            let _ = tx.send(Ok(error_event(&e.user_message()))).await;
            state.registry.remove(&connection_id);
            return;
        }
    };

    let mut upstream_stream = response.bytes_stream();
    let mut parser = SseFrameParser::new();

    loop {
        tokio::select! {
            _ = tx.closed() => {
                info!(connection_id = %connection_id, "Downstream disconnected; aborting upstream relay");
                state.registry.remove(&connection_id);
                return;
            }
            chunk = upstream_stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        let events = match parser.feed(&bytes) {
                            Ok(events) => events,
                            Err(e) => {
                                error!(connection_id = %connection_id, error = %e, "Upstream stream framing error");
                                let _ = tx.send(Ok(error_event(&e.user_message()))).await;
                                break;
                            }
                        };
                        for event in events {
                            if relay_event(&state, &connection_id, &app_name, &server_name, &upstream_url, &tx, event)
                                .await
                                .is_err()
                            {
                                state.registry.remove(&connection_id);
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, error = %e, "Upstream stream error");
                        let _ = tx.send(Ok(error_event("upstream connection error"))).await;
                        break;
                    }
                    None => {
                        info!(connection_id = %connection_id, "Upstream stream ended");
                        let _ = tx.send(Ok(error_event("upstream disconnected"))).await;
                        break;
                    }
                }
            }
        }
    }
    // Upstream is gone but the caller may keep submitting; the registry
    // entry stays until the downstream side disconnects.
}

/// Relay one upstream event, with the two inspection exceptions: endpoint
/// events are rewritten, message events are correlated and verified.
/// Returns Err when the downstream has gone away.
pub async fn relay_event(
    state: &AppState,
    connection_id: &str,
    app_name: &str,
    server_name: &str,
    upstream_url: &str,
    tx: &DownstreamSender,
    event: SseEvent,
) -> Result<(), ()> {
    match event.event.as_str() {
        "endpoint" => {
            if let Some(learned) = join_endpoint(upstream_url, &event.data) {
                debug!(connection_id = %connection_id, upstream_message_url = %learned, "Learned upstream message endpoint");
                state.registry.set_upstream_url(connection_id, &learned);
                spawn_discovery_probe(state, connection_id, app_name, server_name, &learned);
            } else {
                warn!(connection_id = %connection_id, data = %event.data, "Unresolvable upstream endpoint event");
            }
            // Relay the rewritten form; the true address never leaves.
            tx.send(Ok(endpoint_event(app_name, server_name, connection_id)))
                .await
                .map_err(|_| ())
        }
        "message" => {
            relay_message_event(state, connection_id, app_name, server_name, tx, event).await
        }
        _ => tx
            .send(Ok(Event::default().event(event.event).data(event.data)))
            .await
            .map_err(|_| ()),
    }
}

async fn relay_message_event(
    state: &AppState,
    connection_id: &str,
    app_name: &str,
    server_name: &str,
    tx: &DownstreamSender,
    event: SseEvent,
) -> Result<(), ()> {
    let envelope: RpcEnvelope = match serde_json::from_str(&event.data) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(connection_id = %connection_id, error = %e, "Non-envelope message event; relaying verbatim");
            return tx
                .send(Ok(Event::default().event("message").data(event.data)))
                .await
                .map_err(|_| ());
        }
    };

    // A discovery probe's answer belongs to the gateway, not the caller.
    let probe_id = state
        .registry
        .get(connection_id)
        .and_then(|entry| entry.probe_id);
    if probe_id.is_some() && envelope.id_string() == probe_id {
        debug!(connection_id = %connection_id, "Consuming discovery probe response");
        if let Some(ref result) = envelope.result {
            publish_discovered_tools(state, app_name, server_name, result).await;
        }
        return Ok(());
    }

    if let Some(request_id) = envelope.id_string() {
        let key = ToolCallCorrelator::key(app_name, server_name, &request_id);
        if let Some(pending) = state.correlator.lookup(&key) {
            let payload = envelope.result.clone().unwrap_or(serde_json::Value::Null);
            let outcome = run_checkpoint(
                state,
                app_name,
                server_name,
                &pending.tool_name,
                &payload,
                Direction::Response,
            )
            .await;

            // Consumed regardless of verdict; a retry is a new call.
            state.correlator.remove(&key);

            if !outcome.allowed {
                let reason = outcome
                    .reason
                    .unwrap_or_else(|| "blocked by security scan".to_string());
                let blocked = RpcEnvelope::error_response(
                    envelope.id.clone(),
                    jsonrpc::ERROR_SECURITY_BLOCK,
                    &format!("Response blocked by security scan: {}", reason),
                );
                let data = serde_json::to_string(&blocked).unwrap_or_default();
                return tx
                    .send(Ok(Event::default().event("message").data(data)))
                    .await
                    .map_err(|_| ());
            }
        } else if envelope.result.is_some() || envelope.error.is_some() {
            // Deliberate degraded path: an unmatched response is forwarded
            // unverified rather than dropped. Logged distinctly from a
            // genuine non-response message.
            warn!(
                connection_id = %connection_id,
                key = %key,
                degraded = true,
                "No pending call matched this response; relaying unverified"
            );
        }
    }

    tx.send(Ok(Event::default().event("message").data(event.data)))
        .await
        .map_err(|_| ())
}

/// Resolve an endpoint event's data against the upstream base URL.
fn join_endpoint(upstream_url: &str, data: &str) -> Option<String> {
    if data.starts_with("http://") || data.starts_with("https://") {
        return Some(data.to_string());
    }
    url::Url::parse(upstream_url)
        .ok()?
        .join(data)
        .ok()
        .map(String::from)
}

/// Issue a tools/list probe so the catalog can be republished. The answer
/// may come back directly or over the stream; both paths consume it.
fn spawn_discovery_probe(
    state: &AppState,
    connection_id: &str,
    app_name: &str,
    server_name: &str,
    upstream_message_url: &str,
) {
    let probe_id = format!("discovery-{}", Uuid::new_v4());
    state.registry.set_probe_id(connection_id, &probe_id);

    let probe = RpcEnvelope {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(probe_id)),
        method: Some(methods::TOOLS_LIST.to_string()),
        params: None,
        result: None,
        error: None,
    };

    let state = state.clone();
    let app_name = app_name.to_string();
    let server_name = server_name.to_string();
    let url = upstream_message_url.to_string();
    tokio::spawn(async move {
        match state.upstream.post_envelope(&url, &probe).await {
            Ok(reply) => {
                if let Some(result) = reply.envelope.and_then(|e| e.result) {
                    publish_discovered_tools(&state, &app_name, &server_name, &result).await;
                }
            }
            Err(e) => {
                debug!(error = %e, "Discovery probe failed");
            }
        }
    });
}

async fn publish_discovered_tools(
    state: &AppState,
    app_name: &str,
    server_name: &str,
    result: &serde_json::Value,
) {
    let tools: Vec<ToolDescriptor> = match result.get("tools") {
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_default(),
        None => return,
    };
    if tools.is_empty() {
        return;
    }

    info!(
        app = %app_name,
        server = %server_name,
        tool_count = tools.len(),
        "Discovered upstream tool catalog"
    );

    {
        let key = format!("{}:{}", app_name, server_name);
        let mut catalogs = state.catalogs.lock().unwrap_or_else(|e| e.into_inner());
        catalogs.insert(key, tools.clone());
    }

    state
        .catalog
        .publish_tools(app_name, server_name, tools)
        .await;
}
