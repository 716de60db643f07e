// Axum web server layer

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

pub mod flow;
pub mod handlers;
pub mod message;
pub mod registry;
pub mod responses;
pub mod stream;

use crate::alert::AlertCoordinator;
use crate::config::Config;
use crate::core::models::ToolDescriptor;
use crate::core::traits::{CatalogSink, UpstreamResolver};
use crate::correlator::ToolCallCorrelator;
use crate::engine::VerificationEngine;
use crate::ledger::ScanLedger;
use crate::upstream::UpstreamClient;

use registry::ConnectionRegistry;

/// Application state containing all shared dependencies.
///
/// Components are wrapped in Arc for shared ownership across async tasks;
/// external collaborators are injected as trait objects at construction.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<ScanLedger>,
    pub correlator: Arc<ToolCallCorrelator>,
    pub engine: Arc<VerificationEngine>,
    pub alerts: Arc<AlertCoordinator>,
    pub registry: Arc<ConnectionRegistry>,
    pub upstream: Arc<UpstreamClient>,
    pub resolver: Arc<dyn UpstreamResolver>,
    pub catalog: Arc<dyn CatalogSink>,
    /// Tool catalogs recorded by registration or discovery, keyed
    /// `app:server`.
    pub catalogs: Arc<Mutex<HashMap<String, Vec<ToolDescriptor>>>>,
}

/// Create the Axum router with all routes and middleware.
///
/// The stream route is mounted without the request timeout: a duplex
/// connection is long-lived by design. Everything else gets the body-size
/// limit and the global timeout (which must exceed the escalation ceiling,
/// validated at config load).
pub fn create_router(app_state: AppState) -> Router {
    let timeout_secs = app_state.config.request_timeout_secs;
    let body_limit = app_state.config.body_size_limit_bytes;

    let timed_routes = Router::new()
        .route("/:app/:server/message", post(message::submit_handler))
        .route("/message", post(message::legacy_submit_handler))
        .route("/verify/request", post(handlers::verify_request_handler))
        .route("/verify/response", post(handlers::verify_response_handler))
        .route("/register-tools", post(handlers::register_tools_handler))
        .route("/health", get(handlers::health_handler))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|e: BoxError| async move {
                    let status = if e.is::<tower::timeout::error::Elapsed>() {
                        StatusCode::REQUEST_TIMEOUT
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    };
                    (status, e.to_string())
                }))
                .timeout(Duration::from_secs(timeout_secs)),
        );

    let stream_routes = Router::new().route("/:app/:server/sse", get(stream::stream_handler));

    timed_routes.merge(stream_routes).with_state(app_state)
}
