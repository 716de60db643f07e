// Collaborator interfaces - the boundary to everything this engine does not own
//
// Signatures, settings, upstream addresses, and the observation surfaces are
// supplied by external collaborators. Every component receives these as
// injected trait objects at construction; there are no ambient singletons.

use crate::core::models::{SecurityAlertRequest, SettingsSnapshot, Signature, ToolDescriptor};

/// Supplies the active signature set. The set is replaced wholesale on
/// reload; per-id disablement happens through settings, not here.
#[async_trait::async_trait]
pub trait SignatureStore: Send + Sync {
    async fn active_signatures(&self) -> Vec<Signature>;
}

/// Supplies the current settings snapshot on every verification.
#[async_trait::async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn snapshot(&self) -> SettingsSnapshot;
}

/// Resolves the true upstream base URL for an (application, server) pair.
#[async_trait::async_trait]
pub trait UpstreamResolver: Send + Sync {
    async fn resolve(&self, app_name: &str, server_name: &str) -> Option<String>;
}

/// Receives discovered tool catalogs for republication to the
/// settings/configuration collaborator.
#[async_trait::async_trait]
pub trait CatalogSink: Send + Sync {
    async fn publish_tools(&self, app_name: &str, server_name: &str, tools: Vec<ToolDescriptor>);
}

/// Catalog sink that only logs. Default for headless operation.
pub struct TracingCatalogSink;

#[async_trait::async_trait]
impl CatalogSink for TracingCatalogSink {
    async fn publish_tools(&self, app_name: &str, server_name: &str, tools: Vec<ToolDescriptor>) {
        tracing::debug!(
            app = %app_name,
            server = %server_name,
            tool_count = tools.len(),
            "Tool catalog published"
        );
    }
}

/// External surface that presents a security alert to a human.
///
/// Delivery is fire-and-forget; a decision, if any, comes back through
/// `AlertCoordinator::resolve`. A surface that never answers is valid —
/// the coordinator's deny backstop governs.
#[async_trait::async_trait]
pub trait DecisionSurface: Send + Sync {
    async fn request_decision(&self, request: SecurityAlertRequest);
}
