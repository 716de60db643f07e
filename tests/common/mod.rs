// Shared wiring for integration tests

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use toolgate::alert::AlertCoordinator;
use toolgate::api::registry::ConnectionRegistry;
use toolgate::api::AppState;
use toolgate::config::Config;
use toolgate::core::models::{
    JudgeCredentials, ScanMode, SecurityAlertRequest, SettingsSnapshot, ToolDescriptor,
};
use toolgate::core::traits::{CatalogSink, DecisionSurface};
use toolgate::correlator::ToolCallCorrelator;
use toolgate::engine::judge::HttpJudge;
use toolgate::engine::VerificationEngine;
use toolgate::ledger::{ScanLedger, TracingScanSink};
use toolgate::loader::settings::StaticSettingsProvider;
use toolgate::loader::signature_store::YamlSignatureStore;
use toolgate::loader::upstream_map::StaticUpstreamMap;
use toolgate::upstream::UpstreamClient;

/// Two judged signatures used across the scenarios.
pub const DEFAULT_SIGNATURES: &str = r#"
- id: sig-exfil
  name: Environment exfiltration
  description: Flags tool calls that leak environment variables
  category: exfiltration
  kind: judged
  prompt: Does this operation read or transmit environment variables?
- id: sig-destructive
  name: Destructive operation
  description: Flags irreversible filesystem or database mutations
  category: destruction
  kind: judged
  prompt: Does this operation destroy data irreversibly?
"#;

/// Judge output allowing every default signature.
pub const JUDGE_ALL_ALLOWED: &str = "SIGNATURE ID: sig-exfil\nALLOWED: true\nREASON: benign\n\
                                     SIGNATURE ID: sig-destructive\nALLOWED: true\nREASON: benign\n";

/// Judge output blocking sig-exfil.
pub const JUDGE_EXFIL_BLOCKED: &str =
    "SIGNATURE ID: sig-exfil\nALLOWED: false\nREASON: environment exfiltration risk\n\
     SIGNATURE ID: sig-destructive\nALLOWED: true\nREASON: benign\n";

/// Wrap raw judge text in the model backend's completion reply shape.
pub fn judge_reply_body(output: &str) -> String {
    serde_json::json!({
        "choices": [{ "message": { "content": output } }]
    })
    .to_string()
}

/// Decision surface that forwards alert requests into a channel so tests
/// can observe and answer them.
pub struct ChannelSurface(pub mpsc::UnboundedSender<SecurityAlertRequest>);

#[async_trait]
impl DecisionSurface for ChannelSurface {
    async fn request_decision(&self, request: SecurityAlertRequest) {
        let _ = self.0.send(request);
    }
}

/// Catalog sink that records every publication.
pub struct RecordingCatalogSink(pub Arc<Mutex<Vec<(String, String, Vec<ToolDescriptor>)>>>);

#[async_trait]
impl CatalogSink for RecordingCatalogSink {
    async fn publish_tools(&self, app_name: &str, server_name: &str, tools: Vec<ToolDescriptor>) {
        self.0
            .lock()
            .unwrap()
            .push((app_name.to_string(), server_name.to_string(), tools));
    }
}

pub struct Harness {
    pub state: AppState,
    /// Alerts emitted by escalation, in order.
    pub alerts_rx: mpsc::UnboundedReceiver<SecurityAlertRequest>,
    /// Catalog publications, in order.
    pub published_catalogs: Arc<Mutex<Vec<(String, String, Vec<ToolDescriptor>)>>>,
    _signatures_file: tempfile::NamedTempFile,
}

pub struct HarnessOptions {
    /// Base URL of the mocked model judge backend.
    pub judge_url: String,
    pub signatures_yaml: &'static str,
    pub scan_mode: ScanMode,
    pub disabled_signature_ids: Vec<String>,
    /// (app, server, url) routes for the upstream resolver.
    pub routes: Vec<(String, String, String)>,
    pub alert_timeout: Duration,
}

impl HarnessOptions {
    pub fn new(judge_url: String) -> Self {
        Self {
            judge_url,
            signatures_yaml: DEFAULT_SIGNATURES,
            scan_mode: ScanMode::Both,
            disabled_signature_ids: Vec::new(),
            routes: Vec::new(),
            alert_timeout: Duration::from_millis(100),
        }
    }
}

pub fn build_harness(options: HarnessOptions) -> Harness {
    let mut signatures_file = tempfile::NamedTempFile::new().unwrap();
    signatures_file
        .write_all(options.signatures_yaml.as_bytes())
        .unwrap();
    let signatures = Arc::new(YamlSignatureStore::from_file(signatures_file.path()).unwrap());

    let settings = Arc::new(StaticSettingsProvider::new(SettingsSnapshot {
        scan_mode: options.scan_mode,
        disabled_signature_ids: options.disabled_signature_ids.into_iter().collect(),
        judge: JudgeCredentials {
            provider: "openai".to_string(),
            hosted_token: None,
            hosted_provider: None,
            api_key: Some("test-key".to_string()),
            model: "judge-small".to_string(),
        },
    }));

    let judge = Arc::new(
        HttpJudge::new("http://localhost:1".to_string(), options.judge_url.clone(), 5).unwrap(),
    );

    let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();
    let published_catalogs = Arc::new(Mutex::new(Vec::new()));

    let mut upstream_map = StaticUpstreamMap::empty();
    for (app, server, url) in options.routes {
        upstream_map.insert(&app, &server, &url);
    }

    let state = AppState {
        config: Arc::new(Config::test_config()),
        ledger: Arc::new(ScanLedger::new(Arc::new(TracingScanSink))),
        correlator: Arc::new(ToolCallCorrelator::default()),
        engine: Arc::new(VerificationEngine::new(signatures, settings, judge)),
        alerts: Arc::new(AlertCoordinator::with_timeout(
            Arc::new(ChannelSurface(alerts_tx)),
            options.alert_timeout,
        )),
        registry: Arc::new(ConnectionRegistry::new()),
        upstream: Arc::new(UpstreamClient::new(5).unwrap()),
        resolver: Arc::new(upstream_map),
        catalog: Arc::new(RecordingCatalogSink(published_catalogs.clone())),
        catalogs: Arc::new(Mutex::new(HashMap::new())),
    };

    Harness {
        state,
        alerts_rx,
        published_catalogs,
        _signatures_file: signatures_file,
    }
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
