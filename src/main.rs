// Main entry point for the toolgate gateway

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use toolgate::alert::{AlertCoordinator, TracingDecisionSurface};
use toolgate::api::registry::ConnectionRegistry;
use toolgate::api::{create_router, AppState};
use toolgate::config::Config;
use toolgate::core::traits::{SignatureStore, TracingCatalogSink, UpstreamResolver};
use toolgate::correlator::ToolCallCorrelator;
use toolgate::engine::judge::HttpJudge;
use toolgate::engine::VerificationEngine;
use toolgate::ledger::{ScanLedger, TracingScanSink};
use toolgate::loader::settings::EnvSettingsProvider;
use toolgate::loader::signature_store::YamlSignatureStore;
use toolgate::loader::upstream_map::StaticUpstreamMap;
use toolgate::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load and validate configuration first (before any logging)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Initialize tracing subscriber with config values
    init_tracing(&config)?;

    info!("Starting toolgate gateway");
    info!(
        bind_address = %config.bind_address,
        port = config.port,
        "Configuration loaded"
    );

    // 3. Signature store (YAML file, or empty fail-closed set)
    let signatures: Arc<dyn SignatureStore> = match config.signatures_path {
        Some(ref path) => Arc::new(YamlSignatureStore::from_file(path).map_err(|e| {
            error!(error = %e, path = ?path, "Failed to load signatures");
            anyhow::anyhow!(e.to_string())
        })?),
        None => {
            info!("No signatures file configured; requests will fail closed");
            Arc::new(YamlSignatureStore::empty())
        }
    };

    // 4. Settings provider (env-backed)
    let settings = Arc::new(EnvSettingsProvider::new());

    // 5. Judge backend
    let judge = Arc::new(
        HttpJudge::new(
            config.hosted_judge_url.clone(),
            config.model_judge_url.clone(),
            config.judge_timeout_secs,
        )
        .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );

    // 6. Verification engine
    let engine = Arc::new(VerificationEngine::new(signatures, settings, judge));
    info!("Verification engine initialized");

    // 7. Scan ledger
    let ledger = Arc::new(ScanLedger::new(Arc::new(TracingScanSink)));

    // 8. Correlator
    let correlator = Arc::new(ToolCallCorrelator::default());

    // 9. Alert coordinator (no decision surface attached: timeout denies)
    let alerts = Arc::new(AlertCoordinator::with_timeout(
        Arc::new(TracingDecisionSurface),
        Duration::from_secs(config.alert_timeout_secs),
    ));

    // 10. Upstream resolver (YAML map, or empty)
    let resolver: Arc<dyn UpstreamResolver> = match config.upstream_map_path {
        Some(ref path) => Arc::new(StaticUpstreamMap::from_file(path).map_err(|e| {
            error!(error = %e, path = ?path, "Failed to load upstream map");
            anyhow::anyhow!(e.to_string())
        })?),
        None => {
            info!("No upstream map configured; duplex connections will be rejected");
            Arc::new(StaticUpstreamMap::empty())
        }
    };

    // 11. Upstream client
    let upstream = Arc::new(
        UpstreamClient::new(config.upstream_timeout_secs)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );
    info!("Upstream client initialized");

    // 12. Application state
    let app_state = AppState {
        config: Arc::new(config.clone()),
        ledger,
        correlator,
        engine,
        alerts,
        registry: Arc::new(ConnectionRegistry::new()),
        upstream,
        resolver,
        catalog: Arc::new(TracingCatalogSink),
        catalogs: Arc::new(Mutex::new(HashMap::new())),
    };

    // 13. Router and server
    let router = create_router(app_state);
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind to address");
        e
    })?;

    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            e
        })?;

    info!("Gateway shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber based on configuration
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
