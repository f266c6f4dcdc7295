//! OCPP 1.6 WebSocket central system for EV charging stations.
//! Reads configuration from a TOML file (~/.config/fleetpoint-ocpp/config.toml).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use fleetpoint_ocpp::application::CommandBridge;
use fleetpoint_ocpp::config::{default_config_path, AppConfig};
use fleetpoint_ocpp::infrastructure::{
    listen_for_shutdown_signals, InMemoryGateway, OcppServer, PersistencePool, SharedGateway,
    ShutdownSignal,
};
use fleetpoint_ocpp::session::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("OCPP_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            init_logging(&cfg.logging.level);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            let cfg = AppConfig::default();
            init_logging(&cfg.logging.level);
            error!("Failed to load config: {}. Using defaults.", e);
            cfg
        }
    };

    info!("Starting FleetPoint OCPP central system...");

    // ── Prometheus metrics recorder ────────────────────────────
    if config.metrics.enabled {
        let addr: std::net::SocketAddr = config.metrics.listen.parse()?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("Prometheus metrics exposed on http://{}/metrics", addr);
    }

    // ── Persistence ────────────────────────────────────────────
    // The durable store is an external collaborator; until one is wired
    // in, the seeded in-memory gateway backs the core.
    let gateway: SharedGateway = Arc::new(InMemoryGateway::seeded());
    let writes = PersistencePool::new(gateway.clone(), config.persistence.workers);

    // ── Sessions & command bridge ──────────────────────────────
    let registry = ConnectionRegistry::shared();
    let bridge = CommandBridge::new(
        gateway.clone(),
        registry.clone(),
        Duration::from_millis(config.bridge.poll_interval_ms),
    );

    // ── Shutdown coordination ──────────────────────────────────
    let shutdown = ShutdownSignal::new();
    tokio::spawn(listen_for_shutdown_signals(shutdown.clone()));

    let bridge_shutdown = shutdown.clone();
    let bridge_task = tokio::spawn(async move { bridge.run(bridge_shutdown).await });

    // ── WebSocket server ───────────────────────────────────────
    let server = OcppServer::new(config.server.clone(), registry, gateway, writes)
        .with_shutdown(shutdown.clone());

    if let Err(e) = server.run().await {
        error!("WebSocket server error: {}", e);
        shutdown.trigger();
    }

    if let Err(e) = bridge_task.await {
        error!("Command bridge task panicked: {}", e);
    }

    info!("FleetPoint OCPP central system shutdown complete");
    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}
