//! adflow runtime
//!
//! Wires the decision engine together:
//! - Loads configuration and preferences
//! - Probes the analytics and generation services
//! - Builds the endpoint registry over the MQTT transport
//! - Runs the periodic feed sync (or a single sync when disabled)
//!
//! Usage:
//!   cargo run --release --bin adflow_runtime
//!
//! Environment variables: see `EngineConfig::from_env`. `RUST_LOG` controls
//! verbosity (default: info).

use adflow::broker::MqttConnector;
use adflow::directory::{FeedDirectory, HttpFeedDirectory};
use adflow::endpoint::{EndpointContext, EndpointRegistry};
use adflow::policy::{AdServices, DecisionPolicy, HttpAdServices};
use adflow::preferences::{Preferences, PreferencesHandle};
use adflow::queue::QueueRegistry;
use adflow::scheduler::sync_scheduler_task;
use adflow::EngineConfig;
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 adflow runtime v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::from_env()?;
    info!("✅ Configuration loaded");
    info!("   ├─ Broker: {}:{}", config.broker_host, config.broker_port);
    info!("   ├─ Analytics: {}", config.pca_base_url);
    info!(
        "   ├─ Generation: {} (timeout {}s)",
        config.aig_base_url, config.generation_timeout_secs
    );
    info!(
        "   └─ Feed sync: {} (every {}s)",
        if config.sync_enabled { "ENABLED" } else { "DISABLED" },
        config.sync_interval_secs
    );

    let preferences = match &config.preferences_path {
        Some(path) => match Preferences::load_from_file(path) {
            Ok(prefs) => {
                info!("✅ Preferences loaded from {}", path);
                prefs
            }
            Err(e) => {
                warn!("⚠️  {} ({}), using defaults", e, path);
                Preferences::default()
            }
        },
        None => {
            info!("ℹ️  No preferences file, using defaults");
            Preferences::default()
        }
    };

    let services = HttpAdServices::from_config(&config)?;
    services.probe_all().await;
    let services: Arc<dyn AdServices> = Arc::new(services);

    let context = EndpointContext {
        connector: Arc::new(MqttConnector::default()),
        queues: Arc::new(QueueRegistry::new()),
        policy: Arc::new(DecisionPolicy::new(services, config.busy_retry_delay())),
        preferences: PreferencesHandle::new(preferences),
        poll_interval: config.queue_poll_interval(),
    };
    let registry = Arc::new(EndpointRegistry::new(context));
    let directory: Arc<dyn FeedDirectory> = Arc::new(HttpFeedDirectory::new(
        &config.pca_base_url,
        &config.broker_host,
        config.broker_port,
        config.http_timeout(),
    )?);

    let cancel = CancellationToken::new();
    let scheduler = if config.sync_enabled {
        let task = tokio::spawn(sync_scheduler_task(
            registry.clone(),
            directory.clone(),
            config.sync_interval(),
            cancel.clone(),
        ));
        info!("   └─ ✅ Feed sync task spawned");
        Some(task)
    } else {
        if !registry.reconcile(directory.as_ref()).await {
            warn!("⚠️  Initial feed sync failed, no feeds served");
        }
        None
    };

    info!("🔄 Press CTRL+C to shutdown gracefully");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    cancel.cancel();
    if let Some(task) = scheduler {
        if let Err(e) = task.await {
            error!("❌ Feed sync task ended abnormally: {}", e);
        }
    }
    registry.shutdown_all().await;

    info!("✅ adflow runtime stopped");
    Ok(())
}
