//! VoltLink agent — edge runtime polling EV telemetry over a BLE OBD
//! adapter and fanning readings out to storage and MQTT.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use vl_agent::collector::Collector;
use vl_agent::config::AgentConfig;
use vl_agent::connection::ConnectionManager;
use vl_agent::executor::CommandExecutor;
use vl_agent::scheduler::AdaptiveScheduler;
use vl_agent::sinks::{DeviceStore, FileDeviceStore, MemoryDeviceStore, MemorySink, ReadingSink};
use vl_agent::status::StatusBroadcaster;
use vl_ble::BtleplugBackend;
use vl_ble::transport::BleBackend;
use vl_protocol::CommandCatalog;
use vl_publish::{MqttPublisher, NoopPublisher, Publisher};

/// Readings kept by the in-memory placeholder sink.
const MEMORY_SINK_CAPACITY: usize = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vl-agent starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/voltlink/agent.toml".to_string());
    let config = AgentConfig::from_file(&config_path)?;
    tracing::info!(device_id = %config.device_id, "config loaded");

    // ── Protocol catalog + executor ─────────────────────────────
    let catalog = Arc::new(CommandCatalog::standard());
    let executor = Arc::new(CommandExecutor::new());
    tracing::info!(command_count = catalog.len(), "command catalog initialized");

    // ── BLE backend ─────────────────────────────────────────────
    let backend: Arc<dyn BleBackend> = Arc::new(BtleplugBackend::new().await?);

    // ── Collaborators ───────────────────────────────────────────
    let device_store: Arc<dyn DeviceStore> = match &config.device_store_path {
        Some(path) => Arc::new(FileDeviceStore::new(path)),
        None => Arc::new(MemoryDeviceStore::new()),
    };
    let sink: Arc<dyn ReadingSink> = Arc::new(MemorySink::with_capacity(MEMORY_SINK_CAPACITY));

    let (publisher, mqtt_task): (Arc<dyn Publisher>, _) = match &config.mqtt {
        Some(mqtt_config) => {
            let (publisher, mut eventloop) = MqttPublisher::new(mqtt_config, &config.device_id);
            tracing::info!(broker = %mqtt_config.broker_host, "MQTT publishing enabled");
            let task = tokio::spawn(async move {
                loop {
                    if let Err(e) = eventloop.poll().await {
                        tracing::warn!(error = %e, "MQTT event loop error, retrying in 5s");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            });
            (Arc::new(publisher) as Arc<dyn Publisher>, Some(task))
        }
        None => {
            tracing::info!("MQTT publishing disabled");
            (Arc::new(NoopPublisher) as Arc<dyn Publisher>, None)
        }
    };

    // ── Wiring ──────────────────────────────────────────────────
    let events = StatusBroadcaster::new(64);
    let manager = Arc::new(ConnectionManager::new(
        backend,
        Arc::clone(&executor),
        Arc::clone(&catalog),
        device_store,
        events.clone(),
        config.ble.connection_config(),
    ));
    let collector = Arc::new(Collector::new(
        Arc::clone(&manager),
        executor,
        catalog,
        sink,
        publisher,
        events,
    ));
    let scheduler = Arc::new(AdaptiveScheduler::new(config.collection.scheduler_config()));

    tracing::info!("vl-agent ready");

    let collect = {
        let collector = Arc::clone(&collector);
        move |session_id| {
            let collector = Arc::clone(&collector);
            async move { collector.collect_once(session_id).await }
        }
    };

    tokio::select! {
        () = scheduler.run(collect) => {
            tracing::error!("collection loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            scheduler.stop();
        }
    }

    manager.disconnect().await;
    if let Some(task) = mqtt_task {
        task.abort();
    }
    tracing::info!("vl-agent stopped");
    Ok(())
}
