//! Sensor bridge - main entry point
//!
//! `run` keeps the device alive: periodic polls, the push listener and a
//! log line per attribute notification. `poll` does one forced poll and
//! prints the resulting state record.

use anyhow::Context;
use clap::{Parser, Subcommand};
use motion_sensor_bridge::{
    logging::{init_logging, LogConfig},
    services::BroadcastSink,
    spawn_device,
    storage::{JsonFileStateStore, MemoryStateStore, StateStore},
    Attribute, AttributeEvent, BridgeConfig, Collaborators, DeviceHandle, IngestOutcome,
    MotionSensorDevice, SensorClient, SensorHttpClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Sensor bridge command line
#[derive(Parser, Debug)]
#[command(name = "sensor-bridge")]
#[command(about = "Bridge for a LoRa motion and temperature sensor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(long, global = true, env = "SENSOR_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging and raw payload logs
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge until interrupted
    Run,
    /// Poll once and print the device state as JSON
    Poll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(BridgeConfig::default_path);
    let mut config =
        BridgeConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    config.debug |= cli.debug;

    init_logging(LogConfig::from_env().with_debug(config.debug))?;
    info!(
        "Starting sensor bridge v{} for {}",
        env!("CARGO_PKG_VERSION"),
        config.device_label()
    );

    let store: Arc<dyn StateStore> = match &config.storage.state_file {
        Some(path) => Arc::new(JsonFileStateStore::new(path)),
        None => Arc::new(MemoryStateStore::new()),
    };
    let client = SensorHttpClient::new(&config.api)?;

    match cli.command {
        Command::Run => run(config, store, Arc::new(client)).await,
        Command::Poll => poll_once(config, store, client).await,
    }
}

async fn run(
    config: BridgeConfig,
    store: Arc<dyn StateStore>,
    client: Arc<SensorHttpClient>,
) -> anyhow::Result<()> {
    let sink = BroadcastSink::new();
    tokio::spawn(log_notifications(sink.subscribe()));

    let mut device = MotionSensorDevice::new(
        &config,
        Collaborators::from_config(&config),
        Arc::new(sink),
        store,
    );
    device.initialize()?;
    let (handle, task) = spawn_device(device, client);

    start_push_listener(&config, &handle);

    handle.refresh().await?;
    if let Some(interval) = config.polling.interval {
        tokio::spawn(periodic_poll(handle.clone(), interval));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for shutdown signal")?;
    info!("Shutting down");
    handle.shutdown().await?;
    task.await?;
    Ok(())
}

async fn poll_once(
    config: BridgeConfig,
    store: Arc<dyn StateStore>,
    client: SensorHttpClient,
) -> anyhow::Result<()> {
    let mut device = MotionSensorDevice::new(
        &config,
        Collaborators::from_config(&config),
        Arc::new(BroadcastSink::new()),
        store,
    );
    device.initialize()?;

    if let Some(pending) = device.refresh() {
        let result = client.fetch(&pending.request).await;
        match device.handle_fetch_result(result) {
            IngestOutcome::Applied(_) => {}
            IngestOutcome::Rejected(rejection) => warn!("Response ignored: {rejection}"),
            IngestOutcome::Failed { code, desc } => warn!("API error {code}: {desc}"),
            IngestOutcome::Exception(message) => warn!("{message}"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&device.state().redacted())?);
    Ok(())
}

#[cfg(feature = "websocket")]
fn start_push_listener(config: &BridgeConfig, handle: &DeviceHandle) {
    use motion_sensor_bridge::client::push_client::PushListener;

    match config.push.active_url() {
        Some(url) => {
            let listener = PushListener::new(url.clone());
            let handle = handle.clone();
            tokio::spawn(async move {
                if let Err(e) = listener.run(handle).await {
                    warn!("Push listener stopped: {e}");
                }
            });
        }
        None => info!("Push channel disabled"),
    }
}

#[cfg(not(feature = "websocket"))]
fn start_push_listener(_config: &BridgeConfig, _handle: &DeviceHandle) {
    info!("Built without websocket support, push channel disabled");
}

async fn periodic_poll(handle: DeviceHandle, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if handle.poll(false).await.is_err() {
            break;
        }
    }
}

async fn log_notifications(mut rx: broadcast::Receiver<AttributeEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let unit = event.unit.as_deref().unwrap_or("");
                if event.attribute == Attribute::Token {
                    continue;
                }
                info!(attribute = %event.attribute, "{}{unit}", event.value);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Notification log lagged, skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
