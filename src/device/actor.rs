//! Single-writer task around [`MotionSensorDevice`]
//!
//! Polls, push events and fetch completions are queued on one channel and
//! applied in arrival order, so the two transports never interleave inside
//! an update cycle. Accepted polls spawn a task that waits for the
//! dispatch delay, fetches and queues the result back.

use crate::client::{SensorClient, SensorResponse};
use crate::device::{MotionSensorDevice, PendingFetch};
use crate::error::{BridgeError, Result};
use crate::services::DeviceState;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const COMMAND_QUEUE_SIZE: usize = 64;

/// Work item for the device task
#[derive(Debug)]
pub enum DeviceCommand {
    Poll { force: bool },
    Push(Value),
    PushFailed(String),
    FetchCompleted(Result<SensorResponse>),
    Snapshot(oneshot::Sender<DeviceState>),
    Uninstall(oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Cloneable handle to a running device task
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    tx: mpsc::Sender<DeviceCommand>,
}

impl DeviceHandle {
    pub async fn poll(&self, force: bool) -> Result<()> {
        self.send(DeviceCommand::Poll { force }).await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.poll(true).await
    }

    pub async fn push(&self, envelope: Value) -> Result<()> {
        self.send(DeviceCommand::Push(envelope)).await
    }

    /// Report a push frame that could not be decoded
    pub async fn push_failed(&self, message: impl Into<String>) -> Result<()> {
        self.send(DeviceCommand::PushFailed(message.into())).await
    }

    /// Copy of the current state record
    pub async fn snapshot(&self) -> Result<DeviceState> {
        let (reply, rx) = oneshot::channel();
        self.send(DeviceCommand::Snapshot(reply)).await?;
        rx.await
            .map_err(|_| BridgeError::device_unavailable("device task stopped"))
    }

    pub async fn uninstall(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(DeviceCommand::Uninstall(reply)).await?;
        rx.await
            .map_err(|_| BridgeError::device_unavailable("device task stopped"))?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(DeviceCommand::Shutdown).await
    }

    async fn send(&self, command: DeviceCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| BridgeError::device_unavailable("device task stopped"))
    }
}

/// Start the device task
///
/// The task ends on [`DeviceHandle::shutdown`] or once every handle is
/// dropped. In-flight fetches are not cancelled; their results are
/// discarded if the task is gone.
pub fn spawn_device(
    device: MotionSensorDevice,
    client: Arc<dyn SensorClient>,
) -> (DeviceHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
    let weak = tx.downgrade();
    let task = tokio::spawn(run(device, client, rx, weak));
    (DeviceHandle { tx }, task)
}

async fn run(
    mut device: MotionSensorDevice,
    client: Arc<dyn SensorClient>,
    mut rx: mpsc::Receiver<DeviceCommand>,
    requeue: mpsc::WeakSender<DeviceCommand>,
) {
    info!(device_id = %device.device_id(), "Device task started");

    while let Some(command) = rx.recv().await {
        match command {
            DeviceCommand::Poll { force } => {
                if let Some(pending) = device.poll(force) {
                    match requeue.upgrade() {
                        Some(tx) => dispatch_fetch(client.clone(), tx, pending),
                        None => debug!("All handles dropped, skipping fetch"),
                    }
                }
            }
            DeviceCommand::Push(envelope) => {
                device.ingest_push(&envelope);
            }
            DeviceCommand::PushFailed(message) => {
                device.ingest_push_error(message);
            }
            DeviceCommand::FetchCompleted(result) => {
                device.handle_fetch_result(result);
            }
            DeviceCommand::Snapshot(reply) => {
                let _ = reply.send(device.state().clone());
            }
            DeviceCommand::Uninstall(reply) => {
                let _ = reply.send(device.uninstall());
            }
            DeviceCommand::Shutdown => break,
        }
    }

    info!(device_id = %device.device_id(), "Device task stopped");
}

fn dispatch_fetch(
    client: Arc<dyn SensorClient>,
    tx: mpsc::Sender<DeviceCommand>,
    pending: PendingFetch,
) {
    tokio::spawn(async move {
        tokio::time::sleep(pending.delay).await;
        let result = client.fetch(&pending.request).await;
        if tx.send(DeviceCommand::FetchCompleted(result)).await.is_err() {
            debug!(msg_id = %pending.request.msg_id, "Device task gone, dropping fetch result");
        }
    });
}
