//! Push event listener
//!
//! Keeps a websocket open to the event stream and forwards every JSON
//! event to the device task. Connections that drop are re-established
//! with exponential backoff.

use crate::device::actor::DeviceHandle;
use crate::error::{BridgeError, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

/// Reconnection behaviour
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt
    pub initial_delay: Duration,
    /// Upper bound for the delay
    pub max_delay: Duration,
    /// Factor applied after each failed attempt
    pub backoff_multiplier: f64,
    /// Give up after this many consecutive failures (None = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_multiplier).min(self.max_delay)
    }
}

/// Listener feeding push events into a device
pub struct PushListener {
    url: Url,
    policy: ReconnectPolicy,
}

/// How a session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The server closed the stream
    Closed,
    /// The device task is gone
    DeviceStopped,
}

impl PushListener {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Listen until the device task stops or reconnection gives up
    pub async fn run(self, handle: DeviceHandle) -> Result<()> {
        let mut delay = self.policy.initial_delay;
        let mut failures = 0u32;

        loop {
            match self.session(&handle).await {
                Ok(SessionEnd::DeviceStopped) => {
                    info!("Device stopped, closing push listener");
                    return Ok(());
                }
                Ok(SessionEnd::Closed) => {
                    warn!("Push stream closed by server");
                    failures = 0;
                    delay = self.policy.initial_delay;
                }
                Err(e) => {
                    failures += 1;
                    error!("Push stream failed ({failures}): {}", e.sanitized_message());
                    if self.policy.max_attempts.is_some_and(|max| failures > max) {
                        return Err(BridgeError::connection(format!(
                            "Giving up on push stream after {failures} failures"
                        )));
                    }
                }
            }

            info!("Reconnecting push stream in {delay:?}");
            tokio::time::sleep(delay).await;
            delay = self.policy.next_delay(delay);
        }
    }

    async fn session(&self, handle: &DeviceHandle) -> Result<SessionEnd> {
        debug!("Connecting push stream at {}", self.url);
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| BridgeError::websocket(format!("connection failed: {e}")))?;
        debug!("Push stream connected, response: {:?}", response.status());
        info!("Listening for push events");

        let (mut write, mut read) = stream.split();
        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => {
                    let delivered = match parse_event(&text) {
                        PushFrame::Event(event) => handle.push(event).await,
                        PushFrame::Malformed(reason) => {
                            warn!("Undecodable push event: {reason}");
                            handle.push_failed(reason).await
                        }
                        PushFrame::Ignored => {
                            debug!("Ignoring non-event message: {text}");
                            continue;
                        }
                    };
                    if delivered.is_err() {
                        return Ok(SessionEnd::DeviceStopped);
                    }
                }
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                }
                Message::Close(frame) => {
                    debug!("Close frame: {frame:?}");
                    return Ok(SessionEnd::Closed);
                }
                Message::Binary(data) => {
                    debug!("Ignoring binary message of {} bytes", data.len());
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(SessionEnd::Closed)
    }
}

/// Classification of a text frame
#[derive(Debug, PartialEq)]
pub enum PushFrame {
    /// A JSON object event envelope
    Event(Value),
    /// Looked like an event but did not decode
    Malformed(String),
    /// Keepalives and other non-event text
    Ignored,
}

/// Parse a text frame; only frames opening with `{` are treated as events
pub fn parse_event(text: &str) -> PushFrame {
    if !text.trim_start().starts_with('{') {
        return PushFrame::Ignored;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(event) => PushFrame::Event(event),
        Err(e) => PushFrame::Malformed(format!("invalid event JSON: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::device::{actor::spawn_device, Collaborators, MotionSensorDevice};
    use crate::mock::{MockSensorClient, RecordingSink};
    use crate::storage::MemoryStateStore;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_event() {
        assert!(matches!(
            parse_event(r#"{"deviceId":"a","data":{}}"#),
            PushFrame::Event(_)
        ));
        assert!(matches!(
            parse_event(r#"{"deviceId":"a","data":{"#),
            PushFrame::Malformed(_)
        ));
        assert_eq!(parse_event("[1,2]"), PushFrame::Ignored);
        assert_eq!(parse_event("ping"), PushFrame::Ignored);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            ..ReconnectPolicy::default()
        };
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..4 {
            delay = policy.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 5, 5]);
    }

    fn spawn_test_device() -> DeviceHandle {
        let config = BridgeConfig::for_device("dev-1", "tok");
        let mut device = MotionSensorDevice::new(
            &config,
            Collaborators::from_config(&config),
            Arc::new(RecordingSink::new()),
            Arc::new(MemoryStateStore::new()),
        );
        device.initialize().unwrap();
        spawn_device(device, Arc::new(MockSensorClient::new())).0
    }

    #[tokio::test]
    async fn test_session_records_undecodable_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::Text(
                r#"{"deviceId":"dev-1","data":{"state":"alert""#.into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        });

        let handle = spawn_test_device();
        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        let end = PushListener::new(url).session(&handle).await.unwrap();
        assert_eq!(end, SessionEnd::Closed);

        let state = handle.snapshot().await.unwrap();
        let last_response = state.last_response.unwrap();
        assert!(last_response.starts_with("Exception: invalid event JSON"), "{last_response}");
        assert_eq!(state.online, None);
        assert_eq!(state.motion, None);
    }

    #[tokio::test]
    async fn test_run_gives_up_after_max_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            max_attempts: Some(1),
            ..ReconnectPolicy::default()
        };
        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        let result = PushListener::new(url)
            .with_policy(policy)
            .run(spawn_test_device())
            .await;
        assert!(matches!(result, Err(BridgeError::Connection(_))));
    }

    #[tokio::test]
    async fn test_session_forwards_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            let event = json!({
                "event": "MotionSensor.Alert",
                "deviceId": "dev-1",
                "data": {"state": "alert", "battery": 4}
            });
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.send(Message::Text(event.to_string())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let handle = spawn_test_device();

        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        let end = PushListener::new(url).session(&handle).await.unwrap();
        assert_eq!(end, SessionEnd::Closed);

        let state = handle.snapshot().await.unwrap();
        assert_eq!(state.motion.as_deref(), Some("active"));
        assert_eq!(state.battery, Some(100));
    }
}
