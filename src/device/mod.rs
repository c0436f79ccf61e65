//! The motion sensor device
//!
//! [`MotionSensorDevice`] owns the state record, the poll scheduler and
//! the collaborators for one physical sensor. All entry points take
//! `&mut self`; hosts that receive polls and pushes concurrently drive it
//! through the [`actor`] instead.

pub mod actor;

use crate::client::{FetchRequest, SensorResponse};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::scheduler::{PollDecision, PollScheduler};
use crate::services::timestamp::format_timestamp;
use crate::services::{
    Attribute, BatteryMapper, DeviceState, DisplayFormat, FetchOutcome, NotificationSink,
    PayloadNormalizer, QuartileBatteryMapper, Reading, Rejection, ScaleConverter,
    StandardScaleConverter, StateBroker, Transport,
};
use crate::storage::StateStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Host-provided conversion and formatting services
#[derive(Clone)]
pub struct Collaborators {
    pub converter: Arc<dyn ScaleConverter>,
    pub battery: Arc<dyn BatteryMapper>,
    pub display: Arc<dyn DisplayFormat>,
}

impl Collaborators {
    /// Default converter and battery mapping with the configured display
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            converter: Arc::new(StandardScaleConverter),
            battery: Arc::new(QuartileBatteryMapper),
            display: Arc::new(config.display.clone()),
        }
    }
}

/// A fetch accepted by the scheduler, to be dispatched after `delay`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFetch {
    pub request: FetchRequest,
    pub delay: Duration,
}

/// Result of one ingestion attempt
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The payload was normalized and stored
    Applied(Reading),
    /// The payload was addressed elsewhere; nothing changed
    Rejected(Rejection),
    /// The API answered with a non-success code
    Failed { code: String, desc: String },
    /// No usable answer
    Exception(String),
}

impl IngestOutcome {
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            IngestOutcome::Applied(reading) => Some(reading),
            _ => None,
        }
    }
}

/// One LoRa motion sensor
pub struct MotionSensorDevice {
    device_id: String,
    token: String,
    method: String,
    debug: bool,
    collaborators: Collaborators,
    broker: StateBroker,
    scheduler: PollScheduler,
    store: Arc<dyn StateStore>,
}

impl MotionSensorDevice {
    pub fn new(
        config: &BridgeConfig,
        collaborators: Collaborators,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            device_id: config.device.device_id.clone(),
            token: config.device.token.clone(),
            method: config.api.method.clone(),
            debug: config.debug,
            collaborators,
            broker: StateBroker::new(DeviceState::default(), sink),
            scheduler: PollScheduler::new(
                config.polling.min_interval,
                config.polling.dispatch_delay,
            ),
            store,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> &DeviceState {
        self.broker.state()
    }

    /// Restore the persisted record and record identity and settings
    pub fn initialize(&mut self) -> Result<()> {
        match self.store.load(&self.device_id)? {
            Some(stored) => {
                debug!(device_id = %self.device_id, "Restored persisted state");
                self.broker.restore(stored);
            }
            None => debug!(device_id = %self.device_id, "No persisted state"),
        }
        self.scheduler.reset();

        let device_id = self.device_id.clone();
        let token = self.token.clone();
        self.broker.remember(Attribute::DeviceId, device_id, None, false);
        self.broker.remember(Attribute::Token, token, None, false);
        self.broker.remember(Attribute::Debug, self.debug, None, false);

        self.store.save(&self.device_id, self.broker.state())?;
        info!(device_id = %self.device_id, "Device initialized");
        Ok(())
    }

    /// Tear down the whole record
    pub fn uninstall(&mut self) -> Result<()> {
        self.broker.clear();
        let existed = self.store.remove(&self.device_id)?;
        info!(device_id = %self.device_id, existed, "Device state removed");
        Ok(())
    }

    /// Request a poll; returns the fetch to dispatch when accepted
    pub fn poll(&mut self, force: bool) -> Option<PendingFetch> {
        match self.scheduler.request(force) {
            PollDecision::Throttled { retry_after } => {
                debug!(?retry_after, "Ignoring poll request, too soon after the last one");
                None
            }
            PollDecision::Dispatch { delay } => {
                let now = format_timestamp(&Utc::now(), self.collaborators.display.as_ref());
                self.broker.remember(Attribute::LastPoll, now, None, false);
                self.persist();
                Some(PendingFetch {
                    request: FetchRequest::new(&self.method, &self.device_id, &self.token),
                    delay,
                })
            }
        }
    }

    /// Unconditional poll
    pub fn refresh(&mut self) -> Option<PendingFetch> {
        self.poll(true)
    }

    /// Record the result of a dispatched fetch
    pub fn handle_fetch_result(&mut self, result: Result<SensorResponse>) -> IngestOutcome {
        match result {
            Ok(response) => self.ingest_poll(response),
            Err(e) => {
                debug!(kind = e.kind(), retryable = e.is_retryable(), "Fetch returned an error");
                self.record_outcome(FetchOutcome::classify(Err(e)))
            }
        }
    }

    /// Ingest a poll response
    pub fn ingest_poll(&mut self, response: SensorResponse) -> IngestOutcome {
        self.record_outcome(FetchOutcome::classify(Ok(response)))
    }

    /// Ingest a push event
    pub fn ingest_push(&mut self, envelope: &Value) -> IngestOutcome {
        if self.debug {
            debug!(transport = %Transport::Push, payload = %envelope, "Raw payload");
        }
        let result = self.normalizer().normalize_push(envelope);
        self.apply(Transport::Push, result)
    }

    /// Record a push frame that could not be decoded
    pub fn ingest_push_error(&mut self, message: impl Into<String>) -> IngestOutcome {
        self.record_outcome(FetchOutcome::Exception(message.into()))
    }

    fn record_outcome(&mut self, outcome: FetchOutcome) -> IngestOutcome {
        let message = outcome.last_response();
        match outcome {
            FetchOutcome::Success { data, device_id } => {
                if self.debug {
                    debug!(transport = %Transport::Poll, payload = %data, "Raw payload");
                }
                let result = self.normalizer().normalize_poll(device_id.as_deref(), &data);
                self.apply(Transport::Poll, result)
            }
            FetchOutcome::Failure { code, desc } => {
                warn!(device_id = %self.device_id, "{message}");
                self.broker.remember(Attribute::Online, false, None, false);
                self.broker
                    .remember(Attribute::LastResponse, message, None, false);
                self.persist();
                IngestOutcome::Failed { code, desc }
            }
            FetchOutcome::Exception(_) => {
                error!(device_id = %self.device_id, "Ingestion failed: {message}");
                self.broker
                    .remember(Attribute::LastResponse, message.clone(), None, false);
                self.persist();
                IngestOutcome::Exception(message)
            }
        }
    }

    fn apply(
        &mut self,
        transport: Transport,
        result: std::result::Result<Reading, Rejection>,
    ) -> IngestOutcome {
        let reading = match result {
            Ok(reading) => reading,
            Err(rejection) => {
                debug!(%transport, device_id = %self.device_id, "Ignoring {rejection}");
                return IngestOutcome::Rejected(rejection);
            }
        };

        let unit = self.collaborators.display.temperature_scale().unit();
        let broker = &mut self.broker;
        broker.remember(Attribute::Online, true, None, false);
        if let Some(temperature) = reading.temperature_value {
            broker.remember(Attribute::Temperature, temperature, Some(unit), false);
        }
        if let Some(battery) = reading.battery_percent {
            broker.remember(Attribute::Battery, battery, Some("%"), false);
        }
        if let Some(firmware) = &reading.firmware_version {
            broker.remember(Attribute::Firmware, firmware.as_str(), None, false);
        }
        if let Some(state) = &reading.device_state {
            broker.remember(Attribute::DeviceState, state.as_str(), None, false);
        }
        broker.remember(Attribute::Motion, reading.motion_state.as_str(), None, false);
        if let Some(reported_at) = &reading.reported_at {
            broker.remember(Attribute::ReportedAt, reported_at.as_str(), None, false);
        }
        if let Some(changed_at) = &reading.changed_at {
            broker.remember(Attribute::ChangedAt, changed_at.as_str(), None, false);
        }
        if let Some(link) = &reading.radio_link {
            if let Some(network_type) = &link.network_type {
                broker.remember(Attribute::NetworkType, network_type.as_str(), None, false);
            }
            if let Some(signal) = link.signal_dbm {
                broker.remember(Attribute::Signal, signal, Some("dBm"), false);
            }
            if let Some(count) = link.gateway_count {
                broker.remember(Attribute::GatewayCount, count, None, false);
            }
            if let Some(gateway_id) = &link.gateway_id {
                broker.remember(Attribute::GatewayId, gateway_id.as_str(), None, false);
            }
        }
        broker.remember(Attribute::LastResponse, "Success", None, false);
        self.persist();

        info!(
            %transport,
            device_id = %self.device_id,
            motion = %reading.motion_state,
            temperature = ?reading.temperature_value,
            "Reading applied"
        );
        IngestOutcome::Applied(reading)
    }

    fn normalizer(&self) -> PayloadNormalizer<'_> {
        PayloadNormalizer::new(
            &self.device_id,
            self.collaborators.converter.as_ref(),
            self.collaborators.battery.as_ref(),
            self.collaborators.display.as_ref(),
        )
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.device_id, self.broker.state()) {
            warn!(device_id = %self.device_id, "Failed to persist device state: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::mock::RecordingSink;
    use crate::services::MotionState;
    use crate::storage::MemoryStateStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DEVICE: &str = "d88b4c010003a1b2";

    struct Fixture {
        device: MotionSensorDevice,
        sink: Arc<RecordingSink>,
        store: Arc<MemoryStateStore>,
    }

    fn fixture() -> Fixture {
        let config = BridgeConfig::for_device(DEVICE, "token-1");
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(MemoryStateStore::new());
        let mut device = MotionSensorDevice::new(
            &config,
            Collaborators::from_config(&config),
            sink.clone(),
            store.clone(),
        );
        device.initialize().unwrap();
        sink.clear();
        Fixture { device, sink, store }
    }

    fn success(data: Value) -> SensorResponse {
        SensorResponse::new("000000", Some("Success".into()), data)
    }

    fn poll_data() -> Value {
        json!({
            "online": true,
            "state": {
                "battery": 3,
                "version": "0405",
                "state": "normal",
                "devTemperature": -57,
                "loraInfo": {"signal": -71, "gateways": 1, "gatewayId": "gw1"}
            },
            "reportAt": "2023-11-14T22:13:20Z",
            "deviceId": DEVICE
        })
    }

    #[test]
    fn test_initialize_records_identity() {
        let f = fixture();
        let state = f.device.state();
        assert_eq!(state.device_id.as_deref(), Some(DEVICE));
        assert_eq!(state.token.as_deref(), Some("token-1"));
        assert_eq!(state.debug, Some(false));
        assert_eq!(f.store.load(DEVICE).unwrap().as_ref(), Some(state));
    }

    #[test]
    fn test_poll_success_applies_reading() {
        let mut f = fixture();
        let outcome = f.device.ingest_poll(success(poll_data()));
        let reading = outcome.reading().unwrap();
        assert_eq!(reading.temperature_value, Some(26.1));

        let state = f.device.state();
        assert_eq!(state.online, Some(true));
        assert_eq!(state.temperature, Some(26.1));
        assert_eq!(state.battery, Some(75));
        assert_eq!(state.firmware.as_deref(), Some("0405"));
        assert_eq!(state.device_state.as_deref(), Some("normal"));
        assert_eq!(state.motion.as_deref(), Some("inactive"));
        assert_eq!(state.signal, Some(-71));
        assert_eq!(state.gateway_count, Some(1));
        assert_eq!(state.gateway_id.as_deref(), Some("gw1"));
        assert_eq!(state.last_response.as_deref(), Some("Success"));
        assert_eq!(f.store.load(DEVICE).unwrap().as_ref(), Some(state));
        assert_eq!(f.sink.values_for(Attribute::Temperature), vec!["26.1"]);
    }

    #[test]
    fn test_redelivery_only_repeats_always_live() {
        let mut f = fixture();
        f.device.ingest_poll(success(poll_data()));
        f.sink.clear();
        f.device.ingest_poll(success(poll_data()));

        let mut repeated: Vec<_> = f.sink.events().into_iter().map(|e| e.attribute).collect();
        repeated.sort();
        assert_eq!(
            repeated,
            vec![
                Attribute::Temperature,
                Attribute::Battery,
                Attribute::Motion,
                Attribute::Signal,
                Attribute::LastResponse,
            ]
        );
    }

    #[test]
    fn test_failure_code_marks_offline() {
        let mut f = fixture();
        f.device.ingest_poll(success(poll_data()));
        let before = f.device.state().clone();

        let outcome = f.device.ingest_poll(SensorResponse::new(
            "000201",
            Some("Cannot connect to Device".into()),
            json!({"state": {"battery": 0}}),
        ));
        assert!(matches!(outcome, IngestOutcome::Failed { ref code, .. } if code == "000201"));

        let state = f.device.state();
        assert_eq!(state.online, Some(false));
        assert!(state.last_response.as_deref().unwrap().contains("000201"));
        assert_eq!(state.battery, before.battery);
        assert_eq!(state.temperature, before.temperature);
    }

    #[test]
    fn test_exception_keeps_liveness() {
        let mut f = fixture();
        f.device.ingest_poll(success(poll_data()));

        let outcome = f
            .device
            .handle_fetch_result(Err(BridgeError::connection("reset by peer")));
        assert!(matches!(outcome, IngestOutcome::Exception(_)));
        assert_eq!(f.device.state().online, Some(true));
        assert_eq!(
            f.device.state().last_response.as_deref(),
            Some("Exception: Connection error: reset by peer")
        );
    }

    #[test]
    fn test_undecodable_push_records_exception() {
        let mut f = fixture();
        f.device.ingest_poll(success(poll_data()));

        let outcome = f.device.ingest_push_error("EOF while parsing an object");
        assert!(matches!(outcome, IngestOutcome::Exception(_)));
        assert_eq!(f.device.state().online, Some(true));
        assert_eq!(
            f.device.state().last_response.as_deref(),
            Some("Exception: EOF while parsing an object")
        );
    }

    #[test]
    fn test_foreign_payload_is_noop() {
        let mut f = fixture();
        let before = f.device.state().clone();

        let outcome = f
            .device
            .ingest_push(&json!({"deviceId": "X", "data": {"state": "alert"}}));
        assert!(matches!(outcome, IngestOutcome::Rejected(_)));

        let mut data = poll_data();
        data["deviceId"] = json!("X");
        let outcome = f.device.ingest_poll(success(data));
        assert!(matches!(outcome, IngestOutcome::Rejected(_)));

        assert_eq!(f.device.state(), &before);
        assert!(f.sink.events().is_empty());
    }

    #[test]
    fn test_push_alert() {
        let mut f = fixture();
        let outcome = f
            .device
            .ingest_push(&json!({"deviceId": DEVICE, "data": {"state": "alert"}}));
        assert_eq!(outcome.reading().unwrap().motion_state, MotionState::Active);
        assert_eq!(f.device.state().motion.as_deref(), Some("active"));
        assert_eq!(f.device.state().device_state.as_deref(), Some("alert"));
        assert_eq!(f.device.state().online, Some(true));
    }

    #[test]
    fn test_poll_rate_limit() {
        let mut f = fixture();
        let pending = f.device.poll(false).unwrap();
        assert_eq!(pending.request.target_device, DEVICE);
        assert_eq!(pending.request.method, "MotionSensor.getState");
        assert_eq!(pending.delay, Duration::from_millis(500));
        assert!(f.device.state().last_poll.is_some());

        assert!(f.device.poll(false).is_none());
        assert!(f.device.refresh().is_some());
        assert_eq!(f.sink.values_for(Attribute::LastPoll).len(), 2);
    }

    #[test]
    fn test_uninstall_removes_record() {
        let mut f = fixture();
        f.device.ingest_poll(success(poll_data()));
        f.device.uninstall().unwrap();
        assert_eq!(f.device.state(), &DeviceState::default());
        assert!(f.store.load(DEVICE).unwrap().is_none());
    }

    #[test]
    fn test_initialize_restores_persisted_state() {
        let config = BridgeConfig::for_device(DEVICE, "token-2");
        let store = Arc::new(MemoryStateStore::new());
        store
            .save(
                DEVICE,
                &DeviceState {
                    firmware: Some("0400".into()),
                    token: Some("old".into()),
                    ..DeviceState::default()
                },
            )
            .unwrap();

        let mut device = MotionSensorDevice::new(
            &config,
            Collaborators::from_config(&config),
            Arc::new(RecordingSink::new()),
            store,
        );
        device.initialize().unwrap();
        assert_eq!(device.state().firmware.as_deref(), Some("0400"));
        assert_eq!(device.state().token.as_deref(), Some("token-2"));
    }
}
