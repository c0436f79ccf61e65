//! Mock implementations for testing
//!
//! A scripted [`SensorClient`] and a [`NotificationSink`] that records
//! everything it receives.

use crate::client::{FetchRequest, SensorClient, SensorResponse};
use crate::error::{BridgeError, Result};
use crate::services::{Attribute, AttributeEvent, NotificationSink};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Mock sensor client replaying scripted results in order
#[derive(Default)]
pub struct MockSensorClient {
    responses: Mutex<VecDeque<Result<SensorResponse>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockSensorClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response carrying `data`
    pub fn with_success(self, data: Value) -> Self {
        self.with_result(Ok(SensorResponse::new(
            crate::services::SUCCESS_CODE,
            Some("Success".to_string()),
            data,
        )))
    }

    /// Queue a response with a non-success code
    pub fn with_failure(self, code: &str, desc: &str) -> Self {
        self.with_result(Ok(SensorResponse::new(
            code,
            Some(desc.to_string()),
            Value::Null,
        )))
    }

    /// Queue an arbitrary result
    pub fn with_result(self, result: Result<SensorResponse>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(result);
        }
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SensorClient for MockSensorClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<SensorResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Err(BridgeError::device_unavailable("no scripted response")))
    }
}

/// Sink keeping every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AttributeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AttributeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Values emitted for one attribute, oldest first
    pub fn values_for(&self, attribute: Attribute) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.attribute == attribute)
            .map(|e| e.value)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: AttributeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
