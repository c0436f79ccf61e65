//! Cloud API clients for the poll and push channels

pub mod http_client;
#[cfg(feature = "websocket")]
pub mod push_client;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One state request addressed to a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// API method, e.g. `MotionSensor.getState`
    pub method: String,
    /// Target device identifier
    #[serde(rename = "targetDevice")]
    pub target_device: String,
    /// Device access token
    pub token: String,
    /// Correlation id echoed back by the API
    #[serde(rename = "msgid")]
    pub msg_id: String,
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, target_device: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target_device: target_device.into(),
            token: token.into(),
            msg_id: Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Response envelope returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorResponse {
    /// Result code, `"000000"` on success
    #[serde(deserialize_with = "deserialize_code")]
    pub code: String,
    /// Human readable description
    #[serde(default)]
    pub desc: Option<String>,
    /// Payload, present on success
    #[serde(default)]
    pub data: Value,
    /// Device the response refers to, when echoed
    #[serde(rename = "deviceId", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SensorResponse {
    pub fn new(code: impl Into<String>, desc: Option<String>, data: Value) -> Self {
        Self {
            code: code.into(),
            desc,
            data,
            device_id: None,
        }
    }
}

/// Some API gateways send the code as a bare number
fn deserialize_code<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => {
            let digits = n.to_string();
            Ok(format!("{digits:0>6}"))
        }
        other => Err(serde::de::Error::custom(format!(
            "unexpected response code {other}"
        ))),
    }
}

/// Request/response access to the sensor state
#[async_trait]
pub trait SensorClient: Send + Sync {
    /// Fetch the current device state
    async fn fetch(&self, request: &FetchRequest) -> Result<SensorResponse>;
}
