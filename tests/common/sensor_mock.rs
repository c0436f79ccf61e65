//! WireMock-based sensor cloud API mocking
//!
//! Simulates the state endpoint of the cloud API so the HTTP client and
//! the device can be exercised end to end.

use serde_json::{json, Value};
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const API_PATH: &str = "/open/yolink/v2/api";

/// Mock sensor cloud for testing
pub struct MockSensorCloud {
    pub server: MockServer,
}

impl MockSensorCloud {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn api_url(&self) -> String {
        format!("{}{}", self.server.uri(), API_PATH)
    }

    /// Answer state requests for `device_id` with a success envelope
    pub async fn mock_state(&self, device_id: &str, data: Value) {
        Mock::given(method("POST"))
            .and(path(API_PATH))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "method": "MotionSensor.getState",
                "targetDevice": device_id
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "000000",
                "time": 1_700_000_000_000_i64,
                "msgid": 1_700_000_000_000_i64,
                "method": "MotionSensor.getState",
                "desc": "Success",
                "data": data
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer every state request with an API error code
    pub async fn mock_api_error(&self, code: &str, desc: &str) {
        Mock::given(method("POST"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": code,
                "desc": desc
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer every request with an HTTP status
    pub async fn mock_http_status(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Typical state of a sensor with offset-Fahrenheit firmware
    pub fn sample_state(device_id: &str) -> Value {
        json!({
            "online": true,
            "deviceId": device_id,
            "reportAt": "2023-11-14T22:13:20.000Z",
            "state": {
                "battery": 4,
                "version": "04a1",
                "state": "normal",
                "devTemperature": -57,
                "stateChangedAt": 1_700_000_000_000_i64,
                "loraInfo": {
                    "netId": "010201",
                    "signal": -72,
                    "gatewayId": "d88b4c1603000001",
                    "gateways": 2
                }
            }
        })
    }
}
