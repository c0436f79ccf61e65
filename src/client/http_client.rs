//! HTTP client for the sensor cloud API
//!
//! State requests are JSON `POST`s to a single endpoint, authenticated with
//! the device token as a bearer credential.

use crate::client::{FetchRequest, SensorClient, SensorResponse};
use crate::config::ApiConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use tracing::debug;
use url::Url;

/// HTTP implementation of [`SensorClient`]
pub struct SensorHttpClient {
    client: Client,
    endpoint: Url,
}

impl SensorHttpClient {
    /// Create a client from the API settings
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.url)
            .map_err(|e| BridgeError::config(format!("Invalid API URL {}: {e}", config.url)))?;

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(format!("motion-sensor-bridge/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SensorClient for SensorHttpClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<SensorResponse> {
        debug!(
            method = %request.method,
            msg_id = %request.msg_id,
            "POST {}",
            self.endpoint
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&request.token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BridgeError::timeout(format!("State request timed out: {e}"))
                } else {
                    BridgeError::connection(format!("State request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP error {status}: {body}");
            return Err(match status.as_u16() {
                401 | 403 => BridgeError::authentication(message),
                _ => BridgeError::connection(message),
            });
        }

        let text = response.text().await?;
        let parsed: SensorResponse = serde_json::from_str(&text)
            .map_err(|e| BridgeError::parsing_error(format!("Malformed response: {e}")))?;
        debug!(code = %parsed.code, "State response received");
        Ok(parsed)
    }
}
