//! Classification of fetch results
//!
//! Every fetch ends in exactly one of three outcomes. Only a success carries
//! data into the normalizers; the other two only touch liveness and the
//! human-readable last response.

use crate::client::SensorResponse;
use crate::error::BridgeError;
use serde_json::Value;
use std::fmt;

/// Response code the API uses for success
pub const SUCCESS_CODE: &str = "000000";

/// Outcome of a single fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Success code; carries the payload and the echoed device id
    Success {
        data: Value,
        device_id: Option<String>,
    },
    /// The API answered with a non-success code
    Failure { code: String, desc: String },
    /// Transport or parse error; no answer from the API
    Exception(String),
}

impl FetchOutcome {
    /// Classify the raw result of a fetch
    pub fn classify(result: Result<SensorResponse, BridgeError>) -> Self {
        match result {
            Ok(response) if response.code == SUCCESS_CODE => FetchOutcome::Success {
                data: response.data,
                device_id: response.device_id,
            },
            Ok(response) => FetchOutcome::Failure {
                code: response.code,
                desc: response.desc.unwrap_or_default(),
            },
            Err(e) => FetchOutcome::Exception(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    /// Liveness implied by the outcome; exceptions say nothing about the device
    pub fn online(&self) -> Option<bool> {
        match self {
            FetchOutcome::Success { .. } => Some(true),
            FetchOutcome::Failure { .. } => Some(false),
            FetchOutcome::Exception(_) => None,
        }
    }

    /// Value recorded as the last response
    pub fn last_response(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Success { .. } => f.write_str("Success"),
            FetchOutcome::Failure { code, desc } => write!(f, "Error {code}: {desc}"),
            FetchOutcome::Exception(message) => write!(f, "Exception: {message}"),
        }
    }
}
