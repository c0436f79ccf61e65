//! Error types for the motion sensor bridge
//!
//! Ingestion entry points never surface these to their caller; they are
//! classified and recorded on the device instead. Everything else in the
//! crate (configuration, transports, storage) returns them through the
//! [`Result`] alias.

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error types for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Push channel errors
    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// State persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// A collaborator (scale conversion, battery mapping) rejected its input
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// The device actor is gone
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl BridgeError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a parsing error
    pub fn parsing_error<S: Into<String>>(msg: S) -> Self {
        Self::Parsing(msg.into())
    }

    /// Create a conversion error
    pub fn conversion<S: Into<String>>(msg: S) -> Self {
        Self::Conversion(msg.into())
    }

    /// Create a device unavailable error
    pub fn device_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    /// Create a websocket error
    #[cfg(feature = "websocket")]
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Self::WebSocket(msg.into())
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Connection(_) | BridgeError::Timeout(_) | BridgeError::Http(_)
        )
    }

    /// Check if error indicates authentication issue
    pub fn is_auth_error(&self) -> bool {
        matches!(self, BridgeError::Authentication(_))
    }

    /// Get a message that never echoes tokens or payload contents in release builds
    pub fn sanitized_message(&self) -> String {
        #[cfg(debug_assertions)]
        {
            self.to_string()
        }
        #[cfg(not(debug_assertions))]
        {
            match self {
                BridgeError::Connection(_) => "Network connection issue".to_string(),
                BridgeError::Authentication(_) => "Authentication failed".to_string(),
                BridgeError::Http(_) => "HTTP request failed".to_string(),
                BridgeError::Json(_) | BridgeError::Parsing(_) => {
                    "Data parsing error".to_string()
                }
                BridgeError::Config(_) => "Configuration error".to_string(),
                #[cfg(feature = "websocket")]
                BridgeError::WebSocket(_) => "WebSocket connection error".to_string(),
                BridgeError::Storage(_) => "State storage error".to_string(),
                BridgeError::Io(_) => "I/O operation failed".to_string(),
                BridgeError::Timeout(_) => "Operation timed out".to_string(),
                BridgeError::InvalidInput(_) => "Invalid input provided".to_string(),
                BridgeError::Conversion(_) => "Conversion failed".to_string(),
                BridgeError::DeviceUnavailable(_) => "Device unavailable".to_string(),
            }
        }
    }

    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Connection(_) => "connection",
            BridgeError::Authentication(_) => "authentication",
            BridgeError::Http(_) => "http",
            BridgeError::Json(_) => "json",
            BridgeError::Config(_) => "config",
            #[cfg(feature = "websocket")]
            BridgeError::WebSocket(_) => "websocket",
            BridgeError::Storage(_) => "storage",
            BridgeError::Io(_) => "io",
            BridgeError::Timeout(_) => "timeout",
            BridgeError::InvalidInput(_) => "invalid_input",
            BridgeError::Parsing(_) => "parsing",
            BridgeError::Conversion(_) => "conversion",
            BridgeError::DeviceUnavailable(_) => "device_unavailable",
        }
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::WebSocket(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BridgeError::connection("refused").is_retryable());
        assert!(BridgeError::timeout("5s").is_retryable());
        assert!(!BridgeError::config("missing device id").is_retryable());
        assert!(!BridgeError::parsing_error("bad json").is_retryable());
    }

    #[test]
    fn test_kind_and_auth() {
        let err = BridgeError::authentication("token expired");
        assert_eq!(err.kind(), "authentication");
        assert!(!err.is_retryable());
        assert!(err.is_auth_error());
        assert!(err.sanitized_message().contains("Authentication failed"));
    }
}
