use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Relaywatch application
#[derive(Error, Debug)]
pub enum RelayError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Whitelist load failed: {0}")]
    WhitelistLoad(String),

    // Source errors
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    // Descriptor parse errors
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid server address: {0}")]
    InvalidServerAddress(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    // Filter rejections
    #[error("Empty server address")]
    EmptyServerAddress,

    #[error("Address not in whitelist: {0}")]
    AddressNotWhitelisted(String),

    #[error("SNI not in whitelist: {0}")]
    SniNotWhitelisted(String),

    // Probe errors
    #[error("Failed to spawn proxy engine: {0}")]
    EngineSpawn(String),

    #[error("Engine inbound not ready on port {port}: {output}")]
    EngineNotReady { port: u16, output: String },

    #[error("TLS reachability check failed: {0}")]
    TlsProbe(String),

    #[error("Probe request failed: {0}")]
    ProbeRequest(String),

    #[error("Operation timed out")]
    Timeout,

    // Serving errors
    #[error("configs unavailable retry later")]
    ConfigsUnavailable,

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Relaywatch operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RelayError::UnsupportedScheme(_)
            | RelayError::InvalidServerAddress(_)
            | RelayError::MissingField(_)
            | RelayError::UrlParse(_)
            | RelayError::EmptyServerAddress
            | RelayError::AddressNotWhitelisted(_)
            | RelayError::SniNotWhitelisted(_) => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway
            RelayError::EngineSpawn(_)
            | RelayError::EngineNotReady { .. }
            | RelayError::TlsProbe(_)
            | RelayError::ProbeRequest(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            RelayError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            RelayError::ConfigsUnavailable
            | RelayError::InvalidConfig(_)
            | RelayError::WhitelistLoad(_)
            | RelayError::Io(_)
            | RelayError::Http(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from reqwest errors (source mirror fetch)
impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            RelayError::UnsupportedScheme("http".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::AddressNotWhitelisted("1.2.3.4".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::EngineNotReady {
                port: 2081,
                output: String::new()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(RelayError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            RelayError::ConfigsUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_configs_unavailable_message() {
        // The serving layer promises this exact body to consumers.
        assert_eq!(
            RelayError::ConfigsUnavailable.to_string(),
            "configs unavailable retry later"
        );
    }

    #[test]
    fn test_error_client_server_helpers() {
        assert!(RelayError::EmptyServerAddress.is_client_error());
        assert!(!RelayError::EmptyServerAddress.is_server_error());

        assert!(RelayError::ConfigsUnavailable.is_server_error());
        assert!(!RelayError::ConfigsUnavailable.is_client_error());
    }
}
