// src/error.rs

//! Unified error handling for the connector.

use thiserror::Error;

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error (missing server URL blocks all network ops)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-2xx response from the analysis server
    #[error("HTTP error: {status} {status_text}")]
    Http { status: u16, status_text: String },

    /// Transport-level failure reaching the server or the library site
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Host page landmarks never appeared within the attempt budget
    #[error("Host page not ready after {attempts} attempts")]
    HostTimeout { attempts: u32 },

    /// A single DOM fragment failed to parse (non-fatal, item is dropped)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Coordinator channel closed or reply dropped
    #[error("Channel error: {0}")]
    Channel(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an HTTP status error.
    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        Self::Http {
            status,
            status_text: status_text.into(),
        }
    }

    /// Create an extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    /// Create a channel error.
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel(message.into())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// True when the error is the host-readiness timeout.
    pub fn is_host_timeout(&self) -> bool {
        matches!(self, Self::HostTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_formats_status() {
        let err = AppError::http(502, "Bad Gateway");
        assert_eq!(err.to_string(), "HTTP error: 502 Bad Gateway");
    }

    #[test]
    fn host_timeout_predicate() {
        assert!(AppError::HostTimeout { attempts: 30 }.is_host_timeout());
        assert!(!AppError::config("x").is_host_timeout());
    }
}
