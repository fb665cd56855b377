//! Centralized error types for SkyCast.
//!
//! Every crate in the workspace reports failures through one of these enums.
//! `user_message()` gives a short, UI-appropriate string; the `Display`
//! output keeps the full context for logs.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a message suitable for display.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("City list error: {0}")]
    City(#[from] CityError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Api(e) => e.user_message().to_string(),
            AppError::Storage(e) => e.user_message().to_string(),
            // City errors are already phrased for the user
            AppError::City(e) => e.to_string(),
            AppError::Config(e) => e.user_message().to_string(),
            AppError::Io(_) => "A file operation failed. Please try again.".to_string(),
            AppError::Other(_) => "An unexpected error occurred. Please try again.".to_string(),
        }
    }

    /// True when the failure is a deliberate cancellation, which callers
    /// should never surface as an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Api(ApiError::Cancelled))
    }
}

/// Errors raised by the external API clients (weather and places).
///
/// `Clone` so a single coalesced result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Connection failed: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Parse(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Client misconfigured: {0}")]
    Config(String),
}

impl ApiError {
    /// Build an error from a non-success HTTP status and response body.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        ApiError::Parse(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// 4xx responses: the request itself is wrong, repeating it cannot help.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if (400..500).contains(status))
    }

    /// Transport failures, timeouts and 5xx responses may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Http { status, .. } => *status >= 500,
            ApiError::Parse(_) | ApiError::Cancelled | ApiError::Config(_) => false,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "Unable to connect. Check your internet connection.",
            ApiError::Timeout => "The request timed out. Please try again.",
            ApiError::Http { status: 401, .. } => "The API key is invalid. Check your settings.",
            ApiError::Http { status: 404, .. } => "Location not found. Check and try again.",
            ApiError::Http { status: 429, .. } => "Too many requests. Please wait a moment.",
            ApiError::Http { status, .. } if *status >= 500 => {
                "The weather service is experiencing issues. Please try again later."
            }
            ApiError::Http { .. } => "The request failed. Please try again.",
            ApiError::Parse(_) => "Received an unexpected response. Please try again.",
            ApiError::Cancelled => "Request cancelled.",
            ApiError::Config(_) => "The service is not configured. Check your settings.",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if let Some(status) = err.status() {
            ApiError::http(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Local persistence errors. These never reach the UI from the cache layer;
/// the cache logs and swallows them.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage quota exceeded ({needed} bytes needed, {limit} allowed)")]
    QuotaExceeded { needed: usize, limit: usize },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::Io(_) | StorageError::Unavailable(_) => {
                "Local storage is unavailable. Changes may not be saved."
            }
            StorageError::Serialization(_) => "Saved data could not be read.",
            StorageError::QuotaExceeded { .. } => "Local storage is full. Changes may not be saved.",
        }
    }
}

/// City list rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CityError {
    #[error("{name} is already in your city list")]
    Duplicate { name: String },

    #[error("Maximum reached: you can track at most {max} cities")]
    MaxReached { max: usize },

    #[error("City not found: {0}")]
    NotFound(String),

    #[error("Invalid position {index} for a list of {len} cities")]
    InvalidIndex { index: usize, len: usize },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_not_retryable() {
        let err = ApiError::http(404, "city not found");
        assert!(err.is_client_error());
        assert!(!err.is_retryable());

        let err = ApiError::http(429, "slow down");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_and_transport_errors_are_retryable() {
        assert!(ApiError::http(503, "unavailable").is_retryable());
        assert!(ApiError::Network("reset".into()).is_retryable());
        assert!(ApiError::Timeout.is_retryable());
    }

    #[test]
    fn test_retry_classification_ignores_message_text() {
        // A transient failure whose text happens to contain a "4"
        let err = ApiError::Network("connection reset after 4 bytes".into());
        assert!(err.is_retryable());
        let err = ApiError::http(500, "error 404 while proxying");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cancelled_is_neither_error_nor_retryable() {
        let err = ApiError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());
        assert!(AppError::from(err).is_cancelled());
    }

    #[test]
    fn test_duplicate_city_message() {
        let err = CityError::Duplicate {
            name: "Paris".into(),
        };
        assert!(err.to_string().contains("already in your city list"));
        assert!(AppError::from(err)
            .user_message()
            .contains("already in your city list"));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Api(ApiError::Timeout);
        assert_eq!(
            app_err.user_message(),
            "The request timed out. Please try again."
        );
    }
}
