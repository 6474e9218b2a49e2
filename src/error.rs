use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the gossamer membership layer
#[derive(Debug)]
pub enum GossamerError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Transport layer errors (bind, send, oversize datagrams)
    Transport(String),

    /// Membership protocol errors
    Membership(String),

    /// A lookup found nothing
    NotFound(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Serialization/deserialization errors
    Serialization(SerializationError),

    /// Internal channel or concurrency errors
    Concurrency(String),
}

/// Serialization related errors
#[derive(Debug)]
pub enum SerializationError {
    /// JSON serialization/deserialization errors
    Json(serde_json::Error),

    /// Binary wire encoding errors
    Encode(bincode::error::EncodeError),

    /// Binary wire decoding errors
    Decode(bincode::error::DecodeError),
}

impl fmt::Display for GossamerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GossamerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            GossamerError::Transport(msg) => write!(f, "Transport error: {}", msg),
            GossamerError::Membership(msg) => write!(f, "Membership error: {}", msg),
            GossamerError::NotFound(msg) => write!(f, "Not found: {}", msg),
            GossamerError::Io(err) => write!(f, "I/O error: {}", err),
            GossamerError::Serialization(err) => write!(f, "Serialization error: {}", err),
            GossamerError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::Json(err) => write!(f, "JSON: {}", err),
            SerializationError::Encode(err) => write!(f, "Binary encode: {}", err),
            SerializationError::Decode(err) => write!(f, "Binary decode: {}", err),
        }
    }
}

impl std::error::Error for GossamerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GossamerError::Io(err) => Some(err),
            GossamerError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializationError::Json(err) => Some(err),
            SerializationError::Encode(err) => Some(err),
            SerializationError::Decode(err) => Some(err),
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, GossamerError>;

impl GossamerError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GossamerError::Config(_) => StatusCode::BAD_REQUEST,
            GossamerError::NotFound(_) => StatusCode::NOT_FOUND,
            GossamerError::Membership(_) => StatusCode::SERVICE_UNAVAILABLE,
            GossamerError::Transport(_)
            | GossamerError::Io(_)
            | GossamerError::Serialization(_)
            | GossamerError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            GossamerError::Config(_) => "configuration_error",
            GossamerError::Transport(_) => "transport_error",
            GossamerError::Membership(_) => "membership_error",
            GossamerError::NotFound(_) => "not_found",
            GossamerError::Io(_) => "io_error",
            GossamerError::Serialization(_) => "serialization_error",
            GossamerError::Concurrency(_) => "concurrency_error",
        }
    }
}

// Axum IntoResponse implementation for HTTP error responses
impl IntoResponse for GossamerError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

// Conversions from common error types
impl From<std::io::Error> for GossamerError {
    fn from(err: std::io::Error) -> Self {
        GossamerError::Io(err)
    }
}

impl From<serde_json::Error> for GossamerError {
    fn from(err: serde_json::Error) -> Self {
        GossamerError::Serialization(SerializationError::Json(err))
    }
}

impl From<bincode::error::EncodeError> for GossamerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        GossamerError::Serialization(SerializationError::Encode(err))
    }
}

impl From<bincode::error::DecodeError> for GossamerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        GossamerError::Serialization(SerializationError::Decode(err))
    }
}

impl From<SerializationError> for GossamerError {
    fn from(err: SerializationError) -> Self {
        GossamerError::Serialization(err)
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::GossamerError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GossamerError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::GossamerError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GossamerError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! membership_error {
    ($msg:expr) => {
        $crate::error::GossamerError::Membership($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GossamerError::Membership(format!($fmt, $($arg)*))
    };
}
