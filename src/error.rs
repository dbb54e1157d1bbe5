//! Error types for the variation engine
//!
//! Almost every failure in this crate is recoverable by policy: bad seeds
//! clamp, a missing candidate falls back, an unreachable resolve endpoint
//! degrades to the local formula. The variants below exist so those
//! policy points can log *what* went wrong and so JS callers of the
//! fallible collaborator paths (dataset loading, storage) get a code.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasm_bindgen::JsValue;

pub type Result<T> = std::result::Result<T, VariationError>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigError = 100,
    InvalidCatalog = 102,

    // Network errors (2xx)
    NetworkError = 200,
    HttpStatus = 201,
    MalformedResponse = 202,
    Timeout = 203,

    // Storage errors (3xx)
    StorageError = 300,

    // DOM errors (4xx)
    DomUnavailable = 400,
    DomError = 401,

    // Internal errors (9xx)
    InternalError = 900,
}

/// Main error type for the variation engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariationError {
    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    // ===== Network Errors =====
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u32),

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    // ===== DOM Errors =====
    #[error("No DOM available: {0}")]
    DomUnavailable(String),

    #[error("DOM error: {0}")]
    Dom(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VariationError {
    /// Get the error code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            VariationError::Config(_) => ErrorCode::ConfigError,
            VariationError::InvalidCatalog(_) => ErrorCode::InvalidCatalog,

            VariationError::Network(_) => ErrorCode::NetworkError,
            VariationError::HttpStatus { .. } => ErrorCode::HttpStatus,
            VariationError::MalformedResponse(_) => ErrorCode::MalformedResponse,
            VariationError::Timeout(_) => ErrorCode::Timeout,

            VariationError::Storage(_) => ErrorCode::StorageError,

            VariationError::DomUnavailable(_) => ErrorCode::DomUnavailable,
            VariationError::Dom(_) => ErrorCode::DomError,

            VariationError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether retrying the same request later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            VariationError::Network(_) | VariationError::Timeout(_) => true,
            VariationError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the failure means "no browser here" rather than a real fault.
    ///
    /// Layers treat this as a no-op condition.
    pub fn is_headless(&self) -> bool {
        matches!(self, VariationError::DomUnavailable(_))
    }

    pub(crate) fn from_js(context: &str, value: &JsValue) -> Self {
        VariationError::Dom(format!("{}: {:?}", context, value))
    }
}

impl From<serde_json::Error> for VariationError {
    fn from(err: serde_json::Error) -> Self {
        VariationError::MalformedResponse(err.to_string())
    }
}

impl From<VariationError> for JsValue {
    fn from(err: VariationError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Error information for JavaScript consumption
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: u32,
    pub message: String,
    pub is_retryable: bool,
}

impl From<&VariationError> for ErrorInfo {
    fn from(err: &VariationError) -> Self {
        ErrorInfo {
            code: err.code() as u32,
            message: err.to_string(),
            is_retryable: err.is_retryable(),
        }
    }
}
