//! Error types for QueryGate operations

use thiserror::Error;

/// Configuration errors, raised when a store or job is constructed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Call-site argument errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Lifecycle errors of the background job handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("No Tokio runtime available to spawn the session reaper")]
    NoAsyncRuntime,

    #[error("Session reaper task failed to join: {reason}")]
    ReaperJoin { reason: String },

    #[error("Telemetry initialization failed: {reason}")]
    Telemetry { reason: String },
}

/// Master error type for all QueryGate errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryGateError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl QueryGateError {
    /// True for the InvalidArgument class: bad configuration or a bad
    /// identifier supplied at the call site.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Validation(_))
    }
}

/// Result type alias for QueryGate operations.
pub type QueryGateResult<T> = Result<T, QueryGateError>;
