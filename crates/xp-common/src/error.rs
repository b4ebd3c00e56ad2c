//! Error types for the prompt experiment engine.

use thiserror::Error;

/// Result type alias for experiment engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the experiment engine.
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (10-19)
    #[error("validation failed: {0}")]
    Validation(String),

    // Lookup errors (20-29)
    #[error("experiment not found: {experiment_id}")]
    ExperimentNotFound { experiment_id: String },

    #[error("no telemetry for prompt version {version} in the requested window")]
    NoTelemetry { version: String },

    #[error("insufficient data to compare {control} and {treatment}: {reason}")]
    InsufficientData {
        control: String,
        treatment: String,
        reason: String,
    },

    // Lifecycle errors (30-39)
    #[error("cannot {action} experiment {experiment_id} in status {from}")]
    InvalidTransition {
        experiment_id: String,
        action: &'static str,
        from: String,
    },

    #[error("condition failed on experiment {experiment_id}: expected status {expected}, found {actual}")]
    ConditionFailed {
        experiment_id: String,
        expected: String,
        actual: String,
    },

    // Store errors (40-49)
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("corrupt stored item: {0}")]
    CorruptRecord(String),

    // Configuration errors (50-59)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Validation(_) => 10,
            Error::ExperimentNotFound { .. } => 20,
            Error::NoTelemetry { .. } => 21,
            Error::InsufficientData { .. } => 22,
            Error::InvalidTransition { .. } => 30,
            Error::ConditionFailed { .. } => 31,
            Error::StoreUnavailable(_) => 40,
            Error::CorruptRecord(_) => 41,
            Error::Config(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    ///
    /// Validation failures require a different request; everything else can
    /// be retried after re-reading current state.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Validation(_) | Error::Config(_))
    }

    /// Whether this error means the referenced data does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ExperimentNotFound { .. } | Error::NoTelemetry { .. }
        )
    }
}
