//! Exit codes for the xp-core CLI.
//!
//! Stable per error category so scripts can branch without parsing output.

use xp_common::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    /// Bad arguments or input
    ValidationError = 10,

    /// Experiment or telemetry does not exist
    NotFound = 11,

    /// Comparison lacked data for one arm
    InsufficientData = 12,

    /// Lifecycle transition not allowed from the current status
    InvalidTransition = 13,

    /// Concurrent writer changed the experiment first
    ConditionFailed = 14,

    /// Backing store unreachable or corrupt
    StoreError = 15,

    /// Configuration error
    ConfigError = 16,

    /// I/O error
    IoError = 17,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Validation(_) => ExitCode::ValidationError,
            Error::ExperimentNotFound { .. } | Error::NoTelemetry { .. } => ExitCode::NotFound,
            Error::InsufficientData { .. } => ExitCode::InsufficientData,
            Error::InvalidTransition { .. } => ExitCode::InvalidTransition,
            Error::ConditionFailed { .. } => ExitCode::ConditionFailed,
            Error::StoreUnavailable(_) | Error::CorruptRecord(_) => ExitCode::StoreError,
            Error::Config(_) => ExitCode::ConfigError,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}
