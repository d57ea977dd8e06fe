// Calibration workflow error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration workflow error code constants
///
/// Error code range: 4001-4006
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// A calibration run is already active
    pub const ALREADY_IN_PROGRESS: i32 = 4001;

    /// No calibration run is active
    pub const NOT_IN_PROGRESS: i32 = 4002;

    /// Capture step did not produce the required artifacts
    pub const CAPTURE_FAILED: i32 = 4003;

    /// Estimation step failed or was rejected
    pub const ESTIMATION_FAILED: i32 = 4004;

    /// Reading or writing calibration records failed
    pub const PERSISTENCE: i32 = 4005;

    /// Calibration state RwLock was poisoned
    pub const STATE_POISONED: i32 = 4006;
}

/// Emit one error line carrying the code, owning component and `context`
/// (usually the operation that failed).
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationManager, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration workflow errors
///
/// These errors cover the run lifecycle (start, stop, validation) and the
/// persistence of calibration records.
///
/// Error code ranges: 4001-4006
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// A calibration run is already active
    AlreadyInProgress,

    /// No calibration run is active
    NotInProgress,

    /// Capture step failed
    CaptureFailed { details: String },

    /// Estimation step failed
    EstimationFailed { details: String },

    /// Reading or writing calibration records failed
    Persistence { details: String },

    /// Calibration state RwLock was poisoned
    StatePoisoned,
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::AlreadyInProgress => CalibrationErrorCodes::ALREADY_IN_PROGRESS,
            CalibrationError::NotInProgress => CalibrationErrorCodes::NOT_IN_PROGRESS,
            CalibrationError::CaptureFailed { .. } => CalibrationErrorCodes::CAPTURE_FAILED,
            CalibrationError::EstimationFailed { .. } => CalibrationErrorCodes::ESTIMATION_FAILED,
            CalibrationError::Persistence { .. } => CalibrationErrorCodes::PERSISTENCE,
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::AlreadyInProgress => "Calibration already in progress".to_string(),
            CalibrationError::NotInProgress => "No calibration in progress".to_string(),
            CalibrationError::CaptureFailed { details } => {
                format!("Calibration capture failed: {}", details)
            }
            CalibrationError::EstimationFailed { details } => {
                format!("Calibration estimation failed: {}", details)
            }
            CalibrationError::Persistence { details } => {
                format!("Calibration persistence failed: {}", details)
            }
            CalibrationError::StatePoisoned => "Calibration state lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}
