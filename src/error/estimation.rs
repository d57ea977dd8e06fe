// Estimation error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Parameter estimation error code constants
///
/// Error code range: 3001-3005
pub struct EstimationErrorCodes {}

impl EstimationErrorCodes {
    /// Required image path was not supplied
    pub const IMAGE_MISSING: i32 = 3001;

    /// Image path could not be decoded
    pub const IMAGE_UNREADABLE: i32 = 3002;

    /// Too few samples for a statistical estimate
    pub const INSUFFICIENT_SAMPLES: i32 = 3003;

    /// Too few feature matches for registration
    pub const INSUFFICIENT_MATCHES: i32 = 3004;

    /// Estimate produced but quality below acceptance threshold
    pub const QUALITY_TOO_LOW: i32 = 3005;
}

/// Log an estimation error with structured context
pub fn log_estimation_error(err: &EstimationError, context: &str) {
    error!(
        "Estimation error in {}: code={}, component=ParameterEstimator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Decode and insufficient-data failures of quality and estimation paths
#[derive(Debug, Clone, PartialEq)]
pub enum EstimationError {
    ImageMissing { modality: String },
    ImageUnreadable { modality: String },
    InsufficientSamples { required: usize, actual: usize },
    InsufficientMatches { required: usize, actual: usize },
    QualityTooLow { quality: f64, threshold: f64 },
}

impl ErrorCode for EstimationError {
    fn code(&self) -> i32 {
        match self {
            EstimationError::ImageMissing { .. } => EstimationErrorCodes::IMAGE_MISSING,
            EstimationError::ImageUnreadable { .. } => EstimationErrorCodes::IMAGE_UNREADABLE,
            EstimationError::InsufficientSamples { .. } => {
                EstimationErrorCodes::INSUFFICIENT_SAMPLES
            }
            EstimationError::InsufficientMatches { .. } => {
                EstimationErrorCodes::INSUFFICIENT_MATCHES
            }
            EstimationError::QualityTooLow { .. } => EstimationErrorCodes::QUALITY_TOO_LOW,
        }
    }

    fn message(&self) -> String {
        match self {
            EstimationError::ImageMissing { modality } => {
                format!("No {} image provided for calibration", modality)
            }
            EstimationError::ImageUnreadable { modality } => {
                format!("Failed to load {} calibration image", modality)
            }
            EstimationError::InsufficientSamples { required, actual } => {
                format!("Insufficient samples: need {}, got {}", required, actual)
            }
            EstimationError::InsufficientMatches { required, actual } => {
                format!(
                    "Insufficient feature matches: need {}, got {}",
                    required, actual
                )
            }
            EstimationError::QualityTooLow { quality, threshold } => format!(
                "Calibration quality too low: {:.3} (threshold {:.2})",
                quality, threshold
            ),
        }
    }
}

impl fmt::Display for EstimationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EstimationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EstimationError {}
