// Error types for the calibration engine
//
// Each component owns an error enum with a dedicated numeric code range so
// failures can be reported uniformly by the CLI and in logs.

mod calibration;
mod capture;
mod estimation;
mod sync;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use capture::{log_capture_error, CaptureError, CaptureErrorCodes};
pub use estimation::{log_estimation_error, EstimationError, EstimationErrorCodes};
pub use sync::{log_sync_error, SyncError, SyncErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// component boundaries.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
