// Capture error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Capture error code constants
///
/// Error code range: 2001-2006
pub struct CaptureErrorCodes {}

impl CaptureErrorCodes {
    /// External capture call raised a fault or reported failure
    pub const CHANNEL_FAULT: i32 = 2001;

    /// External capture call did not finish in time
    pub const CHANNEL_TIMEOUT: i32 = 2002;

    /// Capture reported success but no file exists at the target path
    pub const FILE_MISSING: i32 = 2003;

    /// Supplied session id already owns artifacts in the store
    pub const SESSION_ID_IN_USE: i32 = 2004;

    /// Neither channel was requested
    pub const NO_CHANNEL_REQUESTED: i32 = 2005;

    /// Filesystem error in the session store
    pub const STORE_IO: i32 = 2006;
}

/// Log a capture error with structured context
pub fn log_capture_error(err: &CaptureError, context: &str) {
    error!(
        "Capture error in {}: code={}, component=CaptureOrchestrator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Capture failures, always recovered into a failed `CalibrationSession`
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    ChannelFault { channel: String, reason: String },
    ChannelTimeout { channel: String, timeout_ms: u64 },
    FileMissing { path: String },
    SessionIdInUse { id: String },
    NoChannelRequested,
    StoreIo { details: String },
}

impl ErrorCode for CaptureError {
    fn code(&self) -> i32 {
        match self {
            CaptureError::ChannelFault { .. } => CaptureErrorCodes::CHANNEL_FAULT,
            CaptureError::ChannelTimeout { .. } => CaptureErrorCodes::CHANNEL_TIMEOUT,
            CaptureError::FileMissing { .. } => CaptureErrorCodes::FILE_MISSING,
            CaptureError::SessionIdInUse { .. } => CaptureErrorCodes::SESSION_ID_IN_USE,
            CaptureError::NoChannelRequested => CaptureErrorCodes::NO_CHANNEL_REQUESTED,
            CaptureError::StoreIo { .. } => CaptureErrorCodes::STORE_IO,
        }
    }

    fn message(&self) -> String {
        match self {
            CaptureError::ChannelFault { channel, reason } => {
                format!("{} capture failed: {}", channel, reason)
            }
            CaptureError::ChannelTimeout {
                channel,
                timeout_ms,
            } => format!("{} capture timed out after {}ms", channel, timeout_ms),
            CaptureError::FileMissing { path } => {
                format!("Capture reported success but {} does not exist", path)
            }
            CaptureError::SessionIdInUse { id } => {
                format!("Session id {} is already in use", id)
            }
            CaptureError::NoChannelRequested => "No capture channel requested".to_string(),
            CaptureError::StoreIo { details } => format!("Session store error: {}", details),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CaptureError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_codes() {
        assert_eq!(
            CaptureError::ChannelFault {
                channel: "RGB".to_string(),
                reason: "usb".to_string()
            }
            .code(),
            CaptureErrorCodes::CHANNEL_FAULT
        );
        assert_eq!(
            CaptureError::NoChannelRequested.code(),
            CaptureErrorCodes::NO_CHANNEL_REQUESTED
        );
        assert_eq!(
            CaptureError::SessionIdInUse {
                id: "calib_1".to_string()
            }
            .code(),
            CaptureErrorCodes::SESSION_ID_IN_USE
        );
    }

    #[test]
    fn test_channel_fault_message_keeps_reason() {
        let err = CaptureError::ChannelFault {
            channel: "Thermal".to_string(),
            reason: "sensor disconnected".to_string(),
        };
        assert_eq!(err.message(), "Thermal capture failed: sensor disconnected");
    }
}
