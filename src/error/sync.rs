// Clock synchronization error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Clock synchronization error code constants
///
/// Error code range: 1001-1004
pub struct SyncErrorCodes {}

impl SyncErrorCodes {
    /// Round trip exceeded the acceptable ceiling
    pub const ROUND_TRIP_TOO_HIGH: i32 = 1001;

    /// No successful synchronization yet
    pub const NOT_SYNCHRONIZED: i32 = 1002;

    /// Last synchronization is older than the validity window
    pub const EXPIRED: i32 = 1003;

    /// Committed sync state lock was poisoned
    pub const STATE_POISONED: i32 = 1004;
}

/// Log a synchronization error with structured context
pub fn log_sync_error(err: &SyncError, context: &str) {
    error!(
        "Sync error in {}: code={}, component=ClockSynchronizer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Protocol-level failures of the clock synchronizer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Measured round trip exceeded the configured limit
    RoundTripTooHigh { round_trip_ms: i64, limit_ms: i64 },

    /// Synchronization has never succeeded (or was reset)
    NotSynchronized,

    /// Synchronization is older than the validity window
    Expired { age_ms: i64, validity_ms: i64 },

    /// Committed state lock was poisoned
    StatePoisoned,
}

impl ErrorCode for SyncError {
    fn code(&self) -> i32 {
        match self {
            SyncError::RoundTripTooHigh { .. } => SyncErrorCodes::ROUND_TRIP_TOO_HIGH,
            SyncError::NotSynchronized => SyncErrorCodes::NOT_SYNCHRONIZED,
            SyncError::Expired { .. } => SyncErrorCodes::EXPIRED,
            SyncError::StatePoisoned => SyncErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            SyncError::RoundTripTooHigh {
                round_trip_ms,
                limit_ms,
            } => format!(
                "Round trip {}ms exceeds limit of {}ms",
                round_trip_ms, limit_ms
            ),
            SyncError::NotSynchronized => "Clock is not synchronized".to_string(),
            SyncError::Expired {
                age_ms,
                validity_ms,
            } => format!(
                "Synchronization expired: age {}ms exceeds validity window {}ms",
                age_ms, validity_ms
            ),
            SyncError::StatePoisoned => "Sync state lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SyncError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_codes() {
        assert_eq!(
            SyncError::RoundTripTooHigh {
                round_trip_ms: 250,
                limit_ms: 200
            }
            .code(),
            SyncErrorCodes::ROUND_TRIP_TOO_HIGH
        );
        assert_eq!(
            SyncError::NotSynchronized.code(),
            SyncErrorCodes::NOT_SYNCHRONIZED
        );
        assert_eq!(
            SyncError::Expired {
                age_ms: 200_000,
                validity_ms: 180_000
            }
            .code(),
            SyncErrorCodes::EXPIRED
        );
        assert_eq!(SyncError::StatePoisoned.code(), SyncErrorCodes::STATE_POISONED);
    }

    #[test]
    fn test_sync_error_display_contains_code() {
        let err = SyncError::RoundTripTooHigh {
            round_trip_ms: 250,
            limit_ms: 200,
        };
        let display = format!("{}", err);
        assert!(display.contains("1001"));
        assert!(display.contains("250ms"));
    }
}
