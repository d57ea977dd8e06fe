// Multisensor Calibration Core
// Clock sync, dual-channel capture, quality gating and parameter estimation

// Module declarations
pub mod calibration;
pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod estimation;
pub mod imaging;
pub mod managers;
pub mod quality;
pub mod telemetry;

mod stats;

// Re-exports for convenience
pub use calibration::{CalibrationKind, CalibrationParameters, CalibrationProgress};
pub use capture::{CalibrationSession, CaptureChannel, CaptureOrchestrator};
pub use clock::{ClockSynchronizer, SyncState, TimeSource};
pub use config::AppConfig;
pub use estimation::{CalibrationOutcome, ParameterEstimator, SensorStream};
pub use managers::{CalibrationManager, CalibrationRequest};
pub use quality::{QualityAssessor, QualityRecommendation, QualityReport};

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install a `tracing` fmt subscriber for the whole process.
///
/// Output goes to stderr. Only the first call has an effect; installation
/// is skipped silently when the host already set a global subscriber.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let installed = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!("[Logging] tracing subscriber installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        assert!(LOGGING.is_completed());
    }
}
