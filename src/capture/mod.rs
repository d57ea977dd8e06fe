//! Dual-channel calibration capture.
//!
//! [`CaptureOrchestrator`] stamps each request with a synchronized
//! timestamp, runs the RGB and thermal captures concurrently, and records
//! the outcome as a [`CalibrationSession`]. Sessions are rediscovered from
//! file names alone by [`SessionStore`].

mod channel;
mod orchestrator;
mod session;

pub use channel::{CaptureChannel, ChannelFault, ChannelKind, ChannelStatus};
pub use orchestrator::CaptureOrchestrator;
pub use session::{CalibrationSession, CaptureCoverage, CaptureStatistics, SessionStore};
