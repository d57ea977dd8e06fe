//! Telemetry event types exposed to the CLI and progress subscribers.

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationKind;
use crate::quality::QualityRecommendation;

/// Diagnostic error categories surfaced via telemetry metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    SyncDegraded,
    CaptureFault,
    EstimationFailed,
    Persistence,
    Unknown,
}

/// Metric events covering clock sync, capture, quality and estimation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    SyncCompleted {
        offset_ms: i64,
        round_trip_ms: i64,
        quality: f64,
    },
    SyncRejected {
        round_trip_ms: i64,
    },
    /// Rolling round-trip statistics over accepted exchanges
    RoundTripStats {
        avg_ms: f64,
        max_ms: f64,
        sample_count: usize,
    },
    CaptureCompleted {
        session_id: String,
        success: bool,
        duration_ms: u64,
    },
    QualityAssessed {
        overall: f64,
        recommendation: QualityRecommendation,
    },
    CalibrationCompleted {
        kind: CalibrationKind,
        quality: f64,
        success: bool,
        timestamp_ms: u64,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
