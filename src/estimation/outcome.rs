use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, EstimationError};

/// Estimates that carry their own 0..1 quality score.
pub trait Scored {
    fn quality(&self) -> f64;
}

/// Result of one estimation run.
///
/// `LowQuality` still carries the estimate so callers can inspect or
/// persist it; only `Accepted` counts as a successful calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum CalibrationOutcome<T> {
    Accepted(T),
    LowQuality { estimate: T, reason: String },
    Failed { reason: String },
}

impl<T: Scored> CalibrationOutcome<T> {
    /// Accept `estimate` iff its quality is strictly above `threshold`.
    pub fn judge(estimate: T, threshold: f64) -> Self {
        let quality = estimate.quality();
        if quality > threshold {
            CalibrationOutcome::Accepted(estimate)
        } else {
            let reason = EstimationError::QualityTooLow { quality, threshold }.message();
            CalibrationOutcome::LowQuality { estimate, reason }
        }
    }

    pub fn failed(err: &EstimationError) -> Self {
        CalibrationOutcome::Failed {
            reason: err.message(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CalibrationOutcome::Accepted(_))
    }

    pub fn estimate(&self) -> Option<&T> {
        match self {
            CalibrationOutcome::Accepted(estimate)
            | CalibrationOutcome::LowQuality { estimate, .. } => Some(estimate),
            CalibrationOutcome::Failed { .. } => None,
        }
    }

    pub fn into_estimate(self) -> Option<T> {
        match self {
            CalibrationOutcome::Accepted(estimate)
            | CalibrationOutcome::LowQuality { estimate, .. } => Some(estimate),
            CalibrationOutcome::Failed { .. } => None,
        }
    }

    /// Zero for failures.
    pub fn quality(&self) -> f64 {
        self.estimate().map(Scored::quality).unwrap_or(0.0)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CalibrationOutcome::Accepted(_) => None,
            CalibrationOutcome::LowQuality { reason, .. } | CalibrationOutcome::Failed { reason } => {
                Some(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Fixed(f64);

    impl Scored for Fixed {
        fn quality(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn threshold_is_exclusive() {
        assert!(CalibrationOutcome::judge(Fixed(0.51), 0.5).is_success());

        let borderline = CalibrationOutcome::judge(Fixed(0.5), 0.5);
        assert!(!borderline.is_success());
        assert_eq!(borderline.estimate(), Some(&Fixed(0.5)));
        assert!(borderline
            .message()
            .unwrap()
            .starts_with("Calibration quality too low"));
    }

    #[test]
    fn failure_has_zero_quality_and_message() {
        let outcome: CalibrationOutcome<Fixed> = CalibrationOutcome::failed(&EstimationError::ImageMissing {
            modality: "RGB".to_string(),
        });
        assert_eq!(outcome.quality(), 0.0);
        assert!(outcome.estimate().is_none());
        assert_eq!(outcome.message(), Some("No RGB image provided for calibration"));
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(CalibrationOutcome::judge(Fixed(0.9), 0.5)).unwrap();
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["result"], 0.9);
    }
}
