// Progress tracking for calibration workflow
//
// A full calibration run walks four steps: capture, camera estimation,
// thermal estimation, finalise. Progress is broadcast once per step.

use serde::{Deserialize, Serialize};

/// What a calibration run or record covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationKind {
    Camera,
    Thermal,
    Sensor,
    /// Cross-check that every component is calibrated
    System,
}

impl CalibrationKind {
    pub const ALL: [CalibrationKind; 4] = [
        CalibrationKind::Camera,
        CalibrationKind::Thermal,
        CalibrationKind::Sensor,
        CalibrationKind::System,
    ];

    /// Get human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            CalibrationKind::Camera => "Camera",
            CalibrationKind::Thermal => "Thermal",
            CalibrationKind::Sensor => "Sensor",
            CalibrationKind::System => "System",
        }
    }
}

/// Step within a full calibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStep {
    Capture,
    CameraEstimation,
    ThermalEstimation,
    Finalise,
}

impl CalibrationStep {
    pub const TOTAL: u8 = 4;

    /// Get the next step in the run
    ///
    /// # Returns
    /// * `Some(CalibrationStep)` - Next step
    /// * `None` - Run complete
    pub fn next(&self) -> Option<CalibrationStep> {
        match self {
            CalibrationStep::Capture => Some(CalibrationStep::CameraEstimation),
            CalibrationStep::CameraEstimation => Some(CalibrationStep::ThermalEstimation),
            CalibrationStep::ThermalEstimation => Some(CalibrationStep::Finalise),
            CalibrationStep::Finalise => None,
        }
    }

    /// 1-based position within the run
    pub fn number(&self) -> u8 {
        match self {
            CalibrationStep::Capture => 1,
            CalibrationStep::CameraEstimation => 2,
            CalibrationStep::ThermalEstimation => 3,
            CalibrationStep::Finalise => 4,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CalibrationStep::Capture => "Capturing calibration images",
            CalibrationStep::CameraEstimation => "Estimating camera parameters",
            CalibrationStep::ThermalEstimation => "Estimating thermal parameters",
            CalibrationStep::Finalise => "Saving calibration",
        }
    }
}

/// Progress information for the current calibration step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    pub calibration_id: String,
    pub step: CalibrationStep,
    pub step_number: u8,
    pub total_steps: u8,
    pub message: String,
}

impl CalibrationProgress {
    pub fn new(calibration_id: impl Into<String>, step: CalibrationStep) -> Self {
        Self {
            calibration_id: calibration_id.into(),
            step,
            step_number: step.number(),
            total_steps: CalibrationStep::TOTAL,
            message: step.display_name().to_string(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.step_number >= self.total_steps
    }

    /// Get progress percentage (0-100)
    pub fn percentage(&self) -> u8 {
        if self.total_steps == 0 {
            return 0;
        }
        ((self.step_number as f32 / self.total_steps as f32) * 100.0) as u8
    }
}
