// Calibration module - calibration records, run progress and state
//
// This module provides three pieces used by CalibrationManager:
// 1. CalibrationParameters / ParameterStore: persisted estimation results
// 2. CalibrationProgress: per-step progress of a full run
// 3. CalibrationState: active run and completed kinds

pub mod parameters;
pub mod progress;
pub mod state;

pub use parameters::{CalibrationExport, CalibrationParameters, ParameterStore, EXPORT_VERSION};
pub use progress::{CalibrationKind, CalibrationProgress, CalibrationStep};
pub use state::CalibrationState;
