//! Calibration parameter estimation.
//!
//! Heuristic camera intrinsics and distortion, thermal range and
//! uniformity, and physiological sensor baseline statistics. Every
//! estimator reports through [`CalibrationOutcome`].

mod camera;
mod estimator;
mod outcome;
mod sensor;
mod thermal;

pub use camera::{
    estimate_distortion, intrinsics_from_pattern, intrinsics_from_statistics, luminance_entropy,
    CameraEstimate, CameraIntrinsics, DistortionCoefficients, ImageStatistics,
};
pub use estimator::{
    ParameterEstimator, CAMERA_QUALITY_THRESHOLD, SENSOR_QUALITY_THRESHOLD,
    THERMAL_QUALITY_THRESHOLD,
};
pub use outcome::{CalibrationOutcome, Scored};
pub use sensor::{synthesize_series, SensorBaseline, SensorStream};
pub use thermal::{estimate_thermal, ThermalEstimate, IDENTITY_CORRECTION};
