// ParameterEstimator: Focused estimator for calibration parameters
//
// Wraps the camera, thermal and sensor-baseline heuristics behind one
// facade that decodes inputs, recovers every failure into a
// `CalibrationOutcome`, and applies the per-kind acceptance thresholds.

use std::path::Path;
use std::sync::Arc;

use super::camera::{
    camera_quality, estimate_distortion, estimate_intrinsics, image_statistics,
    reprojection_error, CameraEstimate, CameraIntrinsics,
};
use super::outcome::CalibrationOutcome;
use super::sensor::{
    collect_live, sampling_accuracy, simulated_baseline, summarize, SensorBaseline, SensorStream,
};
use super::thermal::{estimate_thermal, ThermalEstimate};
use crate::config::{EstimationConfig, QualityConfig};
use crate::error::{log_estimation_error, ErrorCode, EstimationError};
use crate::imaging::{to_gray, FsImageDecoder, ImageDecoder, RasterImage};
use crate::quality::{ChessboardDetector, CircleGridDetector, PatternDetector};

/// Camera estimates must score above this to be accepted
pub const CAMERA_QUALITY_THRESHOLD: f64 = 0.5;
pub const THERMAL_QUALITY_THRESHOLD: f64 = 0.6;
pub const SENSOR_QUALITY_THRESHOLD: f64 = 0.7;

pub struct ParameterEstimator {
    config: EstimationConfig,
    decoder: Arc<dyn ImageDecoder>,
    chessboard: ChessboardDetector,
    circle_grid: CircleGridDetector,
}

impl ParameterEstimator {
    /// Create an estimator using the pattern geometry from `quality`.
    pub fn new(config: EstimationConfig, quality: &QualityConfig) -> Self {
        Self {
            config,
            decoder: Arc::new(FsImageDecoder),
            chessboard: ChessboardDetector::new(quality.chessboard_rows, quality.chessboard_cols),
            circle_grid: CircleGridDetector::new(quality.circle_grid_rows, quality.circle_grid_cols),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    fn load(&self, path: Option<&Path>, modality: &str) -> Result<RasterImage, EstimationError> {
        let path = path.ok_or_else(|| EstimationError::ImageMissing {
            modality: modality.to_string(),
        })?;
        self.decoder
            .decode(path)
            .ok_or_else(|| EstimationError::ImageUnreadable {
                modality: modality.to_string(),
            })
    }

    /// Estimate camera intrinsics and distortion from a calibration capture.
    ///
    /// # Arguments
    /// * `rgb_path` - RGB calibration image (required)
    /// * `thermal_path` - Optional thermal image for thermal-camera intrinsics
    /// * `high_res` - Capture was taken in high-resolution mode
    ///
    /// # Returns
    /// `Failed` when the RGB image is absent or unreadable, otherwise the
    /// estimate judged against `CAMERA_QUALITY_THRESHOLD`.
    pub fn estimate_camera_parameters(
        &self,
        rgb_path: Option<&Path>,
        thermal_path: Option<&Path>,
        high_res: bool,
    ) -> CalibrationOutcome<CameraEstimate> {
        let rgb = match self.load(rgb_path, "RGB") {
            Ok(image) => image,
            Err(err) => {
                log_estimation_error(&err, "estimate_camera_parameters");
                return CalibrationOutcome::failed(&err);
            }
        };

        let thermal = match thermal_path {
            Some(_) => match self.load(thermal_path, "thermal") {
                Ok(image) => Some(image),
                Err(err) => {
                    tracing::warn!(
                        "[ParameterEstimator] Skipping thermal intrinsics: {}",
                        err.message()
                    );
                    None
                }
            },
            None => None,
        };

        self.estimate_camera_from_images(&rgb, thermal.as_ref(), high_res)
    }

    pub fn estimate_camera_from_images(
        &self,
        rgb: &RasterImage,
        thermal: Option<&RasterImage>,
        high_res: bool,
    ) -> CalibrationOutcome<CameraEstimate> {
        let gray = to_gray(rgb);
        if gray.width() == 0 || gray.height() == 0 {
            let err = EstimationError::ImageUnreadable {
                modality: "RGB".to_string(),
            };
            log_estimation_error(&err, "estimate_camera_from_images");
            return CalibrationOutcome::failed(&err);
        }

        let detection = self.chessboard.detect(&gray);
        let (intrinsics, pattern_detected) =
            estimate_intrinsics(&gray, &detection, self.config.pattern_square_size_px, high_res);
        let distortion = estimate_distortion(&gray);
        let image = image_statistics(&gray);
        let reprojection_error = reprojection_error(&intrinsics, &distortion);
        let quality = camera_quality(&image, reprojection_error);

        let estimate = CameraEstimate {
            intrinsics,
            distortion,
            thermal_intrinsics: thermal.and_then(|t| self.thermal_intrinsics(t, high_res)),
            reprojection_error,
            image,
            pattern_detected,
            quality,
        };

        tracing::info!(
            "[ParameterEstimator] Camera fx={:.1} fy={:.1} cx={:.1} cy={:.1} err={:.3} quality={:.3} pattern={}",
            estimate.intrinsics.fx,
            estimate.intrinsics.fy,
            estimate.intrinsics.cx,
            estimate.intrinsics.cy,
            estimate.reprojection_error,
            estimate.quality,
            estimate.pattern_detected
        );
        CalibrationOutcome::judge(estimate, CAMERA_QUALITY_THRESHOLD)
    }

    fn thermal_intrinsics(&self, thermal: &RasterImage, high_res: bool) -> Option<CameraIntrinsics> {
        let gray = to_gray(thermal);
        if gray.width() == 0 || gray.height() == 0 {
            return None;
        }
        let detection = self.circle_grid.detect(&gray);
        let (intrinsics, _) =
            estimate_intrinsics(&gray, &detection, self.config.pattern_square_size_px, high_res);
        Some(intrinsics)
    }

    /// Estimate thermal range, noise and uniformity from a thermal capture.
    pub fn estimate_thermal_parameters(
        &self,
        thermal_path: Option<&Path>,
    ) -> CalibrationOutcome<ThermalEstimate> {
        match self.load(thermal_path, "thermal") {
            Ok(image) => self.estimate_thermal_from_image(&image),
            Err(err) => {
                log_estimation_error(&err, "estimate_thermal_parameters");
                CalibrationOutcome::failed(&err)
            }
        }
    }

    pub fn estimate_thermal_from_image(
        &self,
        thermal: &RasterImage,
    ) -> CalibrationOutcome<ThermalEstimate> {
        let gray = to_gray(thermal);
        if gray.width() == 0 || gray.height() == 0 {
            let err = EstimationError::ImageUnreadable {
                modality: "thermal".to_string(),
            };
            log_estimation_error(&err, "estimate_thermal_from_image");
            return CalibrationOutcome::failed(&err);
        }

        let estimate = estimate_thermal(&gray);
        tracing::info!(
            "[ParameterEstimator] Thermal range=({:.1}, {:.1})C noise={:.4} uniformity={:.4} quality={:.3}",
            estimate.temperature_range.0,
            estimate.temperature_range.1,
            estimate.noise_level,
            estimate.uniformity_error,
            estimate.quality
        );
        CalibrationOutcome::judge(estimate, THERMAL_QUALITY_THRESHOLD)
    }

    /// Baseline statistics of the physiological channel.
    ///
    /// Polls `stream` when it is connected; falls back to a simulated series
    /// (flagged `simulated`) when it is absent, disconnected, or yields fewer
    /// than `min_sensor_samples` valid readings.
    pub async fn estimate_sensor_baseline(
        &self,
        stream: Option<&dyn SensorStream>,
    ) -> CalibrationOutcome<SensorBaseline> {
        let baseline = match stream {
            Some(stream) if stream.is_connected() => self.live_baseline(stream).await,
            _ => {
                tracing::warn!("[ParameterEstimator] No sensor connected, using simulated baseline");
                None
            }
        };

        let baseline = baseline.unwrap_or_else(|| simulated_baseline(&self.config));
        tracing::info!(
            "[ParameterEstimator] Sensor baseline={:.3} range=({:.3}, {:.3}) snr={:.1} quality={:.3} simulated={}",
            baseline.baseline,
            baseline.range.0,
            baseline.range.1,
            baseline.snr,
            baseline.quality,
            baseline.simulated
        );
        CalibrationOutcome::judge(baseline, SENSOR_QUALITY_THRESHOLD)
    }

    async fn live_baseline(&self, stream: &dyn SensorStream) -> Option<SensorBaseline> {
        let (values, timing_variance) = collect_live(stream, &self.config).await;
        if values.len() < self.config.min_sensor_samples.max(1) {
            let err = EstimationError::InsufficientSamples {
                required: self.config.min_sensor_samples,
                actual: values.len(),
            };
            tracing::warn!(
                "[ParameterEstimator] {}, falling back to simulated baseline",
                err.message()
            );
            return None;
        }

        let accuracy = sampling_accuracy(timing_variance, self.config.sensor_sample_interval_ms as f64);
        Some(summarize(&values, accuracy, false))
    }
}
