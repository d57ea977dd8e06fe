//! Configuration management for calibration tuning
//!
//! This module provides runtime configuration loading from JSON files so
//! sync thresholds, capture timing, detector geometry, and estimator
//! sampling can be adjusted without recompilation. Every section falls back
//! to its defaults when omitted from the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub clock: ClockSyncConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
}

/// Clock synchronizer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSyncConfig {
    /// Samples whose round trip exceeds this are rejected (ms)
    pub max_round_trip_ms: i64,
    /// Sample window capacity, oldest evicted first
    pub window_capacity: usize,
    /// Below this many samples the newest offset is used unfiltered
    pub min_filter_samples: usize,
    /// Outlier cut-off in units of the robust spread
    pub outlier_sigma: f64,
    /// A sync older than this is no longer valid (ms)
    pub validity_window_ms: i64,
    /// Offset standard deviation regarded as on-target (ms)
    pub target_accuracy_ms: f64,
    /// Weight kept by the previous drift rate when blending in a new one
    pub drift_blend_old: f64,
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        Self {
            max_round_trip_ms: 200,
            window_capacity: 8,
            min_filter_samples: 3,
            outlier_sigma: 2.0,
            validity_window_ms: 180_000,
            target_accuracy_ms: 10.0,
            drift_blend_old: 0.7,
        }
    }
}

/// Capture orchestration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Flat directory holding `<id>_rgb.jpg` / `<id>_thermal.png` artifacts
    pub directory: PathBuf,
    /// Thermal channel start delay for sensor warm-up (ms)
    pub thermal_warmup_delay_ms: u64,
    /// Per-channel ceiling on a single capture call (ms)
    pub channel_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("calibration"),
            thermal_warmup_delay_ms: 20,
            channel_timeout_ms: 30_000,
        }
    }
}

/// Quality assessment parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Chessboard size in squares (rows x cols)
    pub chessboard_rows: usize,
    pub chessboard_cols: usize,
    /// Circle grid size in circles (rows x cols)
    pub circle_grid_rows: usize,
    pub circle_grid_cols: usize,
    /// Mean match error regarded as acceptable (px)
    pub max_alignment_error_px: f64,
    /// Features farther apart than this are never matched (px)
    pub max_match_distance_px: f64,
    /// Upper bound on sessions analysed concurrently
    pub max_parallel_assessments: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            chessboard_rows: 9,
            chessboard_cols: 6,
            circle_grid_rows: 4,
            circle_grid_cols: 11,
            max_alignment_error_px: 10.0,
            max_match_distance_px: 50.0,
            max_parallel_assessments: 4,
        }
    }
}

/// Parameter estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Physical square size of the printed pattern, in pixels at nominal distance
    pub pattern_square_size_px: f64,
    /// Sensor polling interval (ms)
    pub sensor_sample_interval_ms: u64,
    /// Total sensor polling duration (ms)
    pub sensor_sample_duration_ms: u64,
    /// Valid readings required before a live baseline is trusted
    pub min_sensor_samples: usize,
    /// Length of the simulated fallback series
    pub synthetic_sample_count: usize,
    /// Fixed seed for the simulated series; `None` seeds from entropy
    pub synthetic_seed: Option<u64>,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            pattern_square_size_px: 30.0,
            sensor_sample_interval_ms: 100,
            sensor_sample_duration_ms: 10_000,
            min_sensor_samples: 10,
            synthetic_sample_count: 100,
            synthetic_seed: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file is missing or
    /// its JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the bundled assets directory
    pub fn load() -> Self {
        Self::load_from_file("assets/calibration_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.clock.max_round_trip_ms, 200);
        assert_eq!(config.clock.window_capacity, 8);
        assert_eq!(config.clock.validity_window_ms, 180_000);
        assert_eq!(config.quality.chessboard_rows, 9);
        assert_eq!(config.quality.circle_grid_cols, 11);
        assert_eq!(config.estimation.min_sensor_samples, 10);
    }

    #[test]
    fn test_partial_json_uses_section_defaults() {
        let json = r#"{ "clock": { "max_round_trip_ms": 150 } }"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.clock.max_round_trip_ms, 150);
        assert_eq!(parsed.clock.window_capacity, 8);
        assert_eq!(parsed.capture.thermal_warmup_delay_ms, 20);
        assert_eq!(parsed.quality.max_parallel_assessments, 4);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/calibration_config.json");
        assert_eq!(config.clock.outlier_sigma, 2.0);
        assert_eq!(config.capture.directory, PathBuf::from("calibration"));
    }

    #[test]
    fn test_bundled_config_parses() {
        let contents = fs::read_to_string("assets/calibration_config.json").unwrap();
        let config: AppConfig = serde_json::from_str(&contents).unwrap();
        assert_eq!(config.capture.channel_timeout_ms, 30_000);
        assert_eq!(config.quality.max_match_distance_px, 50.0);
        assert!(config.estimation.synthetic_seed.is_none());
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from_file(&path);
        assert_eq!(config.estimation.synthetic_sample_count, 100);
    }
}
