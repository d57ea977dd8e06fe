// QualityAssessor: scores an RGB/thermal capture pair
//
// Pure with respect to its inputs. Batch assessment fans sessions out onto
// the blocking pool with a bounded number in flight.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::alignment::{measure_alignment, AlignmentMetrics};
use super::contrast::{measure_contrast, ContrastMetrics};
use super::pattern::{
    ChessboardDetector, CircleGridDetector, PatternDetector, PatternResult, PatternType,
};
use super::sharpness::{measure_sharpness, SharpnessMetrics};
use crate::capture::CalibrationSession;
use crate::config::QualityConfig;
use crate::error::{ErrorCode, EstimationError};
use crate::imaging::{to_gray, FsImageDecoder, ImageDecoder, RasterImage};
use crate::stats::clamp_unit;
use crate::telemetry;

const MIN_PATTERN_SCORE: f64 = 0.6;
const MIN_SHARPNESS_SCORE: f64 = 0.3;
const MIN_CONTRAST_SCORE: f64 = 0.4;
const MIN_ALIGNMENT_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityRecommendation {
    Excellent,
    Good,
    Acceptable,
    RetakeRecommended,
    RetakeRequired,
}

impl QualityRecommendation {
    /// True for the buckets that allow the capture to be used as-is.
    pub fn is_acceptable(&self) -> bool {
        matches!(
            self,
            QualityRecommendation::Excellent
                | QualityRecommendation::Good
                | QualityRecommendation::Acceptable
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            QualityRecommendation::Excellent => "Excellent",
            QualityRecommendation::Good => "Good",
            QualityRecommendation::Acceptable => "Acceptable",
            QualityRecommendation::RetakeRecommended => "Retake recommended",
            QualityRecommendation::RetakeRequired => "Retake required",
        }
    }
}

/// Per-concern scores, each in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub pattern: f64,
    pub sharpness: f64,
    pub contrast: f64,
    pub alignment: f64,
}

impl ComponentScores {
    pub fn overall(&self) -> f64 {
        clamp_unit(
            0.4 * self.pattern + 0.25 * self.sharpness + 0.2 * self.contrast + 0.15 * self.alignment,
        )
    }

    /// Gates are checked top-down, first match wins.
    pub fn recommend(&self) -> QualityRecommendation {
        if self.pattern < MIN_PATTERN_SCORE {
            return QualityRecommendation::RetakeRequired;
        }
        if self.sharpness < MIN_SHARPNESS_SCORE || self.contrast < MIN_CONTRAST_SCORE {
            return QualityRecommendation::RetakeRecommended;
        }
        if self.alignment < MIN_ALIGNMENT_SCORE {
            return QualityRecommendation::RetakeRecommended;
        }

        match self.overall() {
            s if s >= 0.9 => QualityRecommendation::Excellent,
            s if s >= 0.75 => QualityRecommendation::Good,
            s if s >= 0.6 => QualityRecommendation::Acceptable,
            s if s >= 0.4 => QualityRecommendation::RetakeRecommended,
            _ => QualityRecommendation::RetakeRequired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub rgb_pattern: PatternResult,
    pub thermal_pattern: PatternResult,
    pub rgb_sharpness: SharpnessMetrics,
    pub thermal_sharpness: SharpnessMetrics,
    pub rgb_contrast: ContrastMetrics,
    pub thermal_contrast: ContrastMetrics,
    pub alignment: AlignmentMetrics,
    pub scores: ComponentScores,
    pub overall_score: f64,
    pub recommendation: QualityRecommendation,
    /// Human-readable multi-line summary
    pub details: String,
}

impl QualityReport {
    /// Zero-score report carrying `reason`, always RetakeRequired.
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            rgb_pattern: PatternResult::not_found(PatternType::Unknown, 0),
            thermal_pattern: PatternResult::not_found(PatternType::Unknown, 0),
            rgb_sharpness: SharpnessMetrics::default(),
            thermal_sharpness: SharpnessMetrics::default(),
            rgb_contrast: ContrastMetrics::default(),
            thermal_contrast: ContrastMetrics::default(),
            alignment: AlignmentMetrics::default(),
            scores: ComponentScores::default(),
            overall_score: 0.0,
            recommendation: QualityRecommendation::RetakeRequired,
            details: format!("Quality assessment failed: {}", reason),
        }
    }
}

/// Quality verdict for one stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionQuality {
    pub session_id: String,
    pub report: QualityReport,
}

pub struct QualityAssessor {
    config: QualityConfig,
    rgb_detector: Box<dyn PatternDetector>,
    thermal_detector: Box<dyn PatternDetector>,
    decoder: Arc<dyn ImageDecoder>,
}

impl QualityAssessor {
    /// Chessboard on RGB, circle grid on thermal, filesystem decoding.
    pub fn new(config: QualityConfig) -> Self {
        let rgb_detector = ChessboardDetector::new(config.chessboard_rows, config.chessboard_cols);
        let thermal_detector =
            CircleGridDetector::new(config.circle_grid_rows, config.circle_grid_cols);
        Self {
            config,
            rgb_detector: Box::new(rgb_detector),
            thermal_detector: Box::new(thermal_detector),
            decoder: Arc::new(FsImageDecoder),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_detectors(
        mut self,
        rgb_detector: Box<dyn PatternDetector>,
        thermal_detector: Box<dyn PatternDetector>,
    ) -> Self {
        self.rgb_detector = rgb_detector;
        self.thermal_detector = thermal_detector;
        self
    }

    pub fn assess(&self, rgb: &RasterImage, thermal: &RasterImage) -> QualityReport {
        if rgb.width() == 0 || rgb.height() == 0 || thermal.width() == 0 || thermal.height() == 0
        {
            return self.finish(QualityReport::failed("empty image"));
        }

        let rgb_gray = to_gray(rgb);
        let thermal_gray = to_gray(thermal);

        let rgb_pattern = self.rgb_detector.detect(&rgb_gray);
        let thermal_pattern = self.thermal_detector.detect(&thermal_gray);
        let rgb_sharpness = measure_sharpness(&rgb_gray);
        let thermal_sharpness = measure_sharpness(&thermal_gray);
        let rgb_contrast = measure_contrast(&rgb_gray);
        let thermal_contrast = measure_contrast(&thermal_gray);
        let alignment = measure_alignment(
            &rgb_gray,
            &thermal_gray,
            self.config.max_match_distance_px,
            self.config.max_alignment_error_px,
        );

        let scores = ComponentScores {
            pattern: clamp_unit((rgb_pattern.pattern_score + thermal_pattern.pattern_score) / 2.0),
            sharpness: clamp_unit((rgb_sharpness.score + thermal_sharpness.score) / 2.0),
            contrast: clamp_unit((rgb_contrast.score + thermal_contrast.score) / 2.0),
            alignment: clamp_unit(alignment.score),
        };
        let overall_score = scores.overall();
        let recommendation = scores.recommend();

        let mut report = QualityReport {
            rgb_pattern,
            thermal_pattern,
            rgb_sharpness,
            thermal_sharpness,
            rgb_contrast,
            thermal_contrast,
            alignment,
            scores,
            overall_score,
            recommendation,
            details: String::new(),
        };
        report.details = summarize(&report);
        self.finish(report)
    }

    /// Decode both files and assess them.
    ///
    /// An undecodable file yields a RetakeRequired report naming the modality.
    pub fn assess_files(&self, rgb_path: &Path, thermal_path: &Path) -> QualityReport {
        let Some(rgb) = self.decoder.decode(rgb_path) else {
            let err = EstimationError::ImageUnreadable {
                modality: "RGB".to_string(),
            };
            return self.finish(QualityReport::failed(err.message()));
        };
        let Some(thermal) = self.decoder.decode(thermal_path) else {
            let err = EstimationError::ImageUnreadable {
                modality: "thermal".to_string(),
            };
            return self.finish(QualityReport::failed(err.message()));
        };
        self.assess(&rgb, &thermal)
    }

    /// Assess one stored session on the blocking pool.
    pub async fn assess_session(self: &Arc<Self>, session: &CalibrationSession) -> QualityReport {
        let (Some(rgb_path), Some(thermal_path)) =
            (session.rgb_file.clone(), session.thermal_file.clone())
        else {
            let modality = if session.rgb_file.is_none() {
                "RGB"
            } else {
                "thermal"
            };
            let err = EstimationError::ImageMissing {
                modality: modality.to_string(),
            };
            return self.finish(QualityReport::failed(err.message()));
        };

        let assessor = Arc::clone(self);
        match tokio::task::spawn_blocking(move || assessor.assess_files(&rgb_path, &thermal_path))
            .await
        {
            Ok(report) => report,
            Err(err) => self.finish(QualityReport::failed(format!(
                "assessment task for {} aborted: {}",
                session.id, err
            ))),
        }
    }

    /// Assess many sessions with at most `max_parallel_assessments` in flight.
    ///
    /// Results keep the input order.
    pub async fn assess_sessions(
        self: &Arc<Self>,
        sessions: &[CalibrationSession],
    ) -> Vec<SessionQuality> {
        let limit = self.config.max_parallel_assessments.max(1);
        stream::iter(sessions.iter().cloned())
            .map(|session| {
                let assessor = Arc::clone(self);
                async move {
                    let report = assessor.assess_session(&session).await;
                    SessionQuality {
                        session_id: session.id,
                        report,
                    }
                }
            })
            .buffered(limit)
            .collect()
            .await
    }

    fn finish(&self, report: QualityReport) -> QualityReport {
        tracing::info!(
            "[QualityAssessor] overall={:.3} recommendation={:?}",
            report.overall_score,
            report.recommendation
        );
        telemetry::hub().record_quality(report.overall_score, report.recommendation);
        report
    }
}

fn summarize(report: &QualityReport) -> String {
    let alignment_error = if report.alignment.match_count == 0 {
        "n/a".to_string()
    } else {
        format!("{:.1}px", report.alignment.mean_error_px)
    };

    format!(
        "Quality Assessment\n\
         Overall: {:.2} ({})\n\
         Pattern: {:.2} (RGB {:?} {}/{}, thermal {:?} {}/{})\n\
         Sharpness: {:.2} (RGB {:.2}, thermal {:.2})\n\
         Contrast: {:.2} (RGB {:.2}, thermal {:.2})\n\
         Alignment: {:.2} ({} matches, mean error {})",
        report.overall_score,
        report.recommendation.display_name(),
        report.scores.pattern,
        report.rgb_pattern.pattern_type,
        report.rgb_pattern.feature_count,
        report.rgb_pattern.expected_count,
        report.thermal_pattern.pattern_type,
        report.thermal_pattern.feature_count,
        report.thermal_pattern.expected_count,
        report.scores.sharpness,
        report.rgb_sharpness.score,
        report.thermal_sharpness.score,
        report.scores.contrast,
        report.rgb_contrast.score,
        report.thermal_contrast.score,
        report.scores.alignment,
        report.alignment.match_count,
        alignment_error,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scores(pattern: f64, sharpness: f64, contrast: f64, alignment: f64) -> ComponentScores {
        ComponentScores {
            pattern,
            sharpness,
            contrast,
            alignment,
        }
    }

    #[test]
    fn pattern_gate_dominates() {
        let s = scores(0.5, 1.0, 1.0, 1.0);
        assert_eq!(s.recommend(), QualityRecommendation::RetakeRequired);
    }

    #[test]
    fn blurry_capture_needs_retake_even_with_pattern() {
        let s = scores(0.8, 0.2, 1.0, 1.0);
        assert_eq!(s.recommend(), QualityRecommendation::RetakeRecommended);
    }

    #[test]
    fn low_contrast_or_alignment_recommends_retake() {
        assert_eq!(
            scores(0.9, 0.9, 0.3, 0.9).recommend(),
            QualityRecommendation::RetakeRecommended
        );
        assert_eq!(
            scores(0.9, 0.9, 0.9, 0.4).recommend(),
            QualityRecommendation::RetakeRecommended
        );
    }

    #[test]
    fn overall_buckets() {
        assert_eq!(
            scores(1.0, 1.0, 1.0, 1.0).recommend(),
            QualityRecommendation::Excellent
        );
        assert_eq!(
            scores(0.8, 0.8, 0.8, 0.8).recommend(),
            QualityRecommendation::Good
        );
        assert_eq!(
            scores(0.65, 0.6, 0.6, 0.6).recommend(),
            QualityRecommendation::Acceptable
        );
    }

    #[test]
    fn overall_weights() {
        let s = scores(1.0, 0.0, 0.0, 0.0);
        assert!((s.overall() - 0.4).abs() < 1e-12);
        let s = scores(0.0, 0.0, 0.0, 1.0);
        assert!((s.overall() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn black_frames_score_in_range() {
        let assessor = QualityAssessor::new(QualityConfig::default());
        let black = RasterImage::from_pixel(120, 90, Rgb([0, 0, 0]));
        let report = assessor.assess(&black, &black);

        for score in [
            report.scores.pattern,
            report.scores.sharpness,
            report.scores.contrast,
            report.scores.alignment,
            report.overall_score,
        ] {
            assert!((0.0..=1.0).contains(&score));
        }
        assert_eq!(report.recommendation, QualityRecommendation::RetakeRequired);
        assert!(report.details.contains("Overall"));
    }

    #[test]
    fn empty_frames_fail_cleanly() {
        let assessor = QualityAssessor::new(QualityConfig::default());
        let empty = RasterImage::new(0, 0);
        let report = assessor.assess(&empty, &empty);

        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.recommendation, QualityRecommendation::RetakeRequired);
        assert!(report.details.contains("empty image"));
    }

    #[test]
    fn unreadable_file_names_modality() {
        let assessor = QualityAssessor::new(QualityConfig::default());
        let report = assessor.assess_files(
            Path::new("/nonexistent/calib_1_rgb.jpg"),
            Path::new("/nonexistent/calib_1_thermal.png"),
        );

        assert_eq!(report.recommendation, QualityRecommendation::RetakeRequired);
        assert!(report.details.contains("Failed to load RGB calibration image"));
    }
}
