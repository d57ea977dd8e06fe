//! Capture quality assessment.
//!
//! Scores an RGB/thermal pair on pattern presence, sharpness, contrast,
//! and cross-modal alignment, then turns the scores into a retake
//! recommendation.

mod alignment;
mod assessor;
mod contrast;
mod features;
mod pattern;
mod sharpness;

pub use alignment::{measure_alignment, AlignmentMetrics};
pub use assessor::{
    ComponentScores, QualityAssessor, QualityRecommendation, QualityReport, SessionQuality,
};
pub use contrast::{measure_contrast, ContrastMetrics};
pub use features::{corner_candidates, extract_features};
pub use pattern::{
    ChessboardDetector, CircleGridDetector, PatternDetector, PatternResult, PatternType,
};
pub use sharpness::{measure_sharpness, SharpnessMetrics};
