// Cross-modal alignment between RGB and thermal feature sets.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::features::extract_features;
use crate::imaging::Point2;
use crate::stats::clamp_unit;

const MAX_FEATURES: usize = 100;
const MAX_MATCHES: usize = 50;
const MIN_MATCHES_FOR_TRANSFORM: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMetrics {
    pub match_count: usize,
    /// `f64::MAX` when nothing matched
    pub mean_error_px: f64,
    /// `f64::MAX` when nothing matched
    pub max_error_px: f64,
    /// Translation-only 3x3 affine, present with at least four matches
    pub transform: Option<[[f64; 3]; 3]>,
    pub score: f64,
}

impl Default for AlignmentMetrics {
    fn default() -> Self {
        Self {
            match_count: 0,
            mean_error_px: f64::MAX,
            max_error_px: f64::MAX,
            transform: None,
            score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FeatureMatch {
    rgb: Point2,
    thermal: Point2,
    distance: f64,
}

/// Greedy nearest-neighbour matching; a thermal feature may be reused.
fn match_features(rgb: &[Point2], thermal: &[Point2], max_distance: f64) -> Vec<FeatureMatch> {
    let mut matches: Vec<FeatureMatch> = rgb
        .iter()
        .filter_map(|r| {
            thermal
                .iter()
                .map(|t| (t, r.distance(t)))
                .filter(|(_, d)| *d <= max_distance)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(t, distance)| FeatureMatch {
                    rgb: *r,
                    thermal: *t,
                    distance,
                })
        })
        .collect();

    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    matches.truncate(MAX_MATCHES);
    matches
}

fn translation(matches: &[FeatureMatch]) -> Option<[[f64; 3]; 3]> {
    if matches.len() < MIN_MATCHES_FOR_TRANSFORM {
        return None;
    }
    let n = matches.len() as f64;
    let dx = matches.iter().map(|m| m.thermal.x - m.rgb.x).sum::<f64>() / n;
    let dy = matches.iter().map(|m| m.thermal.y - m.rgb.y).sum::<f64>() / n;
    Some([[1.0, 0.0, dx], [0.0, 1.0, dy], [0.0, 0.0, 1.0]])
}

/// Score how well the feature layouts of two modalities coincide.
///
/// # Arguments
/// * `max_match_distance` - features farther apart are never paired (px)
/// * `max_acceptable_error` - mean error regarded as acceptable (px)
pub fn measure_alignment(
    rgb: &GrayImage,
    thermal: &GrayImage,
    max_match_distance: f64,
    max_acceptable_error: f64,
) -> AlignmentMetrics {
    let rgb_features = extract_features(rgb, MAX_FEATURES);
    let thermal_features = extract_features(thermal, MAX_FEATURES);
    let matches = match_features(&rgb_features, &thermal_features, max_match_distance);

    if matches.is_empty() {
        return AlignmentMetrics::default();
    }

    let mean_error = matches.iter().map(|m| m.distance).sum::<f64>() / matches.len() as f64;
    let max_error = matches.iter().map(|m| m.distance).fold(0.0, f64::max);

    let error_term = clamp_unit(max_acceptable_error / (mean_error + 1.0));
    let outlier_penalty = if max_error <= 2.0 * max_acceptable_error {
        1.0
    } else {
        0.5
    };
    let coverage = clamp_unit(matches.len() as f64 / MAX_MATCHES as f64);

    AlignmentMetrics {
        match_count: matches.len(),
        mean_error_px: mean_error,
        max_error_px: max_error,
        transform: translation(&matches),
        score: clamp_unit(0.7 * error_term * outlier_penalty + 0.3 * coverage),
    }
}
