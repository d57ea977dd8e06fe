use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::imaging::{edge_density, laplacian_variance, sobel_magnitudes};
use crate::stats::{clamp_unit, mean};

/// Laplacian variance at which the blur term saturates
const LAPLACIAN_REFERENCE: f64 = 100.0;
/// Mean Sobel magnitude at which the gradient term saturates
const GRADIENT_REFERENCE: f64 = 200.0;
/// Central-difference step that counts a pixel as an edge
const EDGE_THRESHOLD: f64 = 30.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharpnessMetrics {
    pub laplacian_variance: f64,
    pub gradient_magnitude: f64,
    pub edge_density: f64,
    pub score: f64,
}

pub fn measure_sharpness(gray: &GrayImage) -> SharpnessMetrics {
    let laplacian_variance = laplacian_variance(gray);
    let gradient_magnitude = mean(&sobel_magnitudes(gray));
    let edge_density = edge_density(gray, EDGE_THRESHOLD);

    let score = clamp_unit(
        0.5 * clamp_unit(laplacian_variance / LAPLACIAN_REFERENCE)
            + 0.3 * clamp_unit(gradient_magnitude / GRADIENT_REFERENCE)
            + 0.2 * clamp_unit(edge_density),
    );

    SharpnessMetrics {
        laplacian_variance,
        gradient_magnitude,
        edge_density,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn flat_frame_is_not_sharp() {
        let flat = GrayImage::from_pixel(32, 32, Luma([0]));
        let metrics = measure_sharpness(&flat);
        assert_eq!(metrics.score, 0.0);
        assert_eq!(metrics.edge_density, 0.0);
    }

    #[test]
    fn fine_checker_is_sharper_than_soft_ramp() {
        let checker = GrayImage::from_fn(64, 64, |x, y| {
            Luma([if (x / 2 + y / 2) % 2 == 0 { 0 } else { 255 }])
        });
        let ramp = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]));

        let sharp = measure_sharpness(&checker);
        let soft = measure_sharpness(&ramp);

        assert!(sharp.score > 0.8, "checker {}", sharp.score);
        assert!(soft.score < 0.3, "ramp {}", soft.score);
        assert!(sharp.score <= 1.0);
    }
}
