use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::outcome::Scored;
use crate::imaging::luminance_stats;
use crate::stats::{clamp_unit, std_dev};

/// Assumed scene temperature span mapped onto 0..=255 intensity (degC)
const TEMP_FLOOR_C: f64 = 20.0;
const TEMP_SPAN_C: f64 = 20.0;
const UNIFORMITY_GRID: u32 = 4;

pub const IDENTITY_CORRECTION: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalEstimate {
    /// (min, max) in degC
    pub temperature_range: (f64, f64),
    pub noise_level: f64,
    pub uniformity_error: f64,
    /// Identity; no per-pixel correction is derived
    pub correction_matrix: [[f64; 3]; 3],
    pub quality: f64,
}

impl Scored for ThermalEstimate {
    fn quality(&self) -> f64 {
        self.quality
    }
}

fn intensity_to_celsius(value: f64) -> f64 {
    TEMP_FLOOR_C + value / 255.0 * TEMP_SPAN_C
}

/// Normalised spread of block means over a 4x4 grid.
///
/// Trailing rows/columns that do not fill a block are folded into the last one.
pub fn block_uniformity(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < UNIFORMITY_GRID || height < UNIFORMITY_GRID {
        return 0.0;
    }

    let block_w = width / UNIFORMITY_GRID;
    let block_h = height / UNIFORMITY_GRID;
    let mut means = Vec::with_capacity((UNIFORMITY_GRID * UNIFORMITY_GRID) as usize);

    for by in 0..UNIFORMITY_GRID {
        let y_end = if by == UNIFORMITY_GRID - 1 { height } else { (by + 1) * block_h };
        for bx in 0..UNIFORMITY_GRID {
            let x_end = if bx == UNIFORMITY_GRID - 1 { width } else { (bx + 1) * block_w };

            let mut sum = 0.0;
            let mut count = 0usize;
            for y in by * block_h..y_end {
                for x in bx * block_w..x_end {
                    sum += gray.get_pixel(x, y).0[0] as f64;
                    count += 1;
                }
            }
            means.push(sum / count as f64);
        }
    }

    std_dev(&means) / 255.0
}

pub fn thermal_quality(temperature_range: (f64, f64), noise_level: f64, uniformity_error: f64) -> f64 {
    let range = clamp_unit((temperature_range.1 - temperature_range.0) / TEMP_SPAN_C);
    clamp_unit(
        0.4 * range + 0.3 * (-10.0 * noise_level).exp() + 0.3 * (-10.0 * uniformity_error).exp(),
    )
}

pub fn estimate_thermal(gray: &GrayImage) -> ThermalEstimate {
    let stats = luminance_stats(gray);
    let temperature_range = (
        intensity_to_celsius(stats.min as f64),
        intensity_to_celsius(stats.max as f64),
    );
    let noise_level = stats.std_dev / 255.0;
    let uniformity_error = block_uniformity(gray);

    ThermalEstimate {
        temperature_range,
        noise_level,
        uniformity_error,
        correction_matrix: IDENTITY_CORRECTION,
        quality: thermal_quality(temperature_range, noise_level, uniformity_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn flat_frame_has_no_range() {
        let estimate = estimate_thermal(&GrayImage::from_pixel(32, 32, Luma([128])));

        let (low, high) = estimate.temperature_range;
        assert!((low - high).abs() < 1e-9);
        assert!((low - (20.0 + 128.0 / 255.0 * 20.0)).abs() < 1e-9);
        assert_eq!(estimate.noise_level, 0.0);
        assert_eq!(estimate.uniformity_error, 0.0);
        assert!((estimate.quality - 0.6).abs() < 1e-9);
        assert_eq!(estimate.correction_matrix, IDENTITY_CORRECTION);
    }

    #[test]
    fn full_span_with_quiet_background_scores_high() {
        let mut gray = GrayImage::from_pixel(40, 40, Luma([128]));
        gray.put_pixel(5, 5, Luma([0]));
        gray.put_pixel(30, 30, Luma([255]));

        let estimate = estimate_thermal(&gray);
        assert_eq!(estimate.temperature_range, (20.0, 40.0));
        assert!(estimate.noise_level < 0.05);
        assert!(estimate.quality > 0.9, "quality {}", estimate.quality);
    }

    #[test]
    fn split_frame_is_non_uniform() {
        let gray = GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 0 } else { 255 }]));
        assert!((block_uniformity(&gray) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn tiny_frame_skips_uniformity() {
        assert_eq!(block_uniformity(&GrayImage::new(3, 3)), 0.0);
    }
}
