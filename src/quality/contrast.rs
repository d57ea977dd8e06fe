use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::stats::clamp_unit;

const LOCAL_WINDOW: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContrastMetrics {
    /// (max - min) / 255
    pub dynamic_range: f64,
    /// (p95 - p5) / 255
    pub histogram_spread: f64,
    /// Mean (max - min) / 255 over every 5x5 window
    pub local_contrast: f64,
    pub score: f64,
}

pub fn measure_contrast(gray: &GrayImage) -> ContrastMetrics {
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return ContrastMetrics::default();
    }

    let min = pixels.iter().copied().min().unwrap_or(0);
    let max = pixels.iter().copied().max().unwrap_or(0);
    let dynamic_range = (max - min) as f64 / 255.0;
    let histogram_spread = percentile_spread(pixels);
    let local_contrast = local_contrast(gray);

    let score = clamp_unit(0.4 * dynamic_range + 0.4 * histogram_spread + 0.2 * local_contrast);

    ContrastMetrics {
        dynamic_range,
        histogram_spread,
        local_contrast,
        score,
    }
}

fn percentile_spread(pixels: &[u8]) -> f64 {
    let mut histogram = [0usize; 256];
    for &p in pixels {
        histogram[p as usize] += 1;
    }

    let total = pixels.len() as f64;
    let percentile = |fraction: f64| {
        let target = total * fraction;
        let mut cumulative = 0usize;
        for (level, count) in histogram.iter().enumerate() {
            cumulative += count;
            if cumulative as f64 >= target {
                return level;
            }
        }
        255
    };

    (percentile(0.95).saturating_sub(percentile(0.05))) as f64 / 255.0
}

/// Separable sliding min/max: one pass along rows, one down columns.
fn local_contrast(gray: &GrayImage) -> f64 {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    if width < LOCAL_WINDOW || height < LOCAL_WINDOW {
        return 0.0;
    }

    let pixels = gray.as_raw();
    let out_w = width - LOCAL_WINDOW + 1;
    let mut row_min = vec![0u8; out_w * height];
    let mut row_max = vec![0u8; out_w * height];

    for y in 0..height {
        let row = &pixels[y * width..(y + 1) * width];
        for x in 0..out_w {
            let window = &row[x..x + LOCAL_WINDOW];
            row_min[y * out_w + x] = window.iter().copied().min().unwrap_or(0);
            row_max[y * out_w + x] = window.iter().copied().max().unwrap_or(0);
        }
    }

    let out_h = height - LOCAL_WINDOW + 1;
    let mut total = 0.0;
    for y in 0..out_h {
        for x in 0..out_w {
            let mut lo = u8::MAX;
            let mut hi = u8::MIN;
            for wy in y..y + LOCAL_WINDOW {
                lo = lo.min(row_min[wy * out_w + x]);
                hi = hi.max(row_max[wy * out_w + x]);
            }
            total += (hi - lo) as f64 / 255.0;
        }
    }

    total / (out_w * out_h) as f64
}
