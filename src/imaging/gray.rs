use image::{GrayImage, Luma, RgbImage};

/// ITU-R BT.601 luminance of every pixel.
pub fn to_gray(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// First and second moments of a grayscale image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuminanceStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: u8,
    pub max: u8,
}

pub fn luminance_stats(gray: &GrayImage) -> LuminanceStats {
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return LuminanceStats {
            mean: 0.0,
            std_dev: 0.0,
            min: 0,
            max: 0,
        };
    }

    let count = pixels.len() as f64;
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / count;
    let variance = pixels
        .iter()
        .map(|&p| (p as f64 - mean).powi(2))
        .sum::<f64>()
        / count;

    LuminanceStats {
        mean,
        std_dev: variance.sqrt(),
        min: pixels.iter().copied().min().unwrap_or(0),
        max: pixels.iter().copied().max().unwrap_or(0),
    }
}
