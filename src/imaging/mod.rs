//! Raster helpers shared by quality assessment and parameter estimation.

mod decode;
mod filters;
mod gray;

pub use decode::{FsImageDecoder, ImageDecoder};
pub use filters::{edge_density, laplacian_variance, sobel_edge_map, sobel_magnitudes, SobelResponse};
pub use gray::{luminance_stats, to_gray, LuminanceStats};

/// Decoded colour image handed to the analysers.
pub type RasterImage = image::RgbImage;

/// Single-channel luminance image.
pub type GrayFrame = image::GrayImage;

/// 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}
