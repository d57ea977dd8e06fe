// 3x3 gradient and Laplacian responses over grayscale frames.
//
// imageproc pads the border by replication; only interior pixels are
// reported (the edge map writes 0 on the border).

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::laplacian_filter;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// Sobel response across a straight step, relative to a central difference
const SOBEL_STEP_GAIN: f64 = 4.0;

type Response = ImageBuffer<Luma<i16>, Vec<i16>>;

/// Horizontal and vertical Sobel responses of a frame.
pub struct SobelResponse {
    gx: Response,
    gy: Response,
}

impl SobelResponse {
    pub fn new(gray: &GrayImage) -> Self {
        Self {
            gx: horizontal_sobel(gray),
            gy: vertical_sobel(gray),
        }
    }

    pub fn gradient(&self, x: u32, y: u32) -> (f64, f64) {
        (
            self.gx.get_pixel(x, y).0[0] as f64,
            self.gy.get_pixel(x, y).0[0] as f64,
        )
    }

    pub fn magnitude(&self, x: u32, y: u32) -> f64 {
        let (gx, gy) = self.gradient(x, y);
        (gx * gx + gy * gy).sqrt()
    }
}

fn interior(width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    (1..height.saturating_sub(1)).flat_map(move |y| (1..width.saturating_sub(1)).map(move |x| (x, y)))
}

/// Sobel gradient magnitude for every interior pixel, row-major.
pub fn sobel_magnitudes(gray: &GrayImage) -> Vec<f64> {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let sobel = SobelResponse::new(gray);
    interior(width, height)
        .map(|(x, y)| sobel.magnitude(x, y))
        .collect()
}

/// Sobel magnitude image clamped to 0..=255, zero on the border.
pub fn sobel_edge_map(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut edges = GrayImage::new(width, height);
    if width < 3 || height < 3 {
        return edges;
    }

    let sobel = SobelResponse::new(gray);
    for (x, y) in interior(width, height) {
        let magnitude = sobel.magnitude(x, y).min(255.0);
        edges.put_pixel(x, y, Luma([magnitude as u8]));
    }
    edges
}

/// Variance of the 4-neighbour Laplacian response over interior pixels.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let laplacian = laplacian_filter(gray);
    let responses: Vec<f64> = interior(width, height)
        .map(|(x, y)| laplacian.get_pixel(x, y).0[0] as f64)
        .collect();

    let count = responses.len() as f64;
    let mean = responses.iter().sum::<f64>() / count;
    responses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / count
}

/// Fraction of interior pixels whose horizontal or vertical Sobel response
/// exceeds a step of `threshold` grey levels.
pub fn edge_density(gray: &GrayImage, threshold: f64) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let sobel = SobelResponse::new(gray);
    let limit = threshold * SOBEL_STEP_GAIN;
    let edges = interior(width, height)
        .filter(|&(x, y)| {
            let (gx, gy) = sobel.gradient(x, y);
            gx.abs() > limit || gy.abs() > limit
        })
        .count();
    edges as f64 / ((width - 2) * (height - 2)) as f64
}
