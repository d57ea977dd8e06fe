// Corner-like feature extraction on a Sobel edge map.

use image::GrayImage;

use crate::imaging::{sobel_edge_map, Point2};

/// Mean edge magnitude a 5x5 neighbourhood needs to count as corner-like
pub const CORNER_ENERGY_THRESHOLD: f64 = 100.0;

const WINDOW_RADIUS: u32 = 2;
const SCAN_STRIDE: usize = 3;

/// Scan the edge map on a coarse stride for high-energy neighbourhoods.
///
/// Points come out in raster order (top to bottom, left to right).
pub fn corner_candidates(edges: &GrayImage) -> Vec<Point2> {
    let (width, height) = edges.dimensions();
    let r = WINDOW_RADIUS;
    if width <= 2 * r || height <= 2 * r {
        return Vec::new();
    }

    let window_area = ((2 * r + 1) * (2 * r + 1)) as f64;
    let threshold = CORNER_ENERGY_THRESHOLD * window_area;
    let mut corners = Vec::new();

    for y in (r..height - r).step_by(SCAN_STRIDE) {
        for x in (r..width - r).step_by(SCAN_STRIDE) {
            let mut energy = 0.0;
            for wy in y - r..=y + r {
                for wx in x - r..=x + r {
                    energy += edges.get_pixel(wx, wy).0[0] as f64;
                }
            }
            if energy > threshold {
                corners.push(Point2::new(x as f64, y as f64));
            }
        }
    }
    corners
}

/// Up to `limit` corner-like points of a grayscale frame, no grid filtering.
pub fn extract_features(gray: &GrayImage, limit: usize) -> Vec<Point2> {
    let edges = sobel_edge_map(gray);
    let mut features = corner_candidates(&edges);
    features.truncate(limit);
    features
}

/// Keep points inside the central `1 - 2 * margin` fraction of the frame.
pub fn retain_interior(points: Vec<Point2>, width: u32, height: u32, margin: f64) -> Vec<Point2> {
    let (w, h) = (width as f64, height as f64);
    points
        .into_iter()
        .filter(|p| {
            p.x > w * margin
                && p.x < w * (1.0 - margin)
                && p.y > h * margin
                && p.y < h * (1.0 - margin)
        })
        .collect()
}

/// First point per `cell`-sized spatial bucket.
pub fn dedupe_by_bucket(points: Vec<Point2>, cell: f64) -> Vec<Point2> {
    let mut seen = std::collections::HashSet::new();
    points
        .into_iter()
        .filter(|p| seen.insert(((p.x / cell) as i64, (p.y / cell) as i64)))
        .collect()
}
