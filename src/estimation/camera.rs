// Camera intrinsics and lens distortion heuristics
//
// None of this is bundle adjustment. Focal length comes from the observed
// pattern spacing (or image statistics when no pattern is visible) and the
// distortion terms from how bent the traced edge lines are.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};

use super::outcome::Scored;
use crate::imaging::{edge_density, luminance_stats, sobel_edge_map, Point2};
use crate::quality::PatternResult;
use crate::stats::clamp_unit;

const PATTERN_FOCAL_RATIO: f64 = 0.7;
const PATTERN_HIGH_RES_GAIN: f64 = 1.15;
const PATTERN_ASPECT: f64 = 1.02;

const FALLBACK_FOCAL_RATIO: f64 = 0.8;
const FALLBACK_HIGH_RES_GAIN: f64 = 1.1;
const FALLBACK_ASPECT: f64 = 1.03;
const FALLBACK_EDGE_THRESHOLD: f64 = 30.0;

const LINE_EDGE_THRESHOLD: u8 = 50;
const MIN_LINE_PIXELS: usize = 20;
const MAX_LINES: usize = 10;
const TANGENTIAL_LIMIT: f64 = 0.01;

const SHARPNESS_GRADIENT_FLOOR: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

/// Brown-Conrady coefficients; radial `k1..k3`, tangential `p1, p2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistortionCoefficients {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub p1: f64,
    pub p2: f64,
}

impl DistortionCoefficients {
    /// OpenCV ordering `[k1, k2, p1, p2, k3]`.
    pub fn to_vector(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn l1_norm(&self) -> f64 {
        self.to_vector().iter().map(|c| c.abs()).sum()
    }
}

/// Exposure, focus and spread of a calibration image, each in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageStatistics {
    pub exposure: f64,
    pub sharpness: f64,
    pub contrast: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraEstimate {
    pub intrinsics: CameraIntrinsics,
    pub distortion: DistortionCoefficients,
    /// Present when a thermal image accompanied the RGB frame
    pub thermal_intrinsics: Option<CameraIntrinsics>,
    pub reprojection_error: f64,
    pub image: ImageStatistics,
    pub pattern_detected: bool,
    pub quality: f64,
}

impl Scored for CameraEstimate {
    fn quality(&self) -> f64 {
        self.quality
    }
}

/// Median nearest-neighbour distance between pattern points (px).
///
/// Independent of point order, so row wrap-arounds in a row-major corner
/// list never count as a grid step.
pub fn pattern_spacing(points: &[Point2]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let mut nearest: Vec<f64> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, q)| p.distance(q))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();
    nearest.sort_by(|a, b| a.total_cmp(b));

    let mid = nearest.len() / 2;
    Some(if nearest.len() % 2 == 0 {
        (nearest[mid - 1] + nearest[mid]) / 2.0
    } else {
        nearest[mid]
    })
}

/// Intrinsics from detected pattern points.
///
/// Returns `None` with fewer than two points.
pub fn intrinsics_from_pattern(
    points: &[Point2],
    width: u32,
    height: u32,
    square_size_px: f64,
    high_res: bool,
) -> Option<CameraIntrinsics> {
    if points.len() < 2 {
        return None;
    }

    let spacing = pattern_spacing(points)?;
    let scale = spacing / square_size_px.max(1.0);

    let base = width.max(height) as f64 * PATTERN_FOCAL_RATIO;
    let mut focal = base * (1.0 + scale * 0.1);
    if high_res {
        focal *= PATTERN_HIGH_RES_GAIN;
    }

    let n = points.len() as f64;
    Some(CameraIntrinsics {
        fx: focal,
        fy: focal * PATTERN_ASPECT,
        cx: points.iter().map(|p| p.x).sum::<f64>() / n,
        cy: points.iter().map(|p| p.y).sum::<f64>() / n,
    })
}

/// Shannon entropy of the luminance histogram, in bits (0..=8).
pub fn luminance_entropy(gray: &GrayImage) -> f64 {
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }

    let mut histogram = [0usize; 256];
    for &p in pixels {
        histogram[p as usize] += 1;
    }

    let total = pixels.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Intrinsics guessed from scene complexity when no pattern is visible.
pub fn intrinsics_from_statistics(gray: &GrayImage, high_res: bool) -> CameraIntrinsics {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as f64, height as f64);
    let complexity = clamp_unit(luminance_entropy(gray) / 8.0);
    let edges = edge_density(gray, FALLBACK_EDGE_THRESHOLD);

    let base = w.max(h) * FALLBACK_FOCAL_RATIO;
    let mut focal = base * (1.0 + (complexity - 0.5) * 0.2) * (1.0 + (edges - 0.5) * 0.1);
    if high_res {
        focal *= FALLBACK_HIGH_RES_GAIN;
    }

    CameraIntrinsics {
        fx: focal,
        fy: focal * FALLBACK_ASPECT,
        cx: w * 0.48 + complexity * w * 0.04,
        cy: h * 0.47 + edges * h * 0.06,
    }
}

/// Pattern-based intrinsics when `detection` found the board, else the
/// statistics fallback. The flag reports which path was taken.
pub fn estimate_intrinsics(
    gray: &GrayImage,
    detection: &PatternResult,
    square_size_px: f64,
    high_res: bool,
) -> (CameraIntrinsics, bool) {
    let (width, height) = gray.dimensions();
    if detection.found {
        if let Some(intrinsics) =
            intrinsics_from_pattern(&detection.points, width, height, square_size_px, high_res)
        {
            return (intrinsics, true);
        }
    }
    tracing::info!(
        "[ParameterEstimator] No {:?} pattern found, using image statistics for intrinsics",
        detection.pattern_type
    );
    (intrinsics_from_statistics(gray, high_res), false)
}

pub fn image_statistics(gray: &GrayImage) -> ImageStatistics {
    let stats = luminance_stats(gray);
    let exposure = if gray.as_raw().is_empty() {
        0.0
    } else if stats.mean < 50.0 {
        0.3
    } else if stats.mean > 200.0 {
        0.4
    } else {
        0.8 + 0.2 * (1.0 - (stats.mean - 127.5).abs() / 127.5)
    };

    ImageStatistics {
        exposure: clamp_unit(exposure),
        sharpness: forward_gradient_sharpness(gray),
        contrast: clamp_unit(stats.std_dev / 127.5),
    }
}

/// Mean forward-difference gradient of pixels above the noise floor, /255.
fn forward_gradient_sharpness(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 2 || height < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut count = 0usize;
    for y in 0..height - 1 {
        for x in 0..width - 1 {
            let here = gray.get_pixel(x, y).0[0] as f64;
            let gx = gray.get_pixel(x + 1, y).0[0] as f64 - here;
            let gy = gray.get_pixel(x, y + 1).0[0] as f64 - here;
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude > SHARPNESS_GRADIENT_FLOOR {
                total += magnitude;
                count += 1;
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        clamp_unit(total / count as f64 / 255.0)
    }
}

/// 8-connected edge components of at least `MIN_LINE_PIXELS`, first
/// `MAX_LINES` in scan order, each sorted by x.
fn trace_edge_lines(edges: &GrayImage) -> Vec<Vec<(i64, i64)>> {
    let mask = GrayImage::from_fn(edges.width(), edges.height(), |x, y| {
        Luma([if edges.get_pixel(x, y).0[0] > LINE_EDGE_THRESHOLD { 255 } else { 0 }])
    });
    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    // Labels are numbered in raster order of each component's first pixel
    let mut components: Vec<Vec<(i64, i64)>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 {
            continue;
        }
        if components.len() < label {
            components.resize_with(label, Vec::new);
        }
        components[label - 1].push((x as i64, y as i64));
    }

    components
        .into_iter()
        .filter(|line| line.len() >= MIN_LINE_PIXELS)
        .take(MAX_LINES)
        .map(|mut line| {
            line.sort_unstable();
            line
        })
        .collect()
}

/// Mean absolute turning angle over consecutive point triples (radians).
fn line_curvature(line: &[(i64, i64)]) -> f64 {
    if line.len() < 3 {
        return 0.0;
    }

    let total: f64 = line
        .windows(3)
        .map(|w| {
            let v1 = ((w[1].0 - w[0].0) as f64, (w[1].1 - w[0].1) as f64);
            let v2 = ((w[2].0 - w[1].0) as f64, (w[2].1 - w[1].1) as f64);
            let dot = v1.0 * v2.0 + v1.1 * v2.1;
            let det = v1.0 * v2.1 - v1.1 * v2.0;
            det.atan2(dot).abs()
        })
        .sum();
    total / (line.len() - 2) as f64
}

/// Mean edge response in a square window around `(x, y)`.
fn edge_energy(edges: &GrayImage, x: f64, y: f64, half: u32) -> f64 {
    let (width, height) = edges.dimensions();
    let cx = (x as u32).min(width - 1);
    let cy = (y as u32).min(height - 1);
    let (x0, x1) = (cx.saturating_sub(half), (cx + half).min(width - 1));
    let (y0, y1) = (cy.saturating_sub(half), (cy + half).min(height - 1));

    let mut sum = 0.0;
    let mut count = 0usize;
    for yy in y0..=y1 {
        for xx in x0..=x1 {
            sum += edges.get_pixel(xx, yy).0[0] as f64;
            count += 1;
        }
    }
    sum / count as f64
}

/// `(p1, p2)` from vertical and horizontal edge-energy imbalance at the four
/// corners and four edge midpoints of the frame.
fn tangential_terms(edges: &GrayImage) -> (f64, f64) {
    let (width, height) = edges.dimensions();
    let (w, h) = (width as f64, height as f64);
    let half = (width.min(height) / 20).max(2);

    let samples: Vec<(f64, f64, f64)> = [
        (0.1, 0.1),
        (0.9, 0.1),
        (0.1, 0.9),
        (0.9, 0.9),
        (0.5, 0.1),
        (0.5, 0.9),
        (0.1, 0.5),
        (0.9, 0.5),
    ]
    .iter()
    .map(|&(fx, fy)| (fx, fy, edge_energy(edges, w * fx, h * fy, half)))
    .collect();

    let side_mean = |pick: &dyn Fn(f64, f64) -> bool| {
        let picked: Vec<f64> = samples
            .iter()
            .filter(|(fx, fy, _)| pick(*fx, *fy))
            .map(|(_, _, e)| *e)
            .collect();
        picked.iter().sum::<f64>() / picked.len() as f64
    };
    let imbalance = |a: f64, b: f64| if a + b > 0.0 { (b - a) / (a + b) } else { 0.0 };

    let top = side_mean(&|_, fy| fy < 0.3);
    let bottom = side_mean(&|_, fy| fy > 0.7);
    let left = side_mean(&|fx, _| fx < 0.3);
    let right = side_mean(&|fx, _| fx > 0.7);

    let p1 = (imbalance(top, bottom) * TANGENTIAL_LIMIT).clamp(-TANGENTIAL_LIMIT, TANGENTIAL_LIMIT);
    let p2 = (imbalance(left, right) * TANGENTIAL_LIMIT).clamp(-TANGENTIAL_LIMIT, TANGENTIAL_LIMIT);
    (p1, p2)
}

pub fn estimate_distortion(gray: &GrayImage) -> DistortionCoefficients {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return DistortionCoefficients::default();
    }

    let edges = sobel_edge_map(gray);
    let lines = trace_edge_lines(&edges);
    let curvature = if lines.is_empty() {
        0.0
    } else {
        lines.iter().map(|line| line_curvature(line)).sum::<f64>() / lines.len() as f64
    };
    let (p1, p2) = tangential_terms(&edges);

    let coefficients = DistortionCoefficients {
        k1: (-0.1 * curvature).clamp(-0.5, 0.5),
        k2: (0.01 * curvature.powi(2)).clamp(-0.1, 0.1),
        k3: (-0.001 * curvature.powi(3)).clamp(-0.05, 0.05),
        p1,
        p2,
    };
    tracing::debug!(
        "[ParameterEstimator] lines={} curvature={:.4} distortion={:?}",
        lines.len(),
        curvature,
        coefficients
    );
    coefficients
}

/// Baseline 0.5 px, plus 10x the distortion L1 norm, minus up to 0.3 for a
/// plausible focal length. Never negative.
pub fn reprojection_error(intrinsics: &CameraIntrinsics, distortion: &DistortionCoefficients) -> f64 {
    let focal_bonus = ((intrinsics.fx + intrinsics.fy) / 2000.0).clamp(0.0, 0.3);
    (0.5 + distortion.l1_norm() * 10.0 - focal_bonus).max(0.0)
}

pub fn camera_quality(image: &ImageStatistics, reprojection_error: f64) -> f64 {
    clamp_unit(
        image.exposure * 0.3
            + image.sharpness * 0.3
            + image.contrast * 0.2
            + (-reprojection_error).exp() * 0.2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    #[test]
    fn pattern_intrinsics_center_on_points() {
        let points: Vec<Point2> = (0..4)
            .flat_map(|row| (0..4).map(move |col| Point2::new(100.0 + col as f64 * 30.0, 200.0 + row as f64 * 30.0)))
            .collect();

        let standard = intrinsics_from_pattern(&points, 640, 480, 30.0, false).unwrap();
        assert!((standard.cx - 145.0).abs() < 1e-9);
        assert!((standard.cy - 245.0).abs() < 1e-9);
        assert!((standard.fy / standard.fx - 1.02).abs() < 1e-9);
        assert!(standard.fx > 640.0 * 0.7);

        let high_res = intrinsics_from_pattern(&points, 640, 480, 30.0, true).unwrap();
        assert!((high_res.fx / standard.fx - 1.15).abs() < 1e-9);

        assert!(intrinsics_from_pattern(&points[..1], 640, 480, 30.0, false).is_none());
    }

    #[test]
    fn spacing_of_row_major_board_ignores_row_wraps() {
        // 9x6 inner corners, 25px apart, listed row by row
        let points: Vec<Point2> = (0..6)
            .flat_map(|row| (0..9).map(move |col| Point2::new(40.0 + col as f64 * 25.0, 60.0 + row as f64 * 25.0)))
            .collect();
        assert_eq!(pattern_spacing(&points), Some(25.0));

        let consecutive_mean = points
            .windows(2)
            .map(|pair| pair[0].distance(&pair[1]))
            .sum::<f64>()
            / (points.len() - 1) as f64;
        assert!(consecutive_mean > 30.0, "wrap-arounds inflate the naive mean");

        let mut shuffled = points.clone();
        shuffled.reverse();
        shuffled.swap(3, 40);
        assert_eq!(pattern_spacing(&shuffled), Some(25.0));
        assert_eq!(pattern_spacing(&points[..1]), None);
    }

    #[test]
    fn spacing_drives_focal_length() {
        let grid = |step: f64| -> Vec<Point2> {
            (0..6)
                .flat_map(|row| (0..9).map(move |col| Point2::new(col as f64 * step, row as f64 * step)))
                .collect()
        };
        // base 640 * 0.7 = 448; scale = 30 / 30 = 1 -> 448 * 1.1
        let matched = intrinsics_from_pattern(&grid(30.0), 640, 480, 30.0, false).unwrap();
        assert!((matched.fx - 492.8).abs() < 1e-9, "fx {}", matched.fx);

        let wider = intrinsics_from_pattern(&grid(60.0), 640, 480, 30.0, false).unwrap();
        assert!((wider.fx - 537.6).abs() < 1e-9, "fx {}", wider.fx);
    }

    #[test]
    fn edge_lines_are_split_by_connectivity() {
        let mut edges = GrayImage::new(60, 40);
        // Two 30px horizontal strokes, a diagonal 25px stroke and a 5px speck
        for x in 5..35 {
            edges.put_pixel(x, 5, Luma([200]));
            edges.put_pixel(x, 20, Luma([200]));
        }
        for i in 0..25 {
            edges.put_pixel(30 + i, 10 + i / 2, Luma([200]));
        }
        for x in 50..55 {
            edges.put_pixel(x, 38, Luma([200]));
        }
        // Below the line threshold
        for x in 0..60 {
            edges.put_pixel(x, 30, Luma([LINE_EDGE_THRESHOLD]));
        }

        let lines = trace_edge_lines(&edges);
        let lengths: Vec<usize> = lines.iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![30, 25, 30]);
        assert!(lines[0].windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(lines[1][0], (30, 10));
    }

    #[test]
    fn edge_lines_stop_at_the_cap() {
        let mut edges = GrayImage::new(40, 40);
        for y in (0..40).step_by(3) {
            for x in 0..30 {
                edges.put_pixel(x, y, Luma([255]));
            }
        }
        assert_eq!(trace_edge_lines(&edges).len(), MAX_LINES);
    }

    #[test]
    fn flat_image_uses_biased_center() {
        let gray = uniform(200, 100, 128);
        assert_eq!(luminance_entropy(&gray), 0.0);

        let intrinsics = intrinsics_from_statistics(&gray, false);
        assert!((intrinsics.cx - 96.0).abs() < 1e-9);
        assert!((intrinsics.cy - 47.0).abs() < 1e-9);
        // 160 * 0.9 * 0.95
        assert!((intrinsics.fx - 136.8).abs() < 1e-9);
    }

    #[test]
    fn entropy_of_two_level_image_is_one_bit() {
        let gray = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 255 }]));
        assert!((luminance_entropy(&gray) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn flat_image_has_no_distortion() {
        let distortion = estimate_distortion(&uniform(64, 64, 90));
        assert_eq!(distortion, DistortionCoefficients::default());
    }

    #[test]
    fn straight_edge_keeps_radial_terms_small() {
        let gray = GrayImage::from_fn(120, 120, |_, y| Luma([if y < 60 { 20 } else { 220 }]));
        let distortion = estimate_distortion(&gray);

        assert!(distortion.k1 <= 0.0 && distortion.k1 >= -0.5);
        assert!(distortion.k2 >= 0.0 && distortion.k2 <= 0.1);
        assert!(distortion.p1.abs() <= 0.01 && distortion.p2.abs() <= 0.01);
    }

    #[test]
    fn image_statistics_bands() {
        assert_eq!(image_statistics(&uniform(8, 8, 10)).exposure, 0.3);
        assert_eq!(image_statistics(&uniform(8, 8, 230)).exposure, 0.4);

        let mid = image_statistics(&uniform(8, 8, 128));
        assert!(mid.exposure > 0.99);
        assert_eq!(mid.sharpness, 0.0);
        assert_eq!(mid.contrast, 0.0);

        let split = GrayImage::from_fn(8, 8, |x, _| Luma([if x < 4 { 0 } else { 255 }]));
        let stats = image_statistics(&split);
        assert!((stats.contrast - 1.0).abs() < 1e-9);
        assert!((stats.sharpness - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reprojection_error_is_never_negative() {
        let wide = CameraIntrinsics {
            fx: 5000.0,
            fy: 5000.0,
            cx: 0.0,
            cy: 0.0,
        };
        let none = DistortionCoefficients::default();
        assert!((reprojection_error(&wide, &none) - 0.2).abs() < 1e-9);

        let bent = DistortionCoefficients {
            k1: -0.1,
            ..Default::default()
        };
        assert!((reprojection_error(&wide, &bent) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn camera_quality_stays_in_unit_range() {
        let perfect = ImageStatistics {
            exposure: 1.0,
            sharpness: 1.0,
            contrast: 1.0,
        };
        assert!((camera_quality(&perfect, 0.0) - 1.0).abs() < 1e-9);

        let dark = ImageStatistics {
            exposure: 0.0,
            sharpness: 0.0,
            contrast: 0.0,
        };
        assert_eq!(camera_quality(&dark, 1e9), 0.0);
    }
}
