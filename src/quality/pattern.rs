// Calibration pattern detectors
//
// Both detectors share the same shape: find raw candidates, snap them onto
// the expected grid (at most one feature per grid node), then score
// completeness and regularity of what survived.

use std::collections::BTreeMap;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::features::{corner_candidates, dedupe_by_bucket, retain_interior};
use crate::imaging::{sobel_edge_map, Point2};
use crate::stats::{clamp_unit, std_dev};

const INTERIOR_MARGIN: f64 = 0.1;
const BUCKET_SIZE_PX: f64 = 20.0;
const CORNER_TOLERANCE_RATIO: f64 = 0.3;
const CHESSBOARD_FOUND_RATIO: f64 = 0.7;

const BLOB_RADIUS: u32 = 10;
const BLOB_CONTRAST_THRESHOLD: f64 = 150.0;
const BLOB_TOLERANCE_RATIO: f64 = 0.4;
const CIRCLE_FOUND_RATIO: f64 = 0.6;
/// Circle detections are trusted less than chessboard corners
const CIRCLE_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternType {
    Chessboard,
    CircleGrid,
    Unknown,
}

/// Outcome of running one detector over one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternResult {
    pub found: bool,
    pub pattern_type: PatternType,
    /// Corners or blobs matched to a grid node
    pub feature_count: usize,
    pub expected_count: usize,
    /// completeness x regularity, in [0,1]
    pub pattern_score: f64,
    /// 1 - regularity, in [0,1]
    pub distortion: f64,
    pub completeness: f64,
    /// Matched features ordered by grid row, then column
    #[serde(skip)]
    pub points: Vec<Point2>,
}

impl PatternResult {
    pub fn not_found(pattern_type: PatternType, expected_count: usize) -> Self {
        Self {
            found: false,
            pattern_type,
            feature_count: 0,
            expected_count,
            pattern_score: 0.0,
            distortion: 1.0,
            completeness: 0.0,
            points: Vec::new(),
        }
    }

    fn scored(
        pattern_type: PatternType,
        points: Vec<Point2>,
        expected_count: usize,
        regularity: f64,
        confidence: f64,
        found_ratio: f64,
    ) -> Self {
        let completeness = clamp_unit(points.len() as f64 / expected_count.max(1) as f64);
        let regularity = clamp_unit(regularity);
        Self {
            found: points.len() as f64 >= expected_count as f64 * found_ratio,
            pattern_type,
            feature_count: points.len(),
            expected_count,
            pattern_score: clamp_unit(completeness * regularity * confidence),
            distortion: 1.0 - regularity,
            completeness,
            points,
        }
    }
}

/// A calibration-pattern detector.
pub trait PatternDetector: Send + Sync {
    fn pattern_type(&self) -> PatternType;
    fn detect(&self, gray: &GrayImage) -> PatternResult;
}

#[derive(Debug, Clone, Copy)]
enum GridAnchor {
    /// Inner corners where four squares meet
    Intersections,
    /// Centres of grid cells
    CellCenters,
}

/// Expected layout of a pattern stretched over the full frame.
#[derive(Debug, Clone, Copy)]
struct GridModel {
    rows: usize,
    cols: usize,
    anchor: GridAnchor,
}

impl GridModel {
    fn node_count(&self) -> usize {
        match self.anchor {
            GridAnchor::Intersections => {
                self.rows.saturating_sub(1) * self.cols.saturating_sub(1)
            }
            GridAnchor::CellCenters => self.rows * self.cols,
        }
    }

    fn spacing(&self, width: u32, height: u32) -> (f64, f64) {
        (
            width as f64 / self.cols.max(1) as f64,
            height as f64 / self.rows.max(1) as f64,
        )
    }

    /// Keep the closest point per grid node within `tolerance_ratio` of the spacing.
    fn snap(
        &self,
        points: &[Point2],
        width: u32,
        height: u32,
        tolerance_ratio: f64,
    ) -> Vec<Point2> {
        let (sx, sy) = self.spacing(width, height);
        let tolerance = sx.min(sy) * tolerance_ratio;
        let mut best: BTreeMap<(i64, i64), (f64, Point2)> = BTreeMap::new();

        for p in points {
            let (gx, gy, ex, ey) = match self.anchor {
                GridAnchor::Intersections => {
                    let gx = (p.x / sx).round() as i64;
                    let gy = (p.y / sy).round() as i64;
                    let valid = gx >= 1
                        && gx < self.cols as i64
                        && gy >= 1
                        && gy < self.rows as i64;
                    if !valid {
                        continue;
                    }
                    (gx, gy, gx as f64 * sx, gy as f64 * sy)
                }
                GridAnchor::CellCenters => {
                    let gx = (p.x / sx).floor() as i64;
                    let gy = (p.y / sy).floor() as i64;
                    let valid = gx >= 0
                        && gx < self.cols as i64
                        && gy >= 0
                        && gy < self.rows as i64;
                    if !valid {
                        continue;
                    }
                    (gx, gy, (gx as f64 + 0.5) * sx, (gy as f64 + 0.5) * sy)
                }
            };

            let distance = p.distance(&Point2::new(ex, ey));
            if distance > tolerance {
                continue;
            }
            let entry = best.entry((gy, gx)).or_insert((distance, *p));
            if distance < entry.0 {
                *entry = (distance, *p);
            }
        }

        best.into_values().map(|(_, p)| p).collect()
    }
}

/// 1 - mean relative deviation of nearest-neighbour distances from `unit`.
fn lattice_regularity(points: &[Point2], unit: f64) -> f64 {
    if points.len() < 4 || unit <= 0.0 {
        return 0.0;
    }

    let total: f64 = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let nearest = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, q)| p.distance(q))
                .fold(f64::MAX, f64::min);
            (nearest - unit).abs() / unit
        })
        .sum();

    1.0 - clamp_unit(total / points.len() as f64)
}

fn population_variance(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(std_dev(values).powi(2))
}

/// Regularity of row and column spacing between neighbouring features.
fn spacing_regularity(points: &[Point2], sx: f64, sy: f64) -> f64 {
    if points.len() < 4 {
        return 0.0;
    }

    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();
    for p in points {
        let right = points
            .iter()
            .filter(|q| (q.y - p.y).abs() < sy / 2.0 && q.x > p.x)
            .map(|q| q.x - p.x)
            .fold(f64::MAX, f64::min);
        if right < f64::MAX {
            horizontal.push(right);
        }

        let below = points
            .iter()
            .filter(|q| (q.x - p.x).abs() < sx / 2.0 && q.y > p.y)
            .map(|q| q.y - p.y)
            .fold(f64::MAX, f64::min);
        if below < f64::MAX {
            vertical.push(below);
        }
    }

    let variances: Vec<f64> = [population_variance(&horizontal), population_variance(&vertical)]
        .into_iter()
        .flatten()
        .collect();
    if variances.is_empty() {
        return 0.0;
    }
    let average = variances.iter().sum::<f64>() / variances.len() as f64;
    1.0 / (1.0 + average * 0.01)
}

/// Inner-corner detector for a `rows x cols` chessboard.
#[derive(Debug, Clone, Copy)]
pub struct ChessboardDetector {
    grid: GridModel,
}

impl ChessboardDetector {
    /// `rows` and `cols` count squares, so the board has `(rows-1)*(cols-1)` inner corners.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            grid: GridModel {
                rows,
                cols,
                anchor: GridAnchor::Intersections,
            },
        }
    }

    pub fn expected_corners(&self) -> usize {
        self.grid.node_count()
    }
}

impl Default for ChessboardDetector {
    fn default() -> Self {
        Self::new(9, 6)
    }
}

impl PatternDetector for ChessboardDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Chessboard
    }

    fn detect(&self, gray: &GrayImage) -> PatternResult {
        let (width, height) = gray.dimensions();
        let expected = self.grid.node_count();
        if width < 5 || height < 5 || expected == 0 {
            return PatternResult::not_found(PatternType::Chessboard, expected);
        }

        let edges = sobel_edge_map(gray);
        let candidates =
            retain_interior(corner_candidates(&edges), width, height, INTERIOR_MARGIN);
        let candidates = dedupe_by_bucket(candidates, BUCKET_SIZE_PX);
        let corners = self
            .grid
            .snap(&candidates, width, height, CORNER_TOLERANCE_RATIO);

        let (sx, sy) = self.grid.spacing(width, height);
        let regularity = lattice_regularity(&corners, sx.min(sy));

        let result = PatternResult::scored(
            PatternType::Chessboard,
            corners,
            expected,
            regularity,
            1.0,
            CHESSBOARD_FOUND_RATIO,
        );
        tracing::debug!(
            "[ChessboardDetector] corners={}/{} score={:.3} found={}",
            result.feature_count,
            expected,
            result.pattern_score,
            result.found
        );
        result
    }
}

/// Symmetric circle-grid detector for `rows x cols` circles.
#[derive(Debug, Clone, Copy)]
pub struct CircleGridDetector {
    grid: GridModel,
}

impl CircleGridDetector {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            grid: GridModel {
                rows,
                cols,
                anchor: GridAnchor::CellCenters,
            },
        }
    }

    pub fn expected_circles(&self) -> usize {
        self.grid.node_count()
    }
}

impl Default for CircleGridDetector {
    fn default() -> Self {
        Self::new(4, 11)
    }
}

/// Disk/ring contrast test on a coarse stride.
fn find_blobs(gray: &GrayImage) -> Vec<Point2> {
    let (width, height) = gray.dimensions();
    let r = BLOB_RADIUS;
    if width <= 2 * r || height <= 2 * r {
        return Vec::new();
    }

    let r_f = r as f64;
    let core_sq = (r_f / 3.0).floor().powi(2);
    let ring_inner_sq = (0.7 * r_f).powi(2);
    let ring_outer_sq = r_f * r_f;
    let mut blobs = Vec::new();

    for cy in (r..height - r).step_by(r as usize) {
        for cx in (r..width - r).step_by(r as usize) {
            let (mut core_sum, mut core_n) = (0.0, 0u32);
            let (mut ring_sum, mut ring_n) = (0.0, 0u32);

            for dy in -(r as i64)..=r as i64 {
                for dx in -(r as i64)..=r as i64 {
                    let d_sq = (dx * dx + dy * dy) as f64;
                    let value = gray
                        .get_pixel((cx as i64 + dx) as u32, (cy as i64 + dy) as u32)
                        .0[0] as f64;
                    if d_sq <= core_sq {
                        core_sum += value;
                        core_n += 1;
                    } else if d_sq > ring_inner_sq && d_sq <= ring_outer_sq {
                        ring_sum += value;
                        ring_n += 1;
                    }
                }
            }

            if core_n == 0 || ring_n == 0 {
                continue;
            }
            let contrast = (core_sum / core_n as f64 - ring_sum / ring_n as f64).abs();
            if contrast > BLOB_CONTRAST_THRESHOLD {
                blobs.push(Point2::new(cx as f64, cy as f64));
            }
        }
    }
    blobs
}

impl PatternDetector for CircleGridDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::CircleGrid
    }

    fn detect(&self, gray: &GrayImage) -> PatternResult {
        let (width, height) = gray.dimensions();
        let expected = self.grid.node_count();
        if expected == 0 {
            return PatternResult::not_found(PatternType::CircleGrid, expected);
        }

        let blobs = find_blobs(gray);
        let circles = self.grid.snap(&blobs, width, height, BLOB_TOLERANCE_RATIO);
        let (sx, sy) = self.grid.spacing(width, height);
        let regularity = spacing_regularity(&circles, sx, sy);

        let result = PatternResult::scored(
            PatternType::CircleGrid,
            circles,
            expected,
            regularity,
            CIRCLE_CONFIDENCE,
            CIRCLE_FOUND_RATIO,
        );
        tracing::debug!(
            "[CircleGridDetector] blobs={} matched={}/{} score={:.3} found={}",
            blobs.len(),
            result.feature_count,
            expected,
            result.pattern_score,
            result.found
        );
        result
    }
}
