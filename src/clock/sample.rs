// ClockSample and offset statistics
//
// Offsets are filtered with median/MAD rather than mean/stddev: with a
// window this small a single gross outlier inflates the plain standard
// deviation enough to survive a 2-sigma cut.

use serde::{Deserialize, Serialize};

use crate::stats::{clamp_unit, mean, std_dev};

/// Scale factor turning a median absolute deviation into a stddev estimate
const MAD_TO_SIGMA: f64 = 1.4826;

/// Lower bound on the robust spread so near-identical offsets are never cut (ms)
const MIN_SPREAD_MS: f64 = 1.0;

/// One NTP-style exchange with the reference clock.
///
/// `t1` local send, `t2` reference receive, `t3` reference send,
/// `t4` local receive. All in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSample {
    pub t1: i64,
    pub t2: i64,
    pub t3: i64,
    pub t4: i64,
    pub captured_at_ms: i64,
}

impl ClockSample {
    pub fn new(t1: i64, t2: i64, t3: i64, t4: i64) -> Self {
        Self {
            t1,
            t2,
            t3,
            t4,
            captured_at_ms: t4,
        }
    }

    /// Exchange where the reference does not distinguish receive from send.
    pub fn from_reference(t1: i64, reference_ms: i64, t4: i64) -> Self {
        Self::new(t1, reference_ms, reference_ms, t4)
    }

    /// `(t4 - t1) - (t3 - t2)`, saturating at the `i64` bounds.
    pub fn round_trip_delay_ms(&self) -> i64 {
        self.t4
            .saturating_sub(self.t1)
            .saturating_sub(self.t3.saturating_sub(self.t2))
    }

    /// `((t2 - t1) + (t3 - t4)) / 2`, saturating at the `i64` bounds.
    pub fn clock_offset_ms(&self) -> i64 {
        self.t2
            .saturating_sub(self.t1)
            .saturating_add(self.t3.saturating_sub(self.t4))
            / 2
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Drop offsets farther than `sigma` robust spreads from the median.
///
/// Order of the surviving offsets is preserved (oldest first).
pub fn filter_outliers(offsets: &[f64], sigma: f64) -> Vec<f64> {
    let center = median(offsets);
    let deviations: Vec<f64> = offsets.iter().map(|o| (o - center).abs()).collect();
    let spread = (median(&deviations) * MAD_TO_SIGMA).max(MIN_SPREAD_MS);
    let limit = sigma * spread;

    offsets
        .iter()
        .copied()
        .filter(|o| (o - center).abs() <= limit)
        .collect()
}

/// Outlier-filtered mean with linearly increasing weights toward newer offsets.
///
/// Below `min_samples` the newest offset is returned as-is.
pub fn weighted_offset(offsets: &[f64], min_samples: usize, sigma: f64) -> f64 {
    let Some(&latest) = offsets.last() else {
        return 0.0;
    };
    if offsets.len() < min_samples {
        return latest;
    }

    let kept = filter_outliers(offsets, sigma);
    if kept.is_empty() {
        return mean(offsets);
    }

    let n = kept.len() as f64;
    let (weighted_sum, weight_total) = kept
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, total), (i, offset)| {
            let weight = 1.0 + i as f64 / n;
            (sum + offset * weight, total + weight)
        });

    weighted_sum / weight_total
}

/// Statistics of the current sample window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQualityMetrics {
    /// Standard deviation of windowed offsets (ms)
    pub accuracy_ms: f64,
    /// Inverse coefficient of variation of offsets, clamped to [0,1]
    pub stability: f64,
    /// Half the mean round trip (ms)
    pub average_latency_ms: f64,
    /// Standard deviation of round trips (ms)
    pub jitter_ms: f64,
    pub drift_rate: f64,
    pub sample_count: usize,
}

impl SyncQualityMetrics {
    pub fn from_samples(
        samples: &[ClockSample],
        drift_rate: f64,
        target_accuracy_ms: f64,
    ) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let offsets: Vec<f64> = samples.iter().map(|s| s.clock_offset_ms() as f64).collect();
        let round_trips: Vec<f64> = samples
            .iter()
            .map(|s| s.round_trip_delay_ms() as f64)
            .collect();

        let accuracy_ms = std_dev(&offsets);
        let mean_offset = mean(&offsets);
        let stability = if mean_offset != 0.0 {
            clamp_unit(mean_offset.abs() / accuracy_ms)
        } else if accuracy_ms < target_accuracy_ms {
            1.0
        } else {
            0.0
        };

        Some(Self {
            accuracy_ms,
            stability,
            average_latency_ms: mean(&round_trips) / 2.0,
            jitter_ms: std_dev(&round_trips),
            drift_rate,
            sample_count: samples.len(),
        })
    }

    /// Composite 0..1 score: accuracy 0.5, stability 0.3, latency 0.1, jitter 0.1.
    pub fn score(&self, target_accuracy_ms: f64) -> f64 {
        let accuracy = clamp_unit(target_accuracy_ms / (self.accuracy_ms + 1.0));
        let latency = clamp_unit(50.0 / (self.average_latency_ms + 1.0));
        let jitter = clamp_unit(target_accuracy_ms / (self.jitter_ms + 1.0));

        clamp_unit(0.5 * accuracy + 0.3 * self.stability + 0.1 * latency + 0.1 * jitter)
    }
}
