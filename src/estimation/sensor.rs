// Physiological (GSR) baseline collection and statistics
//
// A connected stream is polled on a tokio interval. Without one, or with too
// few valid readings, a simulated resting series is generated instead and the
// result is marked `simulated`.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};

use super::outcome::Scored;
use crate::config::EstimationConfig;
use crate::stats::{clamp_unit, mean, std_dev, variance};

/// Leading samples averaged into the baseline value
const BASELINE_WINDOW: usize = 20;
/// Plausible resting conductance (uS)
const RESTING_RANGE: (f64, f64) = (1.0, 5.0);
const SIGNAL_BOUNDS: (f64, f64) = (0.5, 10.0);
const SNR_CEILING: f64 = 1e6;
/// Interval variance assumed for simulated samples (1 ms jitter, in ms^2)
const SIMULATED_TIMING_VARIANCE: f64 = 1.0;

/// Live physiological sensor.
pub trait SensorStream: Send + Sync {
    fn is_connected(&self) -> bool;
    /// Latest reading, or `None` when no value is available.
    fn read_value(&self) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorBaseline {
    pub baseline: f64,
    /// (min, max)
    pub range: (f64, f64),
    pub sampling_accuracy: f64,
    pub snr: f64,
    pub quality: f64,
    /// True when no live samples backed this estimate
    pub simulated: bool,
    pub sample_count: usize,
}

impl Scored for SensorBaseline {
    fn quality(&self) -> f64 {
        self.quality
    }
}

/// Poll `stream` every `sensor_sample_interval_ms` for `sensor_sample_duration_ms`.
///
/// Returns the finite, positive readings and the variance of the intervals
/// between them (ms^2).
pub async fn collect_live(stream: &dyn SensorStream, config: &EstimationConfig) -> (Vec<f64>, f64) {
    let interval_ms = config.sensor_sample_interval_ms.max(1);
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = Instant::now() + Duration::from_millis(config.sensor_sample_duration_ms);
    let mut values = Vec::new();
    let mut read_times: Vec<Instant> = Vec::new();

    loop {
        let tick = ticker.tick().await;
        if tick >= deadline {
            break;
        }
        match stream.read_value() {
            Some(value) if value.is_finite() && value > 0.0 => {
                values.push(value);
                read_times.push(tick);
            }
            Some(value) => tracing::debug!("[ParameterEstimator] Discarding reading {}", value),
            None => {}
        }
    }

    let intervals: Vec<f64> = read_times
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]).as_secs_f64() * 1000.0)
        .collect();
    (values, variance(&intervals))
}

/// Resting-level series with slow drift, micro-fluctuation and a
/// breathing-rate component, bounded to the plausible signal range.
pub fn synthesize_series(count: usize, seed: Option<u64>) -> Vec<f64> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    (1..=count)
        .map(|i| {
            let t = i as f64;
            let drift = (t * 0.02).sin() * 0.1;
            let micro = (t * 0.3).sin() * 0.05;
            let breathing = (t * 0.15).sin() * 0.08;
            let noise = rng.gen_range(-1.0..1.0) * 0.03;
            (2.5 + drift + micro + breathing + noise).clamp(SIGNAL_BOUNDS.0, SIGNAL_BOUNDS.1)
        })
        .collect()
}

/// `exp(-timing variance / expected interval)`.
///
/// The variance (ms^2) rather than the standard deviation is used, so a
/// stream whose intervals wander by more than ~sqrt(interval) ms scores
/// close to zero.
pub fn sampling_accuracy(timing_variance: f64, expected_interval_ms: f64) -> f64 {
    clamp_unit((-timing_variance / expected_interval_ms.max(1.0)).exp())
}

pub fn signal_to_noise(values: &[f64]) -> f64 {
    let noise = std_dev(values);
    if noise > 0.0 {
        (mean(values).abs() / noise).min(SNR_CEILING)
    } else {
        SNR_CEILING
    }
}

pub fn baseline_quality(baseline: f64, range: (f64, f64), accuracy: f64, snr: f64) -> f64 {
    let level = if (RESTING_RANGE.0..=RESTING_RANGE.1).contains(&baseline) {
        1.0
    } else {
        0.5
    };
    let width = clamp_unit((range.1 - range.0) / 10.0);
    let snr = clamp_unit(snr / 50.0);
    clamp_unit(0.3 * level + 0.3 * width + 0.2 * accuracy + 0.2 * snr)
}

/// Summarise a non-empty series.
pub fn summarize(values: &[f64], accuracy: f64, simulated: bool) -> SensorBaseline {
    let head = &values[..values.len().min(BASELINE_WINDOW)];
    let baseline = mean(head);
    let range = values.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    let range = if values.is_empty() { (0.0, 0.0) } else { range };
    let snr = signal_to_noise(values);

    SensorBaseline {
        baseline,
        range,
        sampling_accuracy: accuracy,
        snr,
        quality: baseline_quality(baseline, range, accuracy, snr),
        simulated,
        sample_count: values.len(),
    }
}

/// Simulated baseline used when no live data is available.
pub fn simulated_baseline(config: &EstimationConfig) -> SensorBaseline {
    let series = synthesize_series(config.synthetic_sample_count.max(1), config.synthetic_seed);
    let accuracy = sampling_accuracy(SIMULATED_TIMING_VARIANCE, config.sensor_sample_interval_ms as f64);
    summarize(&series, accuracy, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RampSensor {
        reads: AtomicUsize,
    }

    impl SensorStream for RampSensor {
        fn is_connected(&self) -> bool {
            true
        }

        fn read_value(&self) -> Option<f64> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            match n % 5 {
                0 => None,
                1 => Some(f64::NAN),
                _ => Some(2.0 + n as f64 * 0.01),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn live_collection_keeps_valid_readings() {
        let sensor = RampSensor {
            reads: AtomicUsize::new(0),
        };
        let config = EstimationConfig::default();

        let (values, timing_variance) = collect_live(&sensor, &config).await;
        // 100 ticks, 2 of every 5 discarded
        assert_eq!(values.len(), 60);
        assert!(values.iter().all(|v| v.is_finite() && *v > 0.0));

        // readings skip ticks: 40 intervals of 100 ms and 19 of 300 ms
        let mean = (40.0 * 100.0 + 19.0 * 300.0) / 59.0;
        let expected =
            (40.0 * (100.0 - mean) * (100.0 - mean) + 19.0 * (300.0 - mean) * (300.0 - mean)) / 59.0;
        assert!((timing_variance - expected).abs() < 1e-6, "variance {timing_variance}");
    }

    #[test]
    fn accuracy_decays_with_timing_variance() {
        assert_eq!(sampling_accuracy(0.0, 100.0), 1.0);
        // 10 ms of jitter is 100 ms^2 of variance
        assert!((sampling_accuracy(100.0, 100.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert!(sampling_accuracy(10_000.0, 100.0) < 1e-6);
    }

    #[test]
    fn seeded_series_is_reproducible_and_bounded() {
        let a = synthesize_series(100, Some(7));
        let b = synthesize_series(100, Some(7));
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (0.5..=10.0).contains(v)));
        assert!(a.iter().all(|v| (2.0..=3.0).contains(v)));
    }

    #[test]
    fn simulated_baseline_is_flagged() {
        let config = EstimationConfig {
            synthetic_seed: Some(1),
            ..Default::default()
        };
        let baseline = simulated_baseline(&config);
        assert!(baseline.simulated);
        assert_eq!(baseline.sample_count, 100);
        assert!((2.0..=3.0).contains(&baseline.baseline));
        assert!((baseline.sampling_accuracy - (-0.01f64).exp()).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&baseline.quality));
    }

    #[test]
    fn constant_series_caps_snr() {
        let baseline = summarize(&[3.0; 12], 1.0, false);
        assert_eq!(baseline.snr, SNR_CEILING);
        assert_eq!(baseline.range, (3.0, 3.0));
        // level 1.0, width 0, accuracy 1.0, snr 1.0
        assert!((baseline.quality - 0.7).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_baseline_halves_level_term() {
        let low = baseline_quality(0.8, (0.0, 0.0), 0.0, 0.0);
        let resting = baseline_quality(2.5, (0.0, 0.0), 0.0, 0.0);
        assert!((low - 0.15).abs() < 1e-9);
        assert!((resting - 0.3).abs() < 1e-9);
    }
}
