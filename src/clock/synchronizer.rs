// ClockSynchronizer: NTP-style offset estimation against a reference clock
//
// Single writer: the sample window and the offset-commit sequence sit behind
// one async mutex, so concurrent `synchronize` calls serialize. The committed
// SyncState lives in a separate RwLock and is only replaced wholesale at the
// end of a successful commit, so readers never see a partial update.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::sample::{weighted_offset, ClockSample, SyncQualityMetrics};
use super::source::TimeSource;
use crate::config::ClockSyncConfig;
use crate::error::{log_sync_error, ErrorCode, SyncError};
use crate::telemetry;

/// Committed synchronization state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Offset added to local time to obtain reference time (ms)
    pub offset_ms: i64,
    /// Local time of the last accepted sync, 0 if never
    pub last_sync_ms: i64,
    /// Reference timestamp supplied with the last accepted sync
    pub reference_time_ms: i64,
    /// Offset change per elapsed millisecond
    pub drift_rate: f64,
    pub synchronized: bool,
    /// Composite accuracy/stability/latency/jitter score in [0,1]
    pub quality_score: f64,
}

/// Point-in-time status snapshot for callers and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub synchronized: bool,
    pub offset_ms: i64,
    pub last_sync_ms: i64,
    pub reference_time_ms: i64,
    /// Age of the last sync, -1 when never synchronized
    pub sync_age_ms: i64,
    pub drift_rate: f64,
    pub quality_score: f64,
}

struct SampleWindow {
    samples: VecDeque<ClockSample>,
    last_correction_ms: i64,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            last_correction_ms: 0,
        }
    }
}

/// Maintains a filtered, drift-corrected clock offset.
pub struct ClockSynchronizer {
    time: Arc<dyn TimeSource>,
    config: ClockSyncConfig,
    window: Mutex<SampleWindow>,
    state: RwLock<SyncState>,
}

impl ClockSynchronizer {
    pub fn new(time: Arc<dyn TimeSource>, config: ClockSyncConfig) -> Self {
        let capacity = config.window_capacity.max(1);
        Self {
            time,
            config,
            window: Mutex::new(SampleWindow::new(capacity)),
            state: RwLock::new(SyncState::default()),
        }
    }

    pub fn config(&self) -> &ClockSyncConfig {
        &self.config
    }

    pub fn now_ms(&self) -> i64 {
        self.time.now_ms()
    }

    /// Run one round trip against `reference_ms` and commit the result.
    ///
    /// The reference timestamp stands in for both reference receive and send.
    ///
    /// # Returns
    /// `false` when the round trip exceeds the configured ceiling; committed
    /// state is left untouched in that case.
    pub async fn synchronize(&self, reference_ms: i64) -> bool {
        let mut window = self.window.lock().await;

        let t1 = self.time.now_ms();
        tokio::task::yield_now().await;
        let t4 = self.time.now_ms();

        self.commit(&mut window, ClockSample::from_reference(t1, reference_ms, t4))
    }

    /// Commit a four-timestamp exchange measured by the caller.
    pub async fn submit_sample(&self, sample: ClockSample) -> bool {
        let mut window = self.window.lock().await;
        self.commit(&mut window, sample)
    }

    fn commit(&self, window: &mut SampleWindow, sample: ClockSample) -> bool {
        let round_trip_ms = sample.round_trip_delay_ms();
        if round_trip_ms > self.config.max_round_trip_ms {
            let err = SyncError::RoundTripTooHigh {
                round_trip_ms,
                limit_ms: self.config.max_round_trip_ms,
            };
            tracing::warn!("[ClockSynchronizer] Sample rejected: {}", err.message());
            telemetry::hub().record_sync_rejected(round_trip_ms);
            return false;
        }

        let previous = match self.read_state() {
            Ok(guard) => guard.clone(),
            Err(err) => {
                log_sync_error(&err, "synchronize");
                return false;
            }
        };

        if window.samples.len() >= self.config.window_capacity.max(1) {
            window.samples.pop_front();
        }
        window.samples.push_back(sample);

        let offsets: Vec<f64> = window
            .samples
            .iter()
            .map(|s| s.clock_offset_ms() as f64)
            .collect();
        let candidate = weighted_offset(
            &offsets,
            self.config.min_filter_samples,
            self.config.outlier_sigma,
        );

        let now = sample.t4;
        let drift_rate = self.blend_drift(&previous, candidate, now);

        let applied = if drift_rate == 0.0 || window.last_correction_ms == 0 {
            candidate
        } else {
            let since_correction = now.saturating_sub(window.last_correction_ms) as f64;
            candidate - drift_rate * since_correction
        };
        window.last_correction_ms = now;

        let samples: Vec<ClockSample> = window.samples.iter().copied().collect();
        let quality_score =
            SyncQualityMetrics::from_samples(&samples, drift_rate, self.config.target_accuracy_ms)
                .map(|m| m.score(self.config.target_accuracy_ms))
                .unwrap_or(0.0);

        let next = SyncState {
            offset_ms: applied.round() as i64,
            last_sync_ms: now,
            reference_time_ms: sample.t2,
            drift_rate,
            synchronized: true,
            quality_score,
        };

        match self.write_state() {
            Ok(mut guard) => *guard = next.clone(),
            Err(err) => {
                log_sync_error(&err, "synchronize");
                return false;
            }
        }

        tracing::info!(
            "[ClockSynchronizer] Sync accepted: offset={}ms rtt={}ms quality={:.3} samples={}",
            next.offset_ms,
            round_trip_ms,
            quality_score,
            samples.len()
        );
        telemetry::hub().record_sync(next.offset_ms, round_trip_ms, quality_score);
        true
    }

    fn blend_drift(&self, previous: &SyncState, candidate: f64, now: i64) -> f64 {
        if !previous.synchronized || previous.last_sync_ms <= 0 {
            return previous.drift_rate;
        }
        let elapsed = now.saturating_sub(previous.last_sync_ms);
        if elapsed <= 0 {
            return previous.drift_rate;
        }

        let observed = (candidate - previous.offset_ms as f64) / elapsed as f64;
        if previous.drift_rate == 0.0 {
            observed
        } else {
            let keep = self.config.drift_blend_old;
            keep * previous.drift_rate + (1.0 - keep) * observed
        }
    }

    /// Local timestamp shifted into the reference timebase.
    ///
    /// When never synchronized the local time is returned unchanged and a
    /// degraded-mode warning is logged.
    pub fn synced_timestamp(&self, local_ms: i64) -> i64 {
        let state = self.state();
        if !state.synchronized {
            tracing::warn!(
                "[ClockSynchronizer] Not synchronized, using local timestamp {}",
                local_ms
            );
            return local_ms;
        }
        local_ms.saturating_add(state.offset_ms)
    }

    /// Synced timestamp for the current local time.
    pub fn current_synced_timestamp(&self) -> i64 {
        self.synced_timestamp(self.time.now_ms())
    }

    /// True while the last successful sync is within the validity window.
    pub fn is_valid(&self) -> bool {
        let state = self.state();
        state.synchronized
            && self.time.now_ms().saturating_sub(state.last_sync_ms)
                <= self.config.validity_window_ms
    }

    /// Copy of the committed state.
    pub fn state(&self) -> SyncState {
        match self.read_state() {
            Ok(guard) => guard.clone(),
            Err(err) => {
                log_sync_error(&err, "state");
                SyncState::default()
            }
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        let state = self.state();
        let sync_age_ms = if state.synchronized {
            self.time.now_ms().saturating_sub(state.last_sync_ms)
        } else {
            -1
        };

        SyncStatus {
            synchronized: state.synchronized,
            offset_ms: state.offset_ms,
            last_sync_ms: state.last_sync_ms,
            reference_time_ms: state.reference_time_ms,
            sync_age_ms,
            drift_rate: state.drift_rate,
            quality_score: state.quality_score,
        }
    }

    /// Statistics over the current sample window, `None` when empty.
    pub async fn quality_metrics(&self) -> Option<SyncQualityMetrics> {
        let window = self.window.lock().await;
        let samples: Vec<ClockSample> = window.samples.iter().copied().collect();
        SyncQualityMetrics::from_samples(
            &samples,
            self.state().drift_rate,
            self.config.target_accuracy_ms,
        )
    }

    pub async fn sample_count(&self) -> usize {
        self.window.lock().await.samples.len()
    }

    /// Forget all samples, drift, and the committed offset.
    pub async fn reset(&self) {
        let mut window = self.window.lock().await;
        window.samples.clear();
        window.last_correction_ms = 0;

        match self.write_state() {
            Ok(mut guard) => *guard = SyncState::default(),
            Err(err) => log_sync_error(&err, "reset"),
        }
        tracing::info!("[ClockSynchronizer] Synchronization reset");
    }

    pub fn device_to_reference(&self, device_ms: i64) -> i64 {
        device_ms.saturating_add(self.state().offset_ms)
    }

    pub fn reference_to_device(&self, reference_ms: i64) -> i64 {
        reference_ms.saturating_sub(self.state().offset_ms)
    }

    /// One-way latency estimate for a request sent at `request_sent_ms`.
    pub fn estimate_network_latency(&self, request_sent_ms: i64) -> i64 {
        self.time.now_ms().saturating_sub(request_sent_ms) / 2
    }

    /// Check that synchronization exists and has not expired.
    ///
    /// # Errors
    /// - `NotSynchronized` when no sync has been committed
    /// - `Expired` once the validity window has elapsed
    /// - `StatePoisoned` on lock poisoning
    pub fn validate_health(&self) -> Result<(), SyncError> {
        let state = self.read_state()?.clone();
        if !state.synchronized {
            return Err(SyncError::NotSynchronized);
        }

        let age_ms = self.time.now_ms().saturating_sub(state.last_sync_ms);
        let validity_ms = self.config.validity_window_ms;
        if age_ms > validity_ms {
            return Err(SyncError::Expired {
                age_ms,
                validity_ms,
            });
        }
        if age_ms > validity_ms / 2 {
            tracing::warn!(
                "[ClockSynchronizer] Sync is aging: {}ms old, re-sync recommended",
                age_ms
            );
        }
        Ok(())
    }

    // ========================================================================
    // HELPER METHODS - Lock management
    // ========================================================================

    fn read_state(&self) -> Result<RwLockReadGuard<'_, SyncState>, SyncError> {
        self.state.read().map_err(|_| SyncError::StatePoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, SyncState>, SyncError> {
        self.state.write().map_err(|_| SyncError::StatePoisoned)
    }
}
