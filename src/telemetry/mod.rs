//! Calibration telemetry.
//!
//! Clock-sync, capture, quality and estimation events are appended to a
//! fixed-size ring and fanned out to broadcast subscribers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::calibration::CalibrationKind;
use crate::quality::QualityRecommendation;

pub mod events;

pub use events::{DiagnosticError, MetricEvent};

static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Process-wide hub every component reports to.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Point-in-time copy of the event ring.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

// Telemetry must keep working after a panicking publisher
fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fixed-size ring of recent events plus a live broadcast feed.
pub struct EventLog {
    feed: broadcast::Sender<MetricEvent>,
    ring: Mutex<VecDeque<MetricEvent>>,
    ring_size: usize,
    published: AtomicU64,
    evicted: AtomicU64,
}

impl EventLog {
    /// # Arguments
    /// * `feed_capacity` - events a lagging subscriber may fall behind by
    /// * `ring_size` - events retained for snapshots
    pub fn new(feed_capacity: usize, ring_size: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity.max(1));
        Self {
            feed,
            ring: Mutex::new(VecDeque::with_capacity(ring_size)),
            ring_size,
            published: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.ring_size > 0 {
            let mut ring = lock_recover(&self.ring);
            if ring.len() >= self.ring_size {
                ring.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            ring.push_back(event.clone());
        }

        // No subscribers is fine
        let _ = self.feed.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.feed.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recent = lock_recover(&self.ring).iter().cloned().collect();
        TelemetrySnapshot {
            recent,
            total_events: self.published.load(Ordering::Relaxed),
            dropped_events: self.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling window of accepted round-trip delays.
struct RoundTripTracker {
    delays: VecDeque<f64>,
    window: usize,
}

impl RoundTripTracker {
    fn with_window(window: usize) -> Self {
        Self {
            delays: VecDeque::with_capacity(window),
            window: window.max(1),
        }
    }

    /// Push a delay and return (mean, max, count) over the window.
    fn observe(&mut self, round_trip_ms: f64) -> (f64, f64, usize) {
        while self.delays.len() >= self.window {
            self.delays.pop_front();
        }
        self.delays.push_back(round_trip_ms.abs());

        let n = self.delays.len();
        let max = self.delays.iter().copied().fold(0.0_f64, f64::max);
        (self.delays.iter().sum::<f64>() / n as f64, max, n)
    }
}

/// Typed recording front-end over an [`EventLog`].
pub struct TelemetryHub {
    log: EventLog,
    round_trips: Mutex<RoundTripTracker>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, round_trip_window: usize) -> Self {
        Self {
            log: EventLog::new(channel_capacity, history_capacity),
            round_trips: Mutex::new(RoundTripTracker::with_window(round_trip_window)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.log.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.log.snapshot()
    }

    pub fn record_sync(&self, offset_ms: i64, round_trip_ms: i64, quality: f64) {
        self.log.publish(MetricEvent::SyncCompleted {
            offset_ms,
            round_trip_ms,
            quality,
        });

        let (avg_ms, max_ms, sample_count) =
            lock_recover(&self.round_trips).observe(round_trip_ms as f64);

        self.log.publish(MetricEvent::RoundTripStats {
            avg_ms,
            max_ms,
            sample_count,
        });
    }

    pub fn record_sync_rejected(&self, round_trip_ms: i64) {
        self.log
            .publish(MetricEvent::SyncRejected { round_trip_ms });
    }

    pub fn record_capture(&self, session_id: &str, success: bool, duration_ms: u64) {
        self.log.publish(MetricEvent::CaptureCompleted {
            session_id: session_id.to_string(),
            success,
            duration_ms,
        });
        if !success {
            self.record_error(DiagnosticError::CaptureFault, session_id);
        }
    }

    pub fn record_quality(&self, overall: f64, recommendation: QualityRecommendation) {
        self.log.publish(MetricEvent::QualityAssessed {
            overall,
            recommendation,
        });
    }

    pub fn record_calibration(&self, kind: CalibrationKind, quality: f64, success: bool) {
        self.log.publish(MetricEvent::CalibrationCompleted {
            kind,
            quality,
            success,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        self.log.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_keeps_publish_order() {
        let log = EventLog::new(8, 3);
        log.publish(MetricEvent::SyncRejected { round_trip_ms: 300 });
        log.publish(MetricEvent::SyncCompleted {
            offset_ms: 12,
            round_trip_ms: 20,
            quality: 0.9,
        });
        log.publish(MetricEvent::QualityAssessed {
            overall: 0.7,
            recommendation: QualityRecommendation::Good,
        });

        let recent = log.snapshot().recent;
        assert_eq!(recent.len(), 3);
        assert!(matches!(
            recent[0],
            MetricEvent::SyncRejected { round_trip_ms: 300 }
        ));
        assert!(matches!(
            recent[2],
            MetricEvent::QualityAssessed { .. }
        ));
    }

    #[test]
    fn full_ring_evicts_oldest() {
        let log = EventLog::new(8, 2);
        for round_trip_ms in [250, 260, 270] {
            log.publish(MetricEvent::SyncRejected { round_trip_ms });
        }

        let snapshot = log.snapshot();
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::SyncRejected { round_trip_ms: 260 }
        ));
    }

    #[test]
    fn hub_tracks_round_trip_window() {
        let hub = TelemetryHub::new(8, 16, 2);
        hub.record_sync(5, 10, 0.8);
        hub.record_sync(5, 30, 0.8);
        hub.record_sync(5, 20, 0.8);

        let stats: Vec<_> = hub
            .snapshot()
            .recent
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::RoundTripStats {
                    avg_ms,
                    max_ms,
                    sample_count,
                } => Some((avg_ms, max_ms, sample_count)),
                _ => None,
            })
            .collect();

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[2], (25.0, 30.0, 2));
    }

    #[test]
    fn failed_capture_also_records_error() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_capture("calib_1", false, 12);

        let recent = hub.snapshot().recent;
        assert_eq!(recent.len(), 2);
        assert_eq!(
            recent[1],
            MetricEvent::Error {
                code: DiagnosticError::CaptureFault,
                context: "calib_1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn subscribers_see_live_events() {
        let hub = TelemetryHub::new(8, 8, 4);
        let mut rx = hub.subscribe();
        hub.record_calibration(CalibrationKind::Thermal, 0.8, true);

        match rx.recv().await.unwrap() {
            MetricEvent::CalibrationCompleted { kind, success, .. } => {
                assert_eq!(kind, CalibrationKind::Thermal);
                assert!(success);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(MetricEvent::SyncRejected { round_trip_ms: 250 }).unwrap();
        assert_eq!(json["type"], "sync_rejected");
        assert_eq!(json["payload"]["round_trip_ms"], 250);
    }
}
