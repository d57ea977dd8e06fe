//! Integration tests for clock synchronization
//!
//! Scenarios run against ManualTimeSource so every timestamp is exact:
//! - Health lifecycle from never-synced through expiry and re-sync
//! - Steady reference offset over a full sample window
//! - Four-timestamp exchanges submitted by a transport
//! - Concurrent synchronize calls from several tasks

use std::sync::Arc;

use multisensor_calibration::clock::{ClockSample, ClockSynchronizer, ManualTimeSource, TimeSource};
use multisensor_calibration::config::ClockSyncConfig;
use multisensor_calibration::error::SyncError;

const START_MS: i64 = 1_700_000_000_000;

fn synchronizer() -> (Arc<ManualTimeSource>, ClockSynchronizer) {
    let time = Arc::new(ManualTimeSource::new(START_MS));
    let source: Arc<dyn TimeSource> = time.clone();
    (time, ClockSynchronizer::new(source, ClockSyncConfig::default()))
}

#[tokio::test]
async fn test_health_lifecycle() {
    let (time, clock) = synchronizer();
    assert_eq!(clock.validate_health(), Err(SyncError::NotSynchronized));
    assert_eq!(clock.sync_status().sync_age_ms, -1);

    assert!(clock.synchronize(START_MS + 40).await);
    assert!(clock.validate_health().is_ok());

    // Past half the validity window: still healthy, only a warning
    time.advance(100_000);
    assert!(clock.validate_health().is_ok());
    assert!(clock.is_valid());

    time.advance(80_001);
    assert!(!clock.is_valid());
    assert_eq!(
        clock.validate_health(),
        Err(SyncError::Expired {
            age_ms: 180_001,
            validity_ms: 180_000,
        })
    );

    // An expired offset is still applied until a new sync replaces it
    assert_eq!(clock.synced_timestamp(START_MS), START_MS + 40);

    let now = time.now_ms();
    assert!(clock.synchronize(now + 40).await);
    assert!(clock.is_valid());
    assert_eq!(clock.sync_status().sync_age_ms, 0);
}

#[tokio::test]
async fn test_steady_offset_over_full_window() {
    let (time, clock) = synchronizer();

    for _ in 0..12 {
        let reference = time.now_ms() + 250;
        assert!(clock.synchronize(reference).await);
        time.advance(1_000);
    }

    let state = clock.state();
    assert_eq!(state.offset_ms, 250);
    assert_eq!(state.drift_rate, 0.0);
    assert!(state.quality_score > 0.9, "quality {}", state.quality_score);
    assert_eq!(clock.sample_count().await, 8);

    let metrics = clock.quality_metrics().await.unwrap();
    assert_eq!(metrics.accuracy_ms, 0.0);
    assert_eq!(metrics.average_latency_ms, 0.0);
    assert_eq!(metrics.sample_count, 8);

    let local = time.now_ms();
    assert_eq!(clock.device_to_reference(local), local + 250);
    assert_eq!(clock.reference_to_device(local + 250), local);
    assert_eq!(clock.current_synced_timestamp(), local + 250);
}

#[tokio::test]
async fn test_transport_samples_with_processing_delay() {
    let (_, clock) = synchronizer();

    // 30ms on the wire each way, 10ms of reference processing, reference 100ms ahead
    let t1 = START_MS;
    let t2 = t1 + 30 + 100;
    let t3 = t2 + 10;
    let t4 = t1 + 70;
    let sample = ClockSample::new(t1, t2, t3, t4);
    assert_eq!(sample.round_trip_delay_ms(), 60);
    assert_eq!(sample.clock_offset_ms(), 100);

    assert!(clock.submit_sample(sample).await);
    assert_eq!(clock.state().offset_ms, 100);
    assert_eq!(clock.state().reference_time_ms, t2);

    // A slow exchange is refused and the committed offset survives
    let slow = ClockSample::new(t4, t4 + 500, t4 + 500, t4 + 300);
    assert_eq!(slow.round_trip_delay_ms(), 300);
    assert!(!clock.submit_sample(slow).await);
    assert_eq!(clock.state().offset_ms, 100);
    assert_eq!(clock.sample_count().await, 1);
}

#[tokio::test]
async fn test_reset_returns_to_degraded_mode() {
    let (time, clock) = synchronizer();
    assert!(clock.synchronize(START_MS - 2_000).await);
    assert_eq!(clock.synced_timestamp(START_MS), START_MS - 2_000);

    clock.reset().await;
    assert!(!clock.state().synchronized);
    assert!(clock.quality_metrics().await.is_none());
    assert_eq!(clock.synced_timestamp(time.now_ms()), time.now_ms());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_synchronize_from_tasks() {
    let (time, clock) = synchronizer();
    let clock = Arc::new(clock);
    let reference = time.now_ms() + 75;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let clock = Arc::clone(&clock);
            tokio::spawn(async move { clock.synchronize(reference).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(clock.sample_count().await, 6);
    assert_eq!(clock.state().offset_ms, 75);
}
