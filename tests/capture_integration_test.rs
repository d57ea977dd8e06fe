//! Integration tests for capture orchestration
//!
//! These tests drive CaptureOrchestrator against a temporary session store
//! with in-process fake channels:
//! - Synchronized stamping of sessions
//! - Session discovery, statistics and deletion through the store
//! - Batch quality assessment over captured sessions

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use multisensor_calibration::capture::{
    CaptureChannel, CaptureCoverage, CaptureOrchestrator, ChannelFault, SessionStore,
};
use multisensor_calibration::clock::{ClockSynchronizer, ManualTimeSource, TimeSource};
use multisensor_calibration::config::{CaptureConfig, ClockSyncConfig, QualityConfig};
use multisensor_calibration::quality::{QualityAssessor, QualityRecommendation};

/// Saves a flat grey frame in the format implied by the target extension.
struct ImageChannel {
    calls: AtomicUsize,
}

impl ImageChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

impl CaptureChannel for ImageChannel {
    fn capture_to(&self, path: &Path) -> Result<bool, ChannelFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RgbImage::from_pixel(64, 48, Rgb([90, 90, 90])).save(path)?;
        Ok(true)
    }
}

struct OfflineChannel;

impl CaptureChannel for OfflineChannel {
    fn capture_to(&self, _path: &Path) -> Result<bool, ChannelFault> {
        Ok(false)
    }
}

struct Rig {
    time: Arc<ManualTimeSource>,
    clock: Arc<ClockSynchronizer>,
    orchestrator: CaptureOrchestrator,
}

fn rig(dir: &Path, rgb: Arc<dyn CaptureChannel>, thermal: Arc<dyn CaptureChannel>) -> Rig {
    let time = Arc::new(ManualTimeSource::new(1_700_000_000_000));
    let source: Arc<dyn TimeSource> = time.clone();
    let clock = Arc::new(ClockSynchronizer::new(source, ClockSyncConfig::default()));
    let config = CaptureConfig {
        directory: dir.to_path_buf(),
        thermal_warmup_delay_ms: 1,
        channel_timeout_ms: 5_000,
    };
    let orchestrator = CaptureOrchestrator::new(Arc::clone(&clock), rgb, thermal, config);
    Rig {
        time,
        clock,
        orchestrator,
    }
}

#[tokio::test]
async fn test_sessions_are_stamped_in_reference_time() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(dir.path(), ImageChannel::new(), ImageChannel::new());

    // Unsynchronized: degraded mode uses the local clock
    let degraded = rig.orchestrator.capture(None, true, true).await;
    assert!(degraded.success);
    assert_eq!(degraded.synced_timestamp_ms, degraded.timestamp_ms);

    let reference = rig.time.now_ms() + 5_000;
    assert!(rig.clock.synchronize(reference).await);

    rig.time.advance(10);
    let synced = rig.orchestrator.capture(None, true, true).await;
    assert!(synced.success, "{:?}", synced.error);
    assert_eq!(synced.synced_timestamp_ms, synced.timestamp_ms + 5_000);
    assert_ne!(synced.id, degraded.id);
}

#[tokio::test]
async fn test_store_sees_what_orchestrator_wrote() {
    let dir = tempfile::tempdir().unwrap();
    let rgb = ImageChannel::new();
    let rig = rig(dir.path(), rgb.clone(), ImageChannel::new());

    let complete = rig
        .orchestrator
        .capture(Some("session_a".to_string()), true, true)
        .await;
    let rgb_only = rig
        .orchestrator
        .capture(Some("session_b".to_string()), true, false)
        .await;
    assert!(complete.success && rgb_only.success);
    assert_eq!(rgb.calls.load(Ordering::SeqCst), 2);

    // A second orchestrator-free view of the same directory
    let store = SessionStore::new(dir.path());
    let found = store.find("session_a").unwrap();
    assert_eq!(found.coverage(), CaptureCoverage::Complete);
    assert_eq!(
        store.find("session_b").unwrap().coverage(),
        CaptureCoverage::RgbOnly
    );

    let stats = rig.orchestrator.statistics();
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.complete_sessions, 1);
    assert_eq!(stats.rgb_only_sessions, 1);
    assert_eq!(stats.total_captures, 3);

    assert!(rig.orchestrator.delete("session_a"));
    assert!(!rig.orchestrator.delete("session_a"));
    assert_eq!(rig.orchestrator.list_sessions().len(), 1);
}

#[tokio::test]
async fn test_reused_id_is_refused_without_touching_files() {
    let dir = tempfile::tempdir().unwrap();
    let rgb = ImageChannel::new();
    let rig = rig(dir.path(), rgb.clone(), ImageChannel::new());

    let first = rig
        .orchestrator
        .capture(Some("fixed".to_string()), true, true)
        .await;
    assert!(first.success);

    let second = rig
        .orchestrator
        .capture(Some("fixed".to_string()), true, true)
        .await;
    assert!(!second.success);
    assert!(second.error.unwrap().contains("fixed"));
    assert_eq!(rgb.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_declined_channel_keeps_partial_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(dir.path(), ImageChannel::new(), Arc::new(OfflineChannel));

    let session = rig.orchestrator.capture(None, true, true).await;
    assert!(!session.success);
    assert!(session.rgb_file.as_ref().unwrap().exists());
    assert!(session.thermal_file.is_none());
    assert_eq!(
        session.error.as_deref(),
        Some("Thermal capture failed: device reported failure")
    );

    let listed = rig.orchestrator.list_sessions();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].coverage(), CaptureCoverage::RgbOnly);
}

#[tokio::test]
async fn test_batch_assessment_keeps_session_order() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(dir.path(), ImageChannel::new(), ImageChannel::new());

    let mut sessions = Vec::new();
    for id in ["s1", "s2", "s3"] {
        sessions.push(rig.orchestrator.capture(Some(id.to_string()), true, true).await);
    }
    sessions.push(
        rig.orchestrator
            .capture(Some("s4".to_string()), true, false)
            .await,
    );

    let config = QualityConfig {
        max_parallel_assessments: 2,
        ..Default::default()
    };
    let assessor = Arc::new(QualityAssessor::new(config));
    let results = assessor.assess_sessions(&sessions).await;

    let ids: Vec<&str> = results.iter().map(|r| r.session_id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3", "s4"]);

    for result in &results[..3] {
        // Flat frames decode fine but carry no pattern
        assert!(!result.report.rgb_pattern.found);
        assert_eq!(
            result.report.recommendation,
            QualityRecommendation::RetakeRequired
        );
        assert!(result.report.details.contains("Overall"));
    }
    assert!(results[3]
        .report
        .details
        .contains("No thermal image provided for calibration"));
}
