// BroadcastChannelManager: lazily created fan-out for calibration progress
// and captured sessions

use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::calibration::CalibrationProgress;
use crate::capture::CalibrationSession;

/// Buffer for progress updates; a run emits four per attempt
const PROGRESS_BUFFER: usize = 50;
const SESSION_BUFFER: usize = 100;

type Slot<T> = Mutex<Option<broadcast::Sender<T>>>;

/// Owner of the workflow's broadcast senders
///
/// # Channels
/// - Calibration: Step progress during a calibration run
/// - Sessions: Every capture session produced by a run
pub struct BroadcastChannelManager {
    calibration: Slot<CalibrationProgress>,
    sessions: Slot<CalibrationSession>,
}

// A panicking publisher must not take the channels down with it
fn lock_slot<T>(slot: &Slot<T>) -> MutexGuard<'_, Option<broadcast::Sender<T>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn init_slot<T: Clone>(slot: &Slot<T>, buffer: usize) -> broadcast::Sender<T> {
    let mut guard = lock_slot(slot);
    match guard.as_ref() {
        Some(tx) => tx.clone(),
        None => {
            let (tx, _) = broadcast::channel(buffer);
            *guard = Some(tx.clone());
            tx
        }
    }
}

fn publish<T: Clone>(slot: &Slot<T>, value: T) {
    if let Some(tx) = lock_slot(slot).as_ref() {
        // No receivers is not an error
        let _ = tx.send(value);
    }
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with all channels uninitialized
    pub fn new() -> Self {
        Self {
            calibration: Mutex::new(None),
            sessions: Mutex::new(None),
        }
    }

    // ========================================================================
    // CALIBRATION CHANNEL
    // ========================================================================

    /// Initialize calibration broadcast channel
    ///
    /// Idempotent: a second call returns a sender for the existing channel so
    /// earlier subscribers keep receiving.
    pub fn init_calibration(&self) -> broadcast::Sender<CalibrationProgress> {
        init_slot(&self.calibration, PROGRESS_BUFFER)
    }

    /// Subscribe to calibration progress
    ///
    /// # Returns
    /// `None` if `init_calibration()` has not been called yet
    pub fn subscribe_calibration(&self) -> Option<broadcast::Receiver<CalibrationProgress>> {
        lock_slot(&self.calibration).as_ref().map(|tx| tx.subscribe())
    }

    /// Send progress if the channel exists
    pub fn publish_progress(&self, progress: CalibrationProgress) {
        publish(&self.calibration, progress);
    }

    // ========================================================================
    // SESSION CHANNEL
    // ========================================================================

    pub fn init_sessions(&self) -> broadcast::Sender<CalibrationSession> {
        init_slot(&self.sessions, SESSION_BUFFER)
    }

    pub fn subscribe_sessions(&self) -> Option<broadcast::Receiver<CalibrationSession>> {
        lock_slot(&self.sessions).as_ref().map(|tx| tx.subscribe())
    }

    pub fn publish_session(&self, session: CalibrationSession) {
        publish(&self.sessions, session);
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationStep;

    #[test]
    fn test_calibration_channel_lifecycle() {
        let manager = BroadcastChannelManager::new();

        // Initially no subscription possible
        assert!(manager.subscribe_calibration().is_none());

        let _tx = manager.init_calibration();
        assert!(manager.subscribe_calibration().is_some());
    }

    #[test]
    fn test_progress_reaches_every_subscriber() {
        let manager = BroadcastChannelManager::new();
        manager.init_calibration();

        let mut rx1 = manager.subscribe_calibration().unwrap();
        let mut rx2 = manager.subscribe_calibration().unwrap();

        manager.publish_progress(CalibrationProgress::new("run", CalibrationStep::Capture));

        assert_eq!(rx1.try_recv().unwrap().step, CalibrationStep::Capture);
        assert_eq!(rx2.try_recv().unwrap().step_number, 1);
    }

    #[test]
    fn test_reinit_keeps_existing_subscribers() {
        let manager = BroadcastChannelManager::new();
        manager.init_sessions();
        let mut rx = manager.subscribe_sessions().unwrap();

        let tx = manager.init_sessions();
        let session = CalibrationSession {
            id: "calib_1".to_string(),
            rgb_file: None,
            thermal_file: None,
            timestamp_ms: 1,
            synced_timestamp_ms: 1,
            success: false,
            error: None,
        };
        tx.send(session.clone()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), session);
    }

    #[test]
    fn test_publish_without_channel_is_noop() {
        let manager = BroadcastChannelManager::default();
        manager.publish_progress(CalibrationProgress::new("run", CalibrationStep::Finalise));
        assert!(manager.subscribe_calibration().is_none());
        assert!(manager.subscribe_sessions().is_none());
    }
}
