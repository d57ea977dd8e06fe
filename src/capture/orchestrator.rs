// CaptureOrchestrator: concurrent RGB + thermal acquisition
//
// Each requested channel runs its blocking capture call on tokio's blocking
// pool. Thermal is started after a warm-up delay. Faults, panics and
// timeouts are folded into the returned session and never escape.

use std::any::Any;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::channel::{CaptureChannel, ChannelKind, ChannelStatus};
use super::session::{CalibrationSession, CaptureStatistics, SessionStore};
use crate::clock::ClockSynchronizer;
use crate::config::CaptureConfig;
use crate::error::{log_capture_error, CaptureError, ErrorCode};
use crate::telemetry;

pub struct CaptureOrchestrator {
    clock: Arc<ClockSynchronizer>,
    rgb: Arc<dyn CaptureChannel>,
    thermal: Arc<dyn CaptureChannel>,
    store: SessionStore,
    config: CaptureConfig,
    session_counter: AtomicU64,
    total_captures: AtomicU64,
    /// Ids reserved by captures that have not finished yet
    in_flight: Mutex<HashSet<String>>,
}

/// Reservation of a session id; released on drop.
struct IdClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for IdClaim<'_> {
    fn drop(&mut self) {
        lock_ids(self.in_flight).remove(&self.id);
    }
}

// The set only holds ids, so a poisoned lock is still consistent
fn lock_ids(ids: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CaptureOrchestrator {
    pub fn new(
        clock: Arc<ClockSynchronizer>,
        rgb: Arc<dyn CaptureChannel>,
        thermal: Arc<dyn CaptureChannel>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            store: SessionStore::new(config.directory.clone()),
            clock,
            rgb,
            thermal,
            config,
            session_counter: AtomicU64::new(0),
            total_captures: AtomicU64::new(0),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// `calib_<local ms>_<counter>`, skipping ids that already own files or
    /// belong to a capture still in progress.
    pub fn next_session_id(&self) -> String {
        loop {
            let id = self.candidate_id();
            if !lock_ids(&self.in_flight).contains(&id) && !self.store.has_artifacts(&id) {
                return id;
            }
        }
    }

    fn candidate_id(&self) -> String {
        let counter = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("calib_{}_{}", self.clock.now_ms(), counter)
    }

    /// Reserve `id` for one capture.
    ///
    /// # Errors
    /// `SessionIdInUse` when another capture holds the id or its files exist.
    fn claim(&self, id: &str) -> Result<IdClaim<'_>, CaptureError> {
        let in_use = || CaptureError::SessionIdInUse { id: id.to_string() };
        if !lock_ids(&self.in_flight).insert(id.to_string()) {
            return Err(in_use());
        }
        let claim = IdClaim {
            in_flight: &self.in_flight,
            id: id.to_string(),
        };
        if self.store.has_artifacts(id) {
            return Err(in_use());
        }
        Ok(claim)
    }

    fn claim_generated(&self) -> IdClaim<'_> {
        loop {
            if let Ok(claim) = self.claim(&self.candidate_id()) {
                return claim;
            }
        }
    }

    /// Capture one session.
    ///
    /// # Arguments
    /// * `session_id` - Explicit id, or `None` to generate one
    /// * `capture_rgb` / `capture_thermal` - Channels to run
    ///
    /// # Returns
    /// The session record. `success` is true only when every requested
    /// channel produced a file.
    pub async fn capture(
        &self,
        session_id: Option<String>,
        capture_rgb: bool,
        capture_thermal: bool,
    ) -> CalibrationSession {
        let started = Instant::now();
        let timestamp_ms = self.clock.now_ms();
        let synced_timestamp_ms = self.clock.synced_timestamp(timestamp_ms);

        let reserved = self.reserve(session_id, capture_rgb, capture_thermal);
        let claim = match reserved {
            Ok(claim) => claim,
            Err((id, err)) => {
                log_capture_error(&err, "capture");
                let session =
                    CalibrationSession::rejected(id, timestamp_ms, synced_timestamp_ms, &err);
                self.finish(&session, started);
                return session;
            }
        };
        let id = claim.id.clone();

        tracing::info!(
            "[CaptureOrchestrator] Capturing {} (rgb={}, thermal={}, synced={})",
            id,
            capture_rgb,
            capture_thermal,
            synced_timestamp_ms
        );

        let (rgb, thermal) = tokio::join!(
            self.run_channel(ChannelKind::Rgb, &id, capture_rgb),
            self.run_channel(ChannelKind::Thermal, &id, capture_thermal),
        );

        let session =
            CalibrationSession::from_channels(id, timestamp_ms, synced_timestamp_ms, &rgb, &thermal);
        self.finish(&session, started);
        drop(claim);
        session
    }

    /// Validate the request and reserve its id until the capture finishes.
    fn reserve(
        &self,
        session_id: Option<String>,
        capture_rgb: bool,
        capture_thermal: bool,
    ) -> Result<IdClaim<'_>, (String, CaptureError)> {
        if !capture_rgb && !capture_thermal {
            let id = session_id.unwrap_or_else(|| self.next_session_id());
            return Err((id, CaptureError::NoChannelRequested));
        }

        let claim = match session_id {
            Some(id) => self.claim(&id).map_err(|err| (id, err))?,
            None => self.claim_generated(),
        };
        self.store
            .ensure_dir()
            .map_err(|err| (claim.id.clone(), err))?;
        Ok(claim)
    }

    fn channel(&self, kind: ChannelKind) -> Arc<dyn CaptureChannel> {
        match kind {
            ChannelKind::Rgb => Arc::clone(&self.rgb),
            ChannelKind::Thermal => Arc::clone(&self.thermal),
        }
    }

    async fn run_channel(&self, kind: ChannelKind, id: &str, requested: bool) -> ChannelStatus {
        if !requested {
            return ChannelStatus::NotRequested;
        }

        if kind == ChannelKind::Thermal && self.config.thermal_warmup_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.thermal_warmup_delay_ms)).await;
        }

        match self.invoke_channel(kind, self.store.path_for(id, kind)).await {
            Ok(path) => {
                self.total_captures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("[CaptureOrchestrator] {} wrote {:?}", kind.display_name(), path);
                ChannelStatus::Captured(path)
            }
            Err(err) => {
                log_capture_error(&err, "run_channel");
                ChannelStatus::Failed {
                    reason: err.message(),
                }
            }
        }
    }

    async fn invoke_channel(&self, kind: ChannelKind, path: PathBuf) -> Result<PathBuf, CaptureError> {
        let channel_name = kind.display_name().to_string();
        let fault = |reason: String| CaptureError::ChannelFault {
            channel: channel_name.clone(),
            reason,
        };

        let channel = self.channel(kind);
        let target = path.clone();
        let call = tokio::task::spawn_blocking(move || channel.capture_to(&target));

        let timeout_ms = self.config.channel_timeout_ms;
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), call)
            .await
            .map_err(|_| CaptureError::ChannelTimeout {
                channel: channel_name.clone(),
                timeout_ms,
            })?;

        match outcome {
            Err(join_err) if join_err.is_panic() => Err(fault(panic_message(join_err.into_panic()))),
            Err(join_err) => Err(fault(join_err.to_string())),
            Ok(Err(device_fault)) => Err(fault(device_fault.to_string())),
            Ok(Ok(false)) => Err(fault("device reported failure".to_string())),
            Ok(Ok(true)) if !path.exists() => Err(CaptureError::FileMissing {
                path: path.display().to_string(),
            }),
            Ok(Ok(true)) => Ok(path),
        }
    }

    fn finish(&self, session: &CalibrationSession, started: Instant) {
        let duration_ms = started.elapsed().as_millis() as u64;
        if session.success {
            tracing::info!(
                "[CaptureOrchestrator] Session {} captured in {}ms",
                session.id,
                duration_ms
            );
        } else {
            tracing::warn!(
                "[CaptureOrchestrator] Session {} failed: {}",
                session.id,
                session.error.as_deref().unwrap_or("unknown")
            );
        }
        telemetry::hub().record_capture(&session.id, session.success, duration_ms);
    }

    /// Sessions found in the store, most recent first.
    pub fn list_sessions(&self) -> Vec<CalibrationSession> {
        self.store.list()
    }

    pub fn delete(&self, session_id: &str) -> bool {
        self.store.delete(session_id)
    }

    pub fn statistics(&self) -> CaptureStatistics {
        CaptureStatistics::from_sessions(
            &self.store.list(),
            self.total_captures.load(Ordering::Relaxed),
        )
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
