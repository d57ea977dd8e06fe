// CalibrationManager: Focused manager for calibration workflow
//
// Single Responsibility: Calibration runs and state management
// Drives capture -> estimation -> record on top of the core components

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio_stream::wrappers::BroadcastStream;

use super::broadcast_manager::BroadcastChannelManager;
use crate::calibration::{
    CalibrationKind, CalibrationParameters, CalibrationProgress, CalibrationState, CalibrationStep,
    ParameterStore,
};
use crate::capture::{CalibrationSession, CaptureOrchestrator};
use crate::clock::ClockSynchronizer;
use crate::error::{log_calibration_error, CalibrationError, ErrorCode};
use crate::estimation::{ParameterEstimator, SensorStream};
use crate::telemetry::{self, DiagnosticError};

/// Minimum quality of the last record for the system check to pass
pub const SYSTEM_QUALITY_THRESHOLD: f64 = 0.5;

/// Parameters of a full capture-and-estimate run
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRequest {
    pub capture_rgb: bool,
    pub capture_thermal: bool,
    pub high_resolution: bool,
    /// Explicit record id, or `None` to generate one
    pub calibration_id: Option<String>,
}

impl Default for CalibrationRequest {
    fn default() -> Self {
        Self {
            capture_rgb: true,
            capture_thermal: true,
            high_resolution: false,
            calibration_id: None,
        }
    }
}

impl CalibrationRequest {
    /// Kind the run is recorded under
    fn kind(&self) -> CalibrationKind {
        if self.capture_rgb {
            CalibrationKind::Camera
        } else {
            CalibrationKind::Thermal
        }
    }
}

/// Manages calibration runs and calibration state
///
/// This manager handles:
/// - Full runs (capture, camera estimation, thermal estimation, finalise)
/// - Single-component runs for camera, thermal and sensor
/// - System validation once every component is calibrated
/// - Record persistence and export
/// - Progress fan-out over a broadcast channel
///
/// Only one run is active at a time. `stop_calibration` abandons the active
/// run; it notices at the next step boundary and returns `NotInProgress`.
///
/// # Example
/// ```ignore
/// let manager = CalibrationManager::new(clock, orchestrator, estimator);
/// let mut progress = manager.subscribe_progress();
/// let record = manager.run_calibration(CalibrationRequest::default()).await?;
/// ```
pub struct CalibrationManager {
    clock: Arc<ClockSynchronizer>,
    orchestrator: Arc<CaptureOrchestrator>,
    estimator: Arc<ParameterEstimator>,
    sensor: Option<Arc<dyn SensorStream>>,
    store: ParameterStore,
    state: Arc<RwLock<CalibrationState>>,
    channels: BroadcastChannelManager,
    /// Bumped on every begin and stop; a run is live while it matches
    generation: AtomicU64,
    run_counter: AtomicU64,
}

impl CalibrationManager {
    /// Create a manager that stores records next to the capture artifacts.
    pub fn new(
        clock: Arc<ClockSynchronizer>,
        orchestrator: Arc<CaptureOrchestrator>,
        estimator: Arc<ParameterEstimator>,
    ) -> Self {
        let channels = BroadcastChannelManager::new();
        channels.init_calibration();
        channels.init_sessions();

        Self {
            store: ParameterStore::new(orchestrator.store().dir()),
            clock,
            orchestrator,
            estimator,
            sensor: None,
            state: Arc::new(RwLock::new(CalibrationState::default())),
            channels,
            generation: AtomicU64::new(0),
            run_counter: AtomicU64::new(0),
        }
    }

    /// Attach the physiological sensor used by `run_sensor_calibration`.
    pub fn with_sensor(mut self, sensor: Arc<dyn SensorStream>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn parameter_store(&self) -> &ParameterStore {
        &self.store
    }

    // ========================================================================
    // RUNS
    // ========================================================================

    /// Run a full calibration: capture, estimate camera and thermal
    /// parameters, then persist the record.
    ///
    /// # Arguments
    /// * `request` - Channels to capture and estimation options
    ///
    /// # Returns
    /// * `Ok(CalibrationParameters)` - The saved record. Check `success`:
    ///   low-quality estimates are recorded too, but only accepted outcomes
    ///   mark their kind completed.
    /// * `Err(CalibrationError)` - Run could not produce a record
    ///
    /// # Errors
    /// - `AlreadyInProgress` if another run is active
    /// - `CaptureFailed` if the capture session failed
    /// - `NotInProgress` if the run was stopped
    /// - `Persistence` if the record could not be written
    pub async fn run_calibration(
        &self,
        request: CalibrationRequest,
    ) -> Result<CalibrationParameters, CalibrationError> {
        let kind = request.kind();
        self.guarded(kind, |generation| self.full_run(request, kind, generation))
            .await
    }

    async fn full_run(
        &self,
        request: CalibrationRequest,
        kind: CalibrationKind,
        generation: u64,
    ) -> Result<CalibrationParameters, CalibrationError> {
        let calibration_id = request
            .calibration_id
            .clone()
            .unwrap_or_else(|| self.next_calibration_id());
        tracing::info!(
            "[CalibrationManager] Starting calibration {} (rgb={}, thermal={}, high_res={})",
            calibration_id,
            request.capture_rgb,
            request.capture_thermal,
            request.high_resolution
        );

        self.publish_step(&calibration_id, CalibrationStep::Capture);
        let session = self
            .orchestrator
            .capture(None, request.capture_rgb, request.capture_thermal)
            .await;
        self.channels.publish_session(session.clone());
        if !session.success {
            return Err(CalibrationError::CaptureFailed {
                details: session
                    .error
                    .unwrap_or_else(|| format!("session {} failed", session.id)),
            });
        }
        self.check_live(generation)?;

        self.publish_step(&calibration_id, CalibrationStep::CameraEstimation);
        let camera = match session.rgb_file.clone() {
            Some(rgb) => {
                let thermal = session.thermal_file.clone();
                let high_res = request.high_resolution;
                Some(
                    self.estimate_blocking("camera estimation", move |estimator| {
                        estimator.estimate_camera_parameters(Some(rgb.as_path()), thermal.as_deref(), high_res)
                    })
                    .await?,
                )
            }
            None => None,
        };
        self.check_live(generation)?;

        self.publish_step(&calibration_id, CalibrationStep::ThermalEstimation);
        let thermal = match session.thermal_file.clone() {
            Some(path) => Some(
                self.estimate_blocking("thermal estimation", move |estimator| {
                    estimator.estimate_thermal_parameters(Some(path.as_path()))
                })
                .await?,
            ),
            None => None,
        };
        self.check_live(generation)?;

        self.publish_step(&calibration_id, CalibrationStep::Finalise);
        let record = CalibrationParameters::new(
            calibration_id,
            kind,
            self.clock.current_synced_timestamp(),
            Some(session.id),
            camera,
            thermal,
            None,
        );
        self.commit(record)
    }

    /// Estimate camera parameters from existing images and record them.
    ///
    /// # Errors
    /// - `AlreadyInProgress` if another run is active
    /// - `Persistence` if the record could not be written
    pub async fn run_camera_calibration(
        &self,
        rgb: &Path,
        thermal: Option<&Path>,
        high_res: bool,
    ) -> Result<CalibrationParameters, CalibrationError> {
        let rgb = rgb.to_path_buf();
        let thermal = thermal.map(Path::to_path_buf);
        self.guarded(CalibrationKind::Camera, |generation| async move {
            let outcome = self
                .estimate_blocking("camera estimation", move |estimator| {
                    estimator.estimate_camera_parameters(Some(rgb.as_path()), thermal.as_deref(), high_res)
                })
                .await?;
            self.check_live(generation)?;
            let record = CalibrationParameters::new(
                self.next_calibration_id(),
                CalibrationKind::Camera,
                self.clock.current_synced_timestamp(),
                None,
                Some(outcome),
                None,
                None,
            );
            self.commit(record)
        })
        .await
    }

    /// Estimate thermal parameters from an existing image and record them.
    ///
    /// # Errors
    /// - `AlreadyInProgress` if another run is active
    /// - `Persistence` if the record could not be written
    pub async fn run_thermal_calibration(
        &self,
        thermal: &Path,
    ) -> Result<CalibrationParameters, CalibrationError> {
        let path = thermal.to_path_buf();
        self.guarded(CalibrationKind::Thermal, |generation| async move {
            let outcome = self
                .estimate_blocking("thermal estimation", move |estimator| {
                    estimator.estimate_thermal_parameters(Some(path.as_path()))
                })
                .await?;
            self.check_live(generation)?;
            let record = CalibrationParameters::new(
                self.next_calibration_id(),
                CalibrationKind::Thermal,
                self.clock.current_synced_timestamp(),
                None,
                None,
                Some(outcome),
                None,
            );
            self.commit(record)
        })
        .await
    }

    /// Measure the sensor baseline (simulated when no sensor is attached).
    ///
    /// # Errors
    /// - `AlreadyInProgress` if another run is active
    /// - `Persistence` if the record could not be written
    pub async fn run_sensor_calibration(&self) -> Result<CalibrationParameters, CalibrationError> {
        self.guarded(CalibrationKind::Sensor, |generation| async move {
            let outcome = self
                .estimator
                .estimate_sensor_baseline(self.sensor.as_deref())
                .await;
            self.check_live(generation)?;
            let record = CalibrationParameters::new(
                self.next_calibration_id(),
                CalibrationKind::Sensor,
                self.clock.current_synced_timestamp(),
                None,
                None,
                None,
                Some(outcome),
            );
            self.commit(record)
        })
        .await
    }

    /// Mark the system calibrated once camera, thermal and sensor are done
    /// and the last record is good enough.
    ///
    /// # Returns
    /// * `Ok(true)` - System marked completed
    /// * `Ok(false)` - A component is missing or the last record is too weak
    ///
    /// # Errors
    /// - Lock poisoning on calibration state
    pub fn validate_system_calibration(&self) -> Result<bool, CalibrationError> {
        let mut state = self.write_state()?;

        let missing: Vec<&str> = [
            CalibrationKind::Camera,
            CalibrationKind::Thermal,
            CalibrationKind::Sensor,
        ]
        .into_iter()
        .filter(|kind| !state.is_completed(*kind))
        .map(|kind| kind.display_name())
        .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "[CalibrationManager] System validation failed, not calibrated: {}",
                missing.join(", ")
            );
            return Ok(false);
        }

        let quality = state.last_parameters.as_ref().map_or(0.0, |p| p.quality);
        if quality < SYSTEM_QUALITY_THRESHOLD {
            tracing::warn!(
                "[CalibrationManager] System validation failed, last record quality {:.3}",
                quality
            );
            return Ok(false);
        }

        state.mark_completed(CalibrationKind::System);
        telemetry::hub().record_calibration(CalibrationKind::System, quality, true);
        tracing::info!("[CalibrationManager] System calibration validated");
        Ok(true)
    }

    /// Abandon the active run.
    ///
    /// # Errors
    /// - `NotInProgress` if nothing is running
    pub fn stop_calibration(&self) -> Result<(), CalibrationError> {
        let mut state = self.write_state()?;
        let kind = state.end().inspect_err(|err| {
            log_calibration_error(err, "stop_calibration");
        })?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::info!("[CalibrationManager] Stopped {} calibration", kind.display_name());
        Ok(())
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn reset_calibration(&self, kind: CalibrationKind) -> Result<(), CalibrationError> {
        self.write_state()?.reset(kind);
        tracing::info!("[CalibrationManager] Reset {} calibration", kind.display_name());
        Ok(())
    }

    pub fn clear_error(&self) -> Result<(), CalibrationError> {
        self.write_state()?.last_error = None;
        Ok(())
    }

    pub fn is_completed(&self, kind: CalibrationKind) -> Result<bool, CalibrationError> {
        Ok(self.read_state()?.is_completed(kind))
    }

    /// Snapshot of the calibration state
    ///
    /// # Errors
    /// - Lock poisoning on calibration state
    pub fn state(&self) -> Result<CalibrationState, CalibrationError> {
        let state_guard = self.read_state().inspect_err(|err| {
            log_calibration_error(err, "state");
        })?;
        Ok(state_guard.clone())
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Write `record` as `calibration_<id>.json` in the calibration directory.
    pub fn save_parameters(&self, record: &CalibrationParameters) -> Result<PathBuf, CalibrationError> {
        self.store.save(record).inspect_err(|err| {
            log_calibration_error(err, "save_parameters");
        })
    }

    /// Load the most recent record and restore it as the last record.
    ///
    /// Kinds whose outcome in that record was accepted are marked completed.
    pub fn load_latest(&self) -> Result<Option<CalibrationParameters>, CalibrationError> {
        let latest = self.store.load_latest().inspect_err(|err| {
            log_calibration_error(err, "load_latest");
        })?;

        if let Some(record) = &latest {
            let mut state = self.write_state()?;
            mark_accepted(&mut state, record);
            state.last_parameters = Some(record.clone());
            tracing::info!(
                "[CalibrationManager] Restored calibration {} (quality {:.3})",
                record.calibration_id,
                record.quality
            );
        }
        Ok(latest)
    }

    /// Write `calibration_export_<ts>.json` into `dir`.
    pub fn export_all(&self, dir: &Path) -> Result<PathBuf, CalibrationError> {
        let state = self.state()?;
        self.store
            .export(
                dir,
                self.clock.current_synced_timestamp(),
                state.completed_kinds(),
                state.last_parameters,
            )
            .inspect_err(|err| {
                log_calibration_error(err, "export_all");
            })
    }

    // ========================================================================
    // STREAMS
    // ========================================================================

    /// Step progress of every run started after subscribing
    pub fn subscribe_progress(&self) -> BroadcastStream<CalibrationProgress> {
        let rx = self
            .channels
            .subscribe_calibration()
            .unwrap_or_else(|| self.channels.init_calibration().subscribe());
        BroadcastStream::new(rx)
    }

    /// Capture sessions produced by full runs
    pub fn subscribe_sessions(&self) -> BroadcastStream<CalibrationSession> {
        let rx = self
            .channels
            .subscribe_sessions()
            .unwrap_or_else(|| self.channels.init_sessions().subscribe());
        BroadcastStream::new(rx)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Begin a run of `kind`, drive `run`, then release the run slot.
    async fn guarded<F, Fut>(
        &self,
        kind: CalibrationKind,
        run: F,
    ) -> Result<CalibrationParameters, CalibrationError>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<CalibrationParameters, CalibrationError>>,
    {
        let generation = {
            let mut state = self.write_state()?;
            state.begin(kind).inspect_err(|err| {
                log_calibration_error(err, "begin_calibration");
            })?;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let mut result = run(generation).await;

        let mut state = self.write_state()?;
        // Stopped runs were already ended by stop_calibration
        if self.generation.load(Ordering::SeqCst) == generation {
            if let Err(err) = state.end() {
                log_calibration_error(&err, "end_calibration");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        if let Err(err) = &result {
            log_calibration_error(err, kind.display_name());
            state.last_error = Some(err.message());
        }
        result
    }

    fn check_live(&self, generation: u64) -> Result<(), CalibrationError> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            tracing::info!("[CalibrationManager] Run abandoned after stop");
            Err(CalibrationError::NotInProgress)
        }
    }

    async fn estimate_blocking<T, F>(&self, context: &str, job: F) -> Result<T, CalibrationError>
    where
        T: Send + 'static,
        F: FnOnce(&ParameterEstimator) -> T + Send + 'static,
    {
        let estimator = Arc::clone(&self.estimator);
        tokio::task::spawn_blocking(move || job(&estimator))
            .await
            .map_err(|err| CalibrationError::EstimationFailed {
                details: format!("{} task failed: {}", context, err),
            })
    }

    /// Save `record`, publish it, and fold it into the state.
    fn commit(&self, record: CalibrationParameters) -> Result<CalibrationParameters, CalibrationError> {
        self.save_parameters(&record)?;
        telemetry::hub().record_calibration(record.kind, record.quality, record.success);

        let mut state = self.write_state()?;
        mark_accepted(&mut state, &record);
        if record.success {
            tracing::info!(
                "[CalibrationManager] Calibration {} succeeded (quality {:.3})",
                record.calibration_id,
                record.quality
            );
        } else {
            let summary = record
                .failure_summary()
                .unwrap_or_else(|| "no estimates produced".to_string());
            tracing::warn!(
                "[CalibrationManager] Calibration {} rejected: {}",
                record.calibration_id,
                summary
            );
            telemetry::hub().record_error(DiagnosticError::EstimationFailed, summary.clone());
            state.last_error = Some(summary);
        }
        state.last_parameters = Some(record.clone());
        Ok(record)
    }

    fn publish_step(&self, calibration_id: &str, step: CalibrationStep) {
        let progress = CalibrationProgress::new(calibration_id, step);
        tracing::debug!(
            "[CalibrationManager] {} step {}/{}: {}",
            calibration_id,
            progress.step_number,
            progress.total_steps,
            progress.message
        );
        self.channels.publish_progress(progress);
    }

    fn next_calibration_id(&self) -> String {
        let counter = self.run_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("run_{}_{}", self.clock.now_ms(), counter)
    }

    // Lock helper methods

    fn read_state(&self) -> Result<RwLockReadGuard<'_, CalibrationState>, CalibrationError> {
        self.state
            .read()
            .map_err(|_| CalibrationError::StatePoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, CalibrationState>, CalibrationError> {
        self.state
            .write()
            .map_err(|_| CalibrationError::StatePoisoned)
    }
}

fn mark_accepted(state: &mut CalibrationState, record: &CalibrationParameters) {
    if record.camera.as_ref().is_some_and(|o| o.is_success()) {
        state.mark_completed(CalibrationKind::Camera);
    }
    if record.thermal.as_ref().is_some_and(|o| o.is_success()) {
        state.mark_completed(CalibrationKind::Thermal);
    }
    if record.sensor.as_ref().is_some_and(|o| o.is_success()) {
        state.mark_completed(CalibrationKind::Sensor);
    }
}
