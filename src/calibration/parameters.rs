// CalibrationParameters - the persisted result of one estimation run
//
// Records are written as `calibration_<id>.json` next to the capture
// artifacts. There is no index; the newest record is found by scanning.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::progress::CalibrationKind;
use crate::error::CalibrationError;
use crate::estimation::{CalibrationOutcome, CameraEstimate, SensorBaseline, ThermalEstimate};

const RECORD_PREFIX: &str = "calibration_";
const EXPORT_PREFIX: &str = "calibration_export_";
pub const EXPORT_VERSION: &str = "1.0";

/// Parameters produced by one calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub calibration_id: String,
    pub kind: CalibrationKind,
    /// Synchronized time the record was produced (ms)
    pub timestamp_ms: i64,
    /// Capture session the estimates were derived from, if any
    pub session_id: Option<String>,
    pub camera: Option<CalibrationOutcome<CameraEstimate>>,
    pub thermal: Option<CalibrationOutcome<ThermalEstimate>>,
    pub sensor: Option<CalibrationOutcome<SensorBaseline>>,
    /// Mean quality of the outcomes present, in [0,1]
    pub quality: f64,
    /// Every outcome present was accepted
    pub success: bool,
}

impl CalibrationParameters {
    /// Build a record and derive `quality`/`success` from its outcomes.
    pub fn new(
        calibration_id: impl Into<String>,
        kind: CalibrationKind,
        timestamp_ms: i64,
        session_id: Option<String>,
        camera: Option<CalibrationOutcome<CameraEstimate>>,
        thermal: Option<CalibrationOutcome<ThermalEstimate>>,
        sensor: Option<CalibrationOutcome<SensorBaseline>>,
    ) -> Self {
        let results: Vec<(bool, f64)> = [
            camera.as_ref().map(|o| (o.is_success(), o.quality())),
            thermal.as_ref().map(|o| (o.is_success(), o.quality())),
            sensor.as_ref().map(|o| (o.is_success(), o.quality())),
        ]
        .into_iter()
        .flatten()
        .collect();

        let quality = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|(_, q)| q).sum::<f64>() / results.len() as f64
        };
        let success = !results.is_empty() && results.iter().all(|(ok, _)| *ok);

        Self {
            calibration_id: calibration_id.into(),
            kind,
            timestamp_ms,
            session_id,
            camera,
            thermal,
            sensor,
            quality,
            success,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}.json", RECORD_PREFIX, self.calibration_id)
    }

    /// Human-readable reasons of every rejected outcome, joined with "; "
    pub fn failure_summary(&self) -> Option<String> {
        let reasons: Vec<&str> = [
            self.camera.as_ref().and_then(|o| o.message()),
            self.thermal.as_ref().and_then(|o| o.message()),
            self.sensor.as_ref().and_then(|o| o.message()),
        ]
        .into_iter()
        .flatten()
        .collect();
        (!reasons.is_empty()).then(|| reasons.join("; "))
    }
}

/// Bundle written by `ParameterStore::export`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationExport {
    pub export_version: String,
    pub exported_at_ms: i64,
    pub completed: Vec<CalibrationKind>,
    pub last_parameters: Option<CalibrationParameters>,
}

/// JSON records in a flat directory
#[derive(Debug, Clone)]
pub struct ParameterStore {
    dir: PathBuf,
}

fn persistence_error(action: &str, path: &Path, err: impl std::fmt::Display) -> CalibrationError {
    CalibrationError::Persistence {
        details: format!("{} {:?}: {}", action, path, err),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CalibrationError> {
    let json =
        serde_json::to_string_pretty(value).map_err(|err| persistence_error("serialize", path, err))?;
    fs::write(path, json).map_err(|err| persistence_error("write", path, err))
}

impl ParameterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `record` as `calibration_<id>.json`, replacing any previous file.
    pub fn save(&self, record: &CalibrationParameters) -> Result<PathBuf, CalibrationError> {
        fs::create_dir_all(&self.dir).map_err(|err| persistence_error("create", &self.dir, err))?;
        let path = self.dir.join(record.file_name());
        write_json(&path, record)?;
        log::info!("[ParameterStore] Saved calibration record to {:?}", path);
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<CalibrationParameters, CalibrationError> {
        let contents = fs::read_to_string(path).map_err(|err| persistence_error("read", path, err))?;
        serde_json::from_str(&contents).map_err(|err| persistence_error("parse", path, err))
    }

    /// Most recent record by `timestamp_ms`.
    ///
    /// Unparseable records are skipped with a warning; a missing directory
    /// means no record.
    pub fn load_latest(&self) -> Result<Option<CalibrationParameters>, CalibrationError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(persistence_error("list", &self.dir, err)),
        };

        let mut latest: Option<CalibrationParameters> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(RECORD_PREFIX)
                || name.starts_with(EXPORT_PREFIX)
                || !name.ends_with(".json")
            {
                continue;
            }

            match self.load(&path) {
                Ok(record) => {
                    if latest
                        .as_ref()
                        .map_or(true, |best| record.timestamp_ms > best.timestamp_ms)
                    {
                        latest = Some(record);
                    }
                }
                Err(err) => log::warn!("[ParameterStore] Skipping record: {}", err),
            }
        }
        Ok(latest)
    }

    /// Write `calibration_export_<ts>.json` into `dir`.
    pub fn export(
        &self,
        dir: &Path,
        exported_at_ms: i64,
        completed: Vec<CalibrationKind>,
        last_parameters: Option<CalibrationParameters>,
    ) -> Result<PathBuf, CalibrationError> {
        fs::create_dir_all(dir).map_err(|err| persistence_error("create", dir, err))?;
        let bundle = CalibrationExport {
            export_version: EXPORT_VERSION.to_string(),
            exported_at_ms,
            completed,
            last_parameters,
        };
        let path = dir.join(format!("{}{}.json", EXPORT_PREFIX, exported_at_ms));
        write_json(&path, &bundle)?;
        log::info!("[ParameterStore] Exported calibration data to {:?}", path);
        Ok(path)
    }
}
