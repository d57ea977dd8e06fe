// Calibration sessions and the flat file store they live in
//
// There is no manifest: a session is whatever `<id>_rgb.jpg` and
// `<id>_thermal.png` files share a base id in the capture directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use super::channel::{ChannelKind, ChannelStatus};
use crate::error::CaptureError;

/// One capture request and where its artifacts ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    pub id: String,
    pub rgb_file: Option<PathBuf>,
    pub thermal_file: Option<PathBuf>,
    /// Local capture time (ms)
    pub timestamp_ms: i64,
    /// Capture time in the reference timebase (ms)
    pub synced_timestamp_ms: i64,
    pub success: bool,
    pub error: Option<String>,
}

/// Which artifacts a session holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureCoverage {
    Complete,
    RgbOnly,
    ThermalOnly,
    Empty,
}

impl CalibrationSession {
    /// Aggregate the per-channel outcomes of one request.
    ///
    /// Succeeds only if nothing failed and at least one channel captured.
    /// Failure reasons are joined with `"; "`.
    pub fn from_channels(
        id: String,
        timestamp_ms: i64,
        synced_timestamp_ms: i64,
        rgb: &ChannelStatus,
        thermal: &ChannelStatus,
    ) -> Self {
        let failures: Vec<&str> = [rgb, thermal]
            .iter()
            .filter_map(|status| status.failure())
            .collect();

        let captured_any = rgb.path().is_some() || thermal.path().is_some();
        let success = failures.is_empty() && captured_any;
        let error = if !failures.is_empty() {
            Some(failures.join("; "))
        } else if !captured_any {
            Some(CaptureError::NoChannelRequested.to_string())
        } else {
            None
        };

        Self {
            id,
            rgb_file: rgb.path().map(Path::to_path_buf),
            thermal_file: thermal.path().map(Path::to_path_buf),
            timestamp_ms,
            synced_timestamp_ms,
            success,
            error,
        }
    }

    /// Failed session that never reached the channels.
    pub fn rejected(id: String, timestamp_ms: i64, synced_timestamp_ms: i64, err: &CaptureError) -> Self {
        Self {
            id,
            rgb_file: None,
            thermal_file: None,
            timestamp_ms,
            synced_timestamp_ms,
            success: false,
            error: Some(err.to_string()),
        }
    }

    pub fn coverage(&self) -> CaptureCoverage {
        match (self.rgb_file.is_some(), self.thermal_file.is_some()) {
            (true, true) => CaptureCoverage::Complete,
            (true, false) => CaptureCoverage::RgbOnly,
            (false, true) => CaptureCoverage::ThermalOnly,
            (false, false) => CaptureCoverage::Empty,
        }
    }

    /// Number of channel artifacts the session holds.
    pub fn captured_channels(&self) -> u64 {
        self.rgb_file.is_some() as u64 + self.thermal_file.is_some() as u64
    }
}

/// Aggregate counts over the store plus the process-wide capture counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStatistics {
    pub total_sessions: usize,
    pub complete_sessions: usize,
    pub rgb_only_sessions: usize,
    pub thermal_only_sessions: usize,
    pub total_captures: u64,
}

impl CaptureStatistics {
    pub fn from_sessions(sessions: &[CalibrationSession], total_captures: u64) -> Self {
        let count = |coverage: CaptureCoverage| {
            sessions
                .iter()
                .filter(|s| s.coverage() == coverage)
                .count()
        };
        Self {
            total_sessions: sessions.len(),
            complete_sessions: count(CaptureCoverage::Complete),
            rgb_only_sessions: count(CaptureCoverage::RgbOnly),
            thermal_only_sessions: count(CaptureCoverage::ThermalOnly),
            total_captures,
        }
    }

    /// Statistics for a store read from disk, where the capture count is
    /// the number of channel artifacts found.
    pub fn from_store(sessions: &[CalibrationSession]) -> Self {
        let captured = sessions.iter().map(CalibrationSession::captured_channels).sum();
        Self::from_sessions(sessions, captured)
    }
}

#[derive(Default)]
struct DiscoveredSession {
    rgb: Option<PathBuf>,
    thermal: Option<PathBuf>,
    modified_ms: i64,
}

/// Flat directory of capture artifacts.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), CaptureError> {
        fs::create_dir_all(&self.dir).map_err(|err| CaptureError::StoreIo {
            details: format!("create {:?}: {}", self.dir, err),
        })
    }

    pub fn path_for(&self, session_id: &str, kind: ChannelKind) -> PathBuf {
        self.dir.join(kind.file_name(session_id))
    }

    /// True if any artifact for `session_id` exists.
    pub fn has_artifacts(&self, session_id: &str) -> bool {
        ChannelKind::ALL
            .iter()
            .any(|kind| self.path_for(session_id, *kind).exists())
    }

    /// Sessions rebuilt from file names, newest modification first.
    ///
    /// An unreadable directory yields an empty list.
    pub fn list(&self) -> Vec<CalibrationSession> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("[SessionStore] Cannot read {:?}: {}", self.dir, err);
                return Vec::new();
            }
        };

        let mut grouped: HashMap<String, DiscoveredSession> = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((id, kind)) = ChannelKind::parse_file_name(file_name) else {
                continue;
            };

            let modified_ms = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_millis() as i64)
                .unwrap_or(0);

            let session = grouped.entry(id.to_string()).or_default();
            session.modified_ms = session.modified_ms.max(modified_ms);
            match kind {
                ChannelKind::Rgb => session.rgb = Some(path.clone()),
                ChannelKind::Thermal => session.thermal = Some(path.clone()),
            }
        }

        let mut sessions: Vec<CalibrationSession> = grouped
            .into_iter()
            .map(|(id, found)| CalibrationSession {
                id,
                rgb_file: found.rgb,
                thermal_file: found.thermal,
                timestamp_ms: found.modified_ms,
                synced_timestamp_ms: found.modified_ms,
                success: true,
                error: None,
            })
            .collect();

        sessions.sort_by(|a, b| {
            b.timestamp_ms
                .cmp(&a.timestamp_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        sessions
    }

    pub fn find(&self, session_id: &str) -> Option<CalibrationSession> {
        self.list().into_iter().find(|s| s.id == session_id)
    }

    /// Remove every artifact of `session_id`; true if anything was removed.
    pub fn delete(&self, session_id: &str) -> bool {
        let mut removed = false;
        for kind in ChannelKind::ALL {
            let path = self.path_for(session_id, kind);
            if !path.exists() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(err) => {
                    tracing::warn!("[SessionStore] Failed to delete {:?}: {}", path, err)
                }
            }
        }
        if removed {
            tracing::info!("[SessionStore] Deleted session {}", session_id);
        }
        removed
    }
}
