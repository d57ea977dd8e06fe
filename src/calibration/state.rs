// CalibrationState - which calibrations are done and whether one is running
//
// Owned by CalibrationManager behind a RwLock. Completion is tracked per
// kind; the last persisted record is cached for system validation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::parameters::CalibrationParameters;
use super::progress::CalibrationKind;
use crate::error::CalibrationError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Kind of the run currently active, if any
    pub active: Option<CalibrationKind>,
    pub completed: BTreeSet<CalibrationKind>,
    pub last_error: Option<String>,
    pub last_parameters: Option<CalibrationParameters>,
}

impl CalibrationState {
    pub fn is_in_progress(&self) -> bool {
        self.active.is_some()
    }

    /// Mark a run of `kind` as started.
    ///
    /// # Errors
    /// `AlreadyInProgress` if another run is active.
    pub fn begin(&mut self, kind: CalibrationKind) -> Result<(), CalibrationError> {
        if self.active.is_some() {
            return Err(CalibrationError::AlreadyInProgress);
        }
        self.active = Some(kind);
        self.last_error = None;
        Ok(())
    }

    /// Clear the active run.
    ///
    /// # Errors
    /// `NotInProgress` if nothing is running.
    pub fn end(&mut self) -> Result<CalibrationKind, CalibrationError> {
        self.active.take().ok_or(CalibrationError::NotInProgress)
    }

    pub fn is_completed(&self, kind: CalibrationKind) -> bool {
        self.completed.contains(&kind)
    }

    pub fn mark_completed(&mut self, kind: CalibrationKind) {
        self.completed.insert(kind);
    }

    /// Forget completion of `kind`; a component reset also voids `System`.
    pub fn reset(&mut self, kind: CalibrationKind) {
        self.completed.remove(&kind);
        if kind != CalibrationKind::System {
            self.completed.remove(&CalibrationKind::System);
        }
    }

    pub fn completed_kinds(&self) -> Vec<CalibrationKind> {
        self.completed.iter().copied().collect()
    }
}
