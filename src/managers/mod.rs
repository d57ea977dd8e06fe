// Managers Module
//
// Workflow layer over the core components.
//
// Each manager handles one specific concern:
// - CalibrationManager: Calibration runs, state and record persistence
// - BroadcastChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;
pub mod calibration_manager;

pub use broadcast_manager::BroadcastChannelManager;
pub use calibration_manager::{CalibrationManager, CalibrationRequest, SYSTEM_QUALITY_THRESHOLD};
