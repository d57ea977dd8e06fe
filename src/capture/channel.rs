use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Error raised by an external capture primitive.
pub type ChannelFault = Box<dyn std::error::Error + Send + Sync>;

/// Capture primitive for one imaging channel.
///
/// Implementations write a readable image to `path` and return `Ok(true)`,
/// return `Ok(false)` when the device declined, or `Err` on a device fault.
/// Calls may block; the orchestrator runs them on the blocking pool.
pub trait CaptureChannel: Send + Sync {
    fn capture_to(&self, path: &Path) -> Result<bool, ChannelFault>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Rgb,
    Thermal,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Rgb, ChannelKind::Thermal];

    /// File-name suffix including the extension.
    pub fn suffix(&self) -> &'static str {
        match self {
            ChannelKind::Rgb => "_rgb.jpg",
            ChannelKind::Thermal => "_thermal.png",
        }
    }

    pub fn file_name(&self, session_id: &str) -> String {
        format!("{}{}", session_id, self.suffix())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ChannelKind::Rgb => "RGB",
            ChannelKind::Thermal => "Thermal",
        }
    }

    /// Split `<id>_rgb.jpg` / `<id>_thermal.png` into id and channel.
    pub fn parse_file_name(file_name: &str) -> Option<(&str, ChannelKind)> {
        Self::ALL.iter().find_map(|kind| {
            file_name
                .strip_suffix(kind.suffix())
                .filter(|id| !id.is_empty())
                .map(|id| (id, *kind))
        })
    }
}

/// Outcome of one channel within a capture request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelStatus {
    NotRequested,
    Captured(PathBuf),
    Failed { reason: String },
}

impl ChannelStatus {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ChannelStatus::Captured(path) => Some(path),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            ChannelStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}
