//! Clock synchronization against a caller-supplied reference clock.
//!
//! [`ClockSynchronizer`] keeps a small window of NTP-style round trips,
//! filters outliers, tracks drift, and exposes a single committed
//! [`SyncState`] that the rest of the crate reads to stamp captures.

mod sample;
mod source;
mod synchronizer;

pub use sample::{filter_outliers, weighted_offset, ClockSample, SyncQualityMetrics};
pub use source::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use synchronizer::{ClockSynchronizer, SyncState, SyncStatus};
