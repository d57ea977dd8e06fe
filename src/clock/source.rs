use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source in epoch milliseconds.
///
/// Everything that stamps or ages a sync goes through this seam so tests can
/// drive time explicitly.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Default time source backed by `SystemTime::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Deterministic time source for tests and offline tooling.
///
/// Time only moves when [`ManualTimeSource::advance`] or
/// [`ManualTimeSource::set`] is called.
pub struct ManualTimeSource {
    now_ms: AtomicI64,
}

impl ManualTimeSource {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_source_only_moves_when_told() {
        let source = ManualTimeSource::new(5_000);
        assert_eq!(source.now_ms(), 5_000);
        assert_eq!(source.now_ms(), 5_000);

        source.advance(250);
        assert_eq!(source.now_ms(), 5_250);

        source.set(100);
        assert_eq!(source.now_ms(), 100);
    }

    #[test]
    fn system_source_is_after_2020() {
        let source = SystemTimeSource::default();
        assert!(source.now_ms() > 1_577_836_800_000);
    }
}
