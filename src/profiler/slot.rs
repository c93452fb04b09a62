//! Shared slot holding the active request profiler.

use super::{RequestOutcome, RequestProfiler};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Profiler whose hook performs no work.
///
/// The safe default while no real profiler is installed.
#[derive(Debug, Default)]
pub struct NopProfiler;

impl RequestProfiler for NopProfiler {
    fn profiling(&self, _destination: &str, _latency: Duration, _outcome: RequestOutcome) {}
}

/// Process-wide reference to the currently active profiler.
///
/// Exactly one writer installs a value (exporter initialize) and one
/// resets it (exporter terminate); request-path callers only read.
/// Writes happen only during lifecycle transitions, so a plain RwLock
/// around the `Arc` is sufficient; a reader that observes the previous
/// profiler during a swap is acceptable.
pub struct ProfilerSlot {
    current: RwLock<Arc<dyn RequestProfiler>>,
    noop: Arc<dyn RequestProfiler>,
}

impl ProfilerSlot {
    /// Creates a slot holding the no-op profiler.
    pub fn new() -> Self {
        let noop: Arc<dyn RequestProfiler> = Arc::new(NopProfiler);
        Self {
            current: RwLock::new(Arc::clone(&noop)),
            noop,
        }
    }

    /// Installs `profiler` as the active hook.
    pub fn install(&self, profiler: Arc<dyn RequestProfiler>) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        *slot = profiler;
        tracing::debug!("Request profiler installed");
    }

    /// Resets the slot back to the no-op profiler.
    ///
    /// Safe to call even if nothing was ever installed.
    pub fn reset(&self) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::clone(&self.noop);
        tracing::debug!("Request profiler reset to no-op");
    }

    /// Returns the currently active profiler.
    pub fn current(&self) -> Arc<dyn RequestProfiler> {
        let slot = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&slot)
    }

    /// Whether the slot currently holds the no-op profiler.
    pub fn is_noop(&self) -> bool {
        let slot = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::ptr_eq(&slot, &self.noop)
    }

    /// Records a request against whatever profiler is installed right now.
    pub fn profiling(&self, destination: &str, latency: Duration, outcome: RequestOutcome) {
        self.current().profiling(destination, latency, outcome);
    }
}

impl Default for ProfilerSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingProfiler {
        calls: AtomicU64,
    }

    impl RequestProfiler for CountingProfiler {
        fn profiling(&self, _destination: &str, _latency: Duration, _outcome: RequestOutcome) {
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_defaults_to_noop() {
        let slot = ProfilerSlot::new();
        assert!(slot.is_noop());
        // No-op hook must accept events without effect.
        slot.profiling("dest", Duration::from_millis(1), RequestOutcome::Success);
        assert!(slot.is_noop());
    }

    #[test]
    fn test_install_and_reset() {
        let slot = ProfilerSlot::new();
        let profiler = Arc::new(CountingProfiler::default());

        slot.install(profiler.clone());
        assert!(!slot.is_noop());

        slot.profiling("dest", Duration::from_millis(2), RequestOutcome::Error);
        assert_eq!(profiler.calls.load(Ordering::Relaxed), 1);

        slot.reset();
        assert!(slot.is_noop());

        // Events after reset no longer reach the old profiler.
        slot.profiling("dest", Duration::from_millis(2), RequestOutcome::Success);
        assert_eq!(profiler.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_reset_without_install_is_safe() {
        let slot = ProfilerSlot::new();
        slot.reset();
        assert!(slot.is_noop());
    }
}
