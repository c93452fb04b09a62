//! Replication instance handle.
//!
//! The exporter never owns or drives a replication pipeline; it only
//! observes a stable destination identifier and a running flag. This
//! module defines that read-only capability, plus a mock implementation
//! for tests and demos.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read-only view of one replication pipeline.
///
/// Implemented by the host service's instance objects; the exporter
/// queries it during `register`/`unregister` and never mutates it.
pub trait ReplicationInstance {
    /// Unique destination name identifying this pipeline.
    fn destination(&self) -> &str;

    /// Whether the pipeline is currently running.
    fn is_running(&self) -> bool;
}

/// Mock instance with a toggleable running flag.
#[derive(Debug, Clone)]
pub struct MockInstance {
    destination: String,
    running: Arc<AtomicBool>,
}

impl MockInstance {
    /// Creates a stopped mock instance for the given destination.
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flips the running flag.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

impl ReplicationInstance for MockInstance {
    fn destination(&self) -> &str {
        &self.destination
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
