//! Client request profiling.
//!
//! The host service calls the currently installed profiler once per
//! client request. The profiler is swapped at exporter initialize and
//! terminate time through a shared [`ProfilerSlot`]; every other caller
//! only reads the current value, so a request that races with a swap may
//! be recorded against the previous profiler. That staleness is
//! tolerated by design.

mod client;
mod slot;

pub use client::{PrometheusRequestProfiler, ProfilerError};
pub use slot::{NopProfiler, ProfilerSlot};

use std::time::Duration;

/// Outcome of one client request, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Request completed normally.
    Success,
    /// Request failed or was rejected.
    Error,
}

impl RequestOutcome {
    /// Label value used in exported metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::Error => "error",
        }
    }
}

/// Per-request profiling hook.
///
/// Invoked by the host service on its request-handling path; it must
/// never block beyond the metric primitives' own atomics.
pub trait RequestProfiler: Send + Sync {
    /// Records one finished client request.
    fn profiling(&self, destination: &str, latency: Duration, outcome: RequestOutcome);
}
