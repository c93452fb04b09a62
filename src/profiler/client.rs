//! Prometheus-backed client request profiler.

use super::{RequestOutcome, RequestProfiler};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during profiler lifecycle operations.
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Records per-request latency and outcome into a Prometheus registry.
///
/// The profiler has its own started/stopped lifecycle, independent of the
/// exporter's: once started it can survive an exporter terminate/initialize
/// cycle, and the exporter only starts it when `is_started()` is false.
/// Events received while stopped are dropped.
pub struct PrometheusRequestProfiler {
    registry: Registry,
    started: AtomicBool,
    request_duration: HistogramVec,
    requests_total: IntCounterVec,
}

impl PrometheusRequestProfiler {
    /// Creates a profiler whose collectors will live in `registry`.
    ///
    /// Collectors are built here but only registered by [`start`](Self::start).
    pub fn new(registry: Registry) -> Result<Self, ProfilerError> {
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "repl_client_request_duration_seconds",
                "Client request latency by destination",
            ),
            &["destination"],
        )?;
        let requests_total = IntCounterVec::new(
            Opts::new(
                "repl_client_requests_total",
                "Client requests by destination and outcome",
            ),
            &["destination", "outcome"],
        )?;

        Ok(Self {
            registry,
            started: AtomicBool::new(false),
            request_duration,
            requests_total,
        })
    }

    /// Registers the profiler's collectors and begins recording.
    pub fn start(&self) -> Result<(), ProfilerError> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        self.registry
            .register(Box::new(self.request_duration.clone()))?;
        self.registry
            .register(Box::new(self.requests_total.clone()))?;
        self.started.store(true, Ordering::Release);
        tracing::info!("Client request profiler started");
        Ok(())
    }

    /// Unregisters the profiler's collectors and stops recording.
    pub fn stop(&self) -> Result<(), ProfilerError> {
        if !self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        self.started.store(false, Ordering::Release);
        self.registry
            .unregister(Box::new(self.request_duration.clone()))?;
        self.registry
            .unregister(Box::new(self.requests_total.clone()))?;
        tracing::info!("Client request profiler stopped");
        Ok(())
    }

    /// Whether the profiler is currently recording.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl RequestProfiler for PrometheusRequestProfiler {
    fn profiling(&self, destination: &str, latency: Duration, outcome: RequestOutcome) {
        if !self.started.load(Ordering::Acquire) {
            return;
        }
        self.request_duration
            .with_label_values(&[destination])
            .observe(latency.as_secs_f64());
        self.requests_total
            .with_label_values(&[destination, outcome.as_label()])
            .inc();
    }
}
