//! Baseline process-wide exports.
//!
//! Generic runtime metrics registered once at exporter initialize,
//! independent of any replication instance: process start time, uptime,
//! and build information.

use super::ExportsError;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, IntGauge, Opts, Registry};
use std::time::Instant;

/// Gauge that reports seconds elapsed since exporter construction,
/// computed at gather time.
#[derive(Clone)]
struct UptimeCollector {
    gauge: Gauge,
    start: Instant,
}

impl UptimeCollector {
    fn new() -> Result<Self, ExportsError> {
        let gauge = Gauge::new(
            "repl_exporter_uptime_seconds",
            "Seconds since the exporter process started",
        )?;
        Ok(Self {
            gauge,
            start: Instant::now(),
        })
    }
}

impl Collector for UptimeCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gauge.set(self.start.elapsed().as_secs_f64());
        self.gauge.collect()
    }
}

/// Baseline runtime exports for the whole process.
pub struct RuntimeExports {
    registry: Registry,
    start_time: Gauge,
    build_info: IntGauge,
    uptime: UptimeCollector,
}

impl RuntimeExports {
    /// Creates the baseline exports over `registry`.
    ///
    /// Nothing is registered until [`initialize`](Self::initialize).
    pub fn new(registry: Registry) -> Result<Self, ExportsError> {
        let start_time = Gauge::new(
            "repl_exporter_start_time_seconds",
            "Unix time at which the exporter process started",
        )?;
        let build_info = IntGauge::with_opts(
            Opts::new("repl_exporter_build_info", "Exporter build information")
                .const_label("version", env!("CARGO_PKG_VERSION")),
        )?;
        Ok(Self {
            registry,
            start_time,
            build_info,
            uptime: UptimeCollector::new()?,
        })
    }

    /// Registers the baseline collectors and sets their static values.
    ///
    /// Collectors left registered by a previous initialize cycle are
    /// tolerated, so terminate/initialize round trips stay clean.
    pub fn initialize(&self) -> Result<(), ExportsError> {
        Self::register_tolerant(&self.registry, Box::new(self.start_time.clone()))?;
        Self::register_tolerant(&self.registry, Box::new(self.build_info.clone()))?;
        Self::register_tolerant(&self.registry, Box::new(self.uptime.clone()))?;

        self.start_time.set(chrono::Utc::now().timestamp() as f64);
        self.build_info.set(1);
        Ok(())
    }

    fn register_tolerant(
        registry: &Registry,
        collector: Box<dyn Collector>,
    ) -> Result<(), ExportsError> {
        match registry.register(collector) {
            Ok(()) => Ok(()),
            Err(prometheus::Error::AlreadyReg) => {
                tracing::debug!("Baseline collector already registered");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
