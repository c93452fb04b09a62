//! Replication Metrics Exporter
//!
//! Embedded Prometheus metrics and health exporter for a data-replication
//! service managing multiple logical instances (pipelines identified by a
//! destination name).
//!
//! # Architecture
//!
//! ```text
//! host control thread ──> exporter (lifecycle) ──> endpoint host (/metrics, /health)
//!        │                       │
//!        │                 instance exports registry
//!        │                       │
//! request path ──> profiler slot ──> client request profiler
//! ```
//!
//! # Design Principles
//!
//! - **Observability must not threaten availability**: no exporter
//!   operation ever returns an error to the host; failures end in logs
//! - **Running means bound**: the running flag reflects only that the
//!   scrape/health socket is bound, not that every sub-export succeeded
//! - **Swap without locking the request path**: the profiling hook is a
//!   shared slot read per request; stale reads during a swap are tolerated
//!
//! # Example
//!
//! ```no_run
//! use repl_metrics::{ExporterService, MockInstance};
//!
//! let mut exporter = ExporterService::new().unwrap();
//! exporter.set_server_port(9100);
//! exporter.initialize();
//! assert!(exporter.is_running());
//!
//! // Register metrics for a stopped pipeline before starting it.
//! let instance = MockInstance::new("orders-db");
//! exporter.register(&instance);
//! instance.set_running(true);
//!
//! // ... pipeline runs, /metrics and /health are scrapeable ...
//!
//! instance.set_running(false);
//! exporter.unregister(&instance);
//! exporter.terminate();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod exporter;
pub mod exports;
pub mod instance;
pub mod profiler;

// Re-export commonly used types at crate root
pub use exporter::{EndpointHost, ExporterBuildError, ExporterService};
pub use exports::{ExportsError, InstanceExportsRegistry, RuntimeExports};
pub use instance::{MockInstance, ReplicationInstance};
pub use profiler::{
    NopProfiler, PrometheusRequestProfiler, ProfilerSlot, RequestOutcome, RequestProfiler,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
