//! Metric exports over the shared Prometheus registry.
//!
//! Two layers live here: per-instance exports keyed by destination name,
//! added and removed as pipelines stop and start, and baseline
//! process-wide exports registered once at exporter initialize.

mod instance;
mod runtime;

pub use instance::{ExportsError, InstanceExportsRegistry};
pub use runtime::RuntimeExports;
