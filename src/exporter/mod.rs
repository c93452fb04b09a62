//! Exporter lifecycle and HTTP endpoint host.
//!
//! [`ExporterService`] is the state machine the host service drives:
//! configure a port, `initialize`, register/unregister instances as they
//! stop and start, `terminate`. [`EndpointHost`] is the bound listener
//! serving `/metrics` and `/health`, owned exclusively by the service.

mod server;
mod service;

pub use server::{EndpointHost, EndpointError};
pub use service::{ExporterBuildError, ExporterService};
