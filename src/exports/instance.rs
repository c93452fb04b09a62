//! Per-instance metric registration.

use crate::instance::ReplicationInstance;
use prometheus::{Encoder, IntGauge, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur during exports operations.
#[derive(Debug, Error)]
pub enum ExportsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Collectors registered for one destination.
///
/// The exporter does not compute replication metrics itself; the handle
/// only has to make the destination visible on the scrape endpoint while
/// it is registered.
struct InstanceExports {
    up: IntGauge,
    registered_at: IntGauge,
}

impl InstanceExports {
    fn new(destination: &str) -> Result<Self, ExportsError> {
        let up = IntGauge::with_opts(
            Opts::new(
                "repl_instance_up",
                "Set to 1 while metrics for this destination are registered",
            )
            .const_label("destination", destination),
        )?;
        let registered_at = IntGauge::with_opts(
            Opts::new(
                "repl_instance_registered_timestamp_seconds",
                "Unix time at which this destination's metrics were registered",
            )
            .const_label("destination", destination),
        )?;
        Ok(Self { up, registered_at })
    }

    fn register_on(&self, registry: &Registry) -> Result<(), ExportsError> {
        registry.register(Box::new(self.up.clone()))?;
        registry.register(Box::new(self.registered_at.clone()))?;
        self.up.set(1);
        self.registered_at.set(chrono::Utc::now().timestamp());
        Ok(())
    }

    fn unregister_from(&self, registry: &Registry) -> Result<(), ExportsError> {
        registry.unregister(Box::new(self.up.clone()))?;
        registry.unregister(Box::new(self.registered_at.clone()))?;
        Ok(())
    }
}

/// Process-wide mapping from destination name to registered exports.
///
/// An entry present in the map means that destination's collectors are
/// currently visible in scrapes.
pub struct InstanceExportsRegistry {
    registry: Registry,
    instances: Mutex<HashMap<String, InstanceExports>>,
    registered_total: IntGauge,
}

impl InstanceExportsRegistry {
    /// Creates a registry of instance exports over `registry`.
    pub fn new(registry: Registry) -> Result<Self, ExportsError> {
        let registered_total = IntGauge::new(
            "repl_instances_registered",
            "Number of destinations with registered metrics",
        )?;
        Ok(Self {
            registry,
            instances: Mutex::new(HashMap::new()),
            registered_total,
        })
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers the registry-level collectors.
    ///
    /// Called once per exporter initialize; a collector left registered
    /// by a previous run is tolerated.
    pub fn initialize(&self) -> Result<(), ExportsError> {
        match self.registry.register(Box::new(self.registered_total.clone())) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Adds exports for `instance`'s destination.
    ///
    /// Registering an already-registered destination is a no-op rather
    /// than a duplicate.
    pub fn register(&self, instance: &dyn ReplicationInstance) -> Result<(), ExportsError> {
        let destination = instance.destination();
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        if instances.contains_key(destination) {
            tracing::debug!(destination, "Instance exports already registered");
            return Ok(());
        }

        let exports = InstanceExports::new(destination)?;
        exports.register_on(&self.registry)?;
        instances.insert(destination.to_owned(), exports);
        self.registered_total.set(instances.len() as i64);
        Ok(())
    }

    /// Removes exports for `instance`'s destination, if present.
    pub fn unregister(&self, instance: &dyn ReplicationInstance) -> Result<(), ExportsError> {
        let destination = instance.destination();
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(exports) = instances.remove(destination) {
            self.registered_total.set(instances.len() as i64);
            exports.unregister_from(&self.registry)?;
        }
        Ok(())
    }

    /// Removes all registered instance exports.
    ///
    /// Failures to unregister individual collectors are logged and do not
    /// stop the cleanup of remaining entries.
    pub fn terminate(&self) {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        for (destination, exports) in instances.drain() {
            if let Err(e) = exports.unregister_from(&self.registry) {
                tracing::warn!(
                    destination = %destination,
                    error = %e,
                    "Unable to unregister instance exports during terminate"
                );
            }
        }
        self.registered_total.set(0);
    }

    /// Whether `destination` currently has registered exports.
    pub fn contains(&self, destination: &str) -> bool {
        self.instances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(destination)
    }

    /// Number of destinations currently registered.
    pub fn len(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// True if no destination is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the full registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String, ExportsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
