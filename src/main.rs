//! Replication Metrics Exporter demo
//!
//! Runs the exporter standalone with mock replication instances so the
//! `/metrics` and `/health` endpoints can be exercised with curl.

use clap::Parser;
use repl_metrics::{ExporterService, MockInstance, RequestOutcome};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};

/// Standalone demo of the replication metrics exporter.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Port to serve /metrics and /health on.
    #[arg(long, default_value_t = 9100)]
    port: u16,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Replication Metrics Exporter v{}", repl_metrics::VERSION);

    let mut exporter = match ExporterService::new() {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("Failed to build exporter: {}", e);
            std::process::exit(1);
        }
    };
    exporter.set_server_port(args.port);
    exporter.initialize();

    if !exporter.is_running() {
        eprintln!("Exporter failed to start on port {}", args.port);
        std::process::exit(1);
    }

    // Two mock pipelines: register while stopped, then start them.
    let instances = [MockInstance::new("orders-db"), MockInstance::new("users-db")];
    for instance in &instances {
        exporter.register(instance);
        instance.set_running(true);
    }

    let slot = exporter.profiler_slot();

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    }) {
        warn!("Unable to install Ctrl-C handler: {}", e);
    }

    info!(
        "Serving http://127.0.0.1:{}/metrics and /health, Ctrl-C to stop",
        args.port
    );

    // Feed the profiling hook with synthetic client requests until Ctrl-C.
    let mut tick: u64 = 0;
    loop {
        match shutdown_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
        tick += 1;
        let destination = if tick % 2 == 0 { "orders-db" } else { "users-db" };
        let outcome = if tick % 10 == 0 {
            RequestOutcome::Error
        } else {
            RequestOutcome::Success
        };
        slot.profiling(destination, Duration::from_millis(1 + tick % 40), outcome);
    }

    info!("Shutting down");
    for instance in &instances {
        instance.set_running(false);
        exporter.unregister(instance);
    }
    exporter.terminate();
}
