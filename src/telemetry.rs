//! Tracing and metrics setup shared by all four binaries.
//!
//! Mirrors the teacher's `tracing_and_metrics` module: each binary calls
//! `setup_tracing()` once at start-up and spawns `run_metrics_server` so
//! `autometrics`-instrumented functions expose a Prometheus endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use autometrics::prometheus_exporter;
use axum::{routing::get, Router};
use tracing_subscriber::EnvFilter;

/// Process exit code for termination by signal (spec §6's CLI
/// envelope: "130 on termination by signal").
pub const EXIT_CODE_SIGNAL: i32 = 130;

/// The CLI envelope's `--log-level` choices (spec §6).
#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            // tracing has no level below error; critical is just error.
            LogLevel::Critical => "error",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Installs a tracing subscriber reading `RUST_LOG`, falling back to
/// `level` when unset.
pub fn setup_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Serves `/metrics` on `port` for Prometheus scraping. Spawned as a
/// detached task from `main`, the same way the teacher does.
pub async fn run_metrics_server(port: u16) {
    prometheus_exporter::init();

    let app = Router::new().route(
        "/metrics",
        get(|| async { prometheus_exporter::encode_http_response() }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on {}", addr);
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!("Metrics server stopped: {}", e);
            }
        }
        Err(e) => tracing::warn!("Failed to bind metrics server on {}: {}", addr, e),
    }
}

/// Spawns a task that waits for SIGINT/Ctrl-C and flips `stop` to
/// `true`, per spec §5's cancellation model: "a SIGINT/termination
/// request sets a shared stop flag; workers finish the current task
/// and exit; queued tasks are discarded." Callers pass the returned
/// flag into whatever worker pool they drive (e.g.
/// [`crate::fetch::fetch_ranges`]) and check [`EXIT_CODE_SIGNAL`]
/// after their work loop returns to decide the process exit code.
pub fn install_signal_stop_flag() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received termination signal, stopping after in-flight work");
            flag.store(true, Ordering::Relaxed);
        }
    });
    stop
}
