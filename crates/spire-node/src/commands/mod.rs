pub mod benchmark;
pub mod proxy;
pub mod server;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};

/// Installs handlers for every signal the CLI surface treats as a clean
/// shutdown request (SIGINT, SIGTERM, SIGHUP). Returns the flag each
/// process's main loop polls; a caught signal flips it once and never
/// resets it.
pub fn install_shutdown_signal() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM, signal_hook::consts::SIGHUP] {
        signal_hook::flag::register(signal, Arc::clone(&flag)).context("failed to install signal handler")?;
    }
    Ok(flag)
}

pub fn init_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .try_init();
}
