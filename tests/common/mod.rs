#![allow(dead_code)]
//! Shared helpers for the integration suites.

use corral::observe::{PrefixedNamer, ThreadNamer};

/// Initializes a fmt tracing subscriber from `RUST_LOG`, once per process.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spawns a worker thread named by `namer`.
pub fn spawn_named<F>(namer: &PrefixedNamer, body: F) -> std::thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(namer.next_name())
        .spawn(body)
        .expect("failed to spawn worker thread")
}
