//! Shared helpers for the conformance suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use yieldpoint::driver::Driver;
use yieldpoint::lab::LabDriver;

/// Initializes test logging once per process.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Creates a fresh deterministic driver.
pub fn lab() -> Arc<LabDriver> {
    init_test_logging();
    Arc::new(LabDriver::new())
}

/// Queues a tick that increments the returned counter and queues one more
/// incrementing tick behind it. A single-unit consumer must observe exactly
/// one increment.
pub fn queue_nested_ticks(driver: &Arc<LabDriver>) -> Arc<AtomicUsize> {
    let ticks = Arc::new(AtomicUsize::new(0));
    let t = Arc::clone(&ticks);
    let d = Arc::clone(driver);
    driver.defer(Box::new(move || {
        t.fetch_add(1, Ordering::SeqCst);
        let t2 = Arc::clone(&t);
        d.defer(Box::new(move || {
            t2.fetch_add(1, Ordering::SeqCst);
        }));
    }));
    ticks
}

/// Reads a tick counter.
pub fn ticks(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
