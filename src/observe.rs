//! Optional instrumentation collaborators.
//!
//! The primitives never reach for process-wide singletons. Observability is
//! wired in explicitly by the caller, or not at all:
//!
//! - [`OpCounter`]: a monotonic operation counter a primitive marks on every
//!   completed operation. Attach one with the `with_counter` builder on each
//!   primitive.
//! - [`ThreadNamer`]: assigns human-readable identities to worker threads.
//!   Consumed by the layers that spawn workers (pools, pipelines, test
//!   drivers); the primitives themselves never spawn threads.
//!
//! Both traits are advisory. Nothing in a primitive's correctness depends on
//! them, and a missing counter costs a single branch per operation.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic counter of completed operations.
///
/// Implementations must be cheap and non-blocking: `mark` is called from
/// inside hot paths, sometimes while the primitive's internal lock is held.
pub trait OpCounter: Send + Sync {
    /// Records one completed operation.
    fn mark(&self);
}

/// The default [`OpCounter`]: an atomic counter with snapshot-and-reset.
///
/// # Example
///
/// ```
/// use corral::observe::{OpCounter, OpMeter};
///
/// let meter = OpMeter::new();
/// meter.mark();
/// meter.mark();
/// assert_eq!(meter.snapshot(), 2);
/// assert_eq!(meter.take_snapshot(), 2);
/// assert_eq!(meter.snapshot(), 0);
/// ```
#[derive(Debug, Default)]
pub struct OpMeter {
    ops: AtomicU64,
}

impl OpMeter {
    /// Creates a meter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current count without resetting it.
    #[must_use]
    pub fn snapshot(&self) -> u64 {
        self.ops.load(Ordering::Relaxed)
    }

    /// Returns the current count and resets it to zero.
    ///
    /// Intended for periodic scrapes: each increment is reported exactly once
    /// across consecutive calls.
    #[must_use]
    pub fn take_snapshot(&self) -> u64 {
        self.ops.swap(0, Ordering::Relaxed)
    }
}

impl OpCounter for OpMeter {
    fn mark(&self) {
        self.ops.fetch_add(1, Ordering::Relaxed);
    }
}

/// Produces names for worker threads.
pub trait ThreadNamer {
    /// Returns the name for the next worker.
    fn next_name(&self) -> String;
}

/// Names workers `prefix-1`, `prefix-2`, ... in spawn order.
///
/// # Example
///
/// ```
/// use corral::observe::{PrefixedNamer, ThreadNamer};
///
/// let namer = PrefixedNamer::new("reader");
/// assert_eq!(namer.next_name(), "reader-1");
/// assert_eq!(namer.next_name(), "reader-2");
/// ```
#[derive(Debug)]
pub struct PrefixedNamer {
    prefix: String,
    seq: AtomicU64,
}

impl PrefixedNamer {
    /// Creates a namer with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            seq: AtomicU64::new(1),
        }
    }
}

impl ThreadNamer for PrefixedNamer {
    fn next_name(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}
