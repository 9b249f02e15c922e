//! Fair admission gate: a fixed-capacity concurrency limiter.
//!
//! An [`AdmissionGate`] grants up to `capacity` concurrent admissions.
//! [`enter`](AdmissionGate::enter) blocks until a permit is free and grants
//! permits in the order callers began waiting, so no caller can be starved
//! by later arrivals. [`try_enter`](AdmissionGate::try_enter) and
//! [`try_enter_for`](AdmissionGate::try_enter_for) are the non-blocking and
//! bounded-blocking variants.
//!
//! # Fairness
//!
//! Waiters queue in arrival order and a permit always goes to the
//! longest-waiting caller. `try_enter` refuses to overtake queued waiters:
//! it fails when the queue is non-empty even if a permit happens to be free
//! at that instant.
//!
//! # Example
//!
//! ```
//! use corral::cancel::CancelToken;
//! use corral::gate::AdmissionGate;
//!
//! let gate = AdmissionGate::new(2).unwrap();
//! let token = CancelToken::new();
//!
//! gate.enter(&token).unwrap();
//! assert!(gate.try_enter());
//! assert!(!gate.try_enter()); // full
//! gate.leave().unwrap();
//! gate.leave().unwrap();
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::error::Error;
use crate::observe::OpCounter;

#[derive(Debug)]
struct GateState {
    permits: usize,
    queue: VecDeque<u64>,
    next_waiter: u64,
}

/// A counting permit gate with FIFO admission under contention.
pub struct AdmissionGate {
    capacity: usize,
    state: Mutex<GateState>,
    changed: Condvar,
    counter: Option<Arc<dyn OpCounter>>,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("capacity", &self.capacity)
            .field("available", &self.approx_available())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    /// Creates a gate admitting at most `capacity` concurrent holders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("capacity must be positive"));
        }
        Ok(Self {
            capacity,
            state: Mutex::new(GateState {
                permits: capacity,
                queue: VecDeque::new(),
                next_waiter: 0,
            }),
            changed: Condvar::new(),
            counter: None,
        })
    }

    /// Attaches an operation counter, marked once per admission and leave.
    #[must_use]
    pub fn with_counter(mut self, counter: Arc<dyn OpCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Returns the fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Advisory snapshot of free permits.
    ///
    /// Not atomic against concurrent `enter`/`leave` or against
    /// [`queued`](Self::queued); do not use it for correctness decisions.
    #[must_use]
    pub fn approx_available(&self) -> usize {
        self.state.lock().permits
    }

    /// Advisory snapshot of the number of blocked callers.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Blocks until a permit is free, honoring arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled while waiting.
    /// The caller's queue slot is removed and the remaining waiters are
    /// woken, since the removal may have promoted a new head.
    pub fn enter(&self, token: &CancelToken) -> Result<(), Error> {
        match self.wait_for_permit(token, None) {
            Ok(true) => Ok(()),
            Ok(false) => unreachable!("untimed wait cannot time out"),
            Err(err) => Err(err),
        }
    }

    /// Takes a permit only if one is immediately free and nobody is queued.
    #[must_use]
    pub fn try_enter(&self) -> bool {
        let mut state = self.state.lock();
        if state.permits > 0 && state.queue.is_empty() {
            state.permits -= 1;
            self.tick();
            true
        } else {
            false
        }
    }

    /// Blocks up to `timeout` for a permit; returns `Ok(false)` on timeout.
    ///
    /// The timed wait queues like a normal `enter`, so it cannot be overtaken
    /// while it still has time left.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled before a permit
    /// was granted or the timeout elapsed.
    pub fn try_enter_for(&self, token: &CancelToken, timeout: Duration) -> Result<bool, Error> {
        self.wait_for_permit(token, Some(Instant::now() + timeout))
    }

    /// Blocking admission that returns a pass releasing the permit on drop.
    ///
    /// # Errors
    ///
    /// Same as [`enter`](Self::enter).
    pub fn enter_scoped(&self, token: &CancelToken) -> Result<GatePass<'_>, Error> {
        self.enter(token)?;
        Ok(GatePass { gate: self })
    }

    /// Returns one permit, waking the longest-waiting caller if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if all permits are already free
    /// (a leave without a matching enter); the gate is unchanged.
    pub fn leave(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.permits == self.capacity {
            return Err(Error::InvalidState("leave without matching enter"));
        }
        state.permits += 1;
        self.changed.notify_all();
        self.tick();
        tracing::trace!(permits = state.permits, "gate leave");
        Ok(())
    }

    /// Core wait loop shared by `enter` and `try_enter_for`.
    ///
    /// Returns `Ok(true)` once a permit was granted, `Ok(false)` when the
    /// deadline passed first.
    fn wait_for_permit(
        &self,
        token: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<bool, Error> {
        let mut state = self.state.lock();
        let id = state.next_waiter;
        state.next_waiter = state.next_waiter.wrapping_add(1);
        state.queue.push_back(id);

        loop {
            if state.queue.front() == Some(&id) && state.permits > 0 {
                state.queue.pop_front();
                state.permits -= 1;
                // The next waiter may also fit now that the head moved.
                self.changed.notify_all();
                self.tick();
                tracing::trace!(permits = state.permits, "gate enter granted");
                return Ok(true);
            }
            if token.is_cancelled() {
                self.drop_waiter(&mut state, id);
                tracing::trace!("gate enter cancelled");
                return Err(Error::Cancelled);
            }
            let now = Instant::now();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    self.drop_waiter(&mut state, id);
                    tracing::trace!("gate enter timed out");
                    return Ok(false);
                }
                let until = deadline.min(now + CANCEL_POLL);
                self.changed.wait_until(&mut state, until);
            } else {
                self.changed.wait_for(&mut state, CANCEL_POLL);
            }
        }
    }

    fn drop_waiter(&self, state: &mut GateState, id: u64) {
        let before = state.queue.len();
        state.queue.retain(|&w| w != id);
        if state.queue.len() != before {
            self.changed.notify_all();
        }
    }

    fn tick(&self) {
        if let Some(counter) = &self.counter {
            counter.mark();
        }
    }
}

/// A held admission, returned by [`AdmissionGate::enter_scoped`].
///
/// Leaves the gate when dropped.
#[must_use = "dropping the pass immediately releases the admission"]
#[derive(Debug)]
pub struct GatePass<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        // The pass itself proves an enter is outstanding.
        let _ = self.gate.leave();
    }
}
