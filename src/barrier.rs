//! Reusable N-party rendezvous barrier.
//!
//! A [`CyclicRendezvous`] blocks callers until `parties` of them have
//! arrived, then releases the whole group and resets for the next round.
//! Rounds are numbered by a monotonically increasing *generation*; a waiter
//! is released exactly when the generation moves past the one it arrived in,
//! which guards against unrelated or spurious wakeups.
//!
//! The caller that completes a generation is its *leader*
//! ([`RendezvousOutcome::is_leader`] is true for exactly one caller per
//! generation), convenient for once-per-round work.
//!
//! # Cancellation
//!
//! A caller cancelled while waiting withdraws its arrival (if the generation
//! has not tripped yet) and wakes the remaining waiters so they re-check the
//! smaller count. The party count itself never shrinks: with one participant
//! gone the generation cannot trip until a replacement arrives. If the
//! generation already tripped by the time the cancellation is observed, the
//! wait is reported as a normal (non-leader) completion.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use corral::barrier::CyclicRendezvous;
//! use corral::cancel::CancelToken;
//!
//! let barrier = Arc::new(CyclicRendezvous::new(2).unwrap());
//! let other = Arc::clone(&barrier);
//! let worker = std::thread::spawn(move || {
//!     other.wait(&CancelToken::new()).unwrap()
//! });
//!
//! let mine = barrier.wait(&CancelToken::new()).unwrap();
//! let theirs = worker.join().unwrap();
//! assert!(mine.is_leader() ^ theirs.is_leader());
//! ```

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::error::Error;
use crate::observe::OpCounter;

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// A reusable barrier for `parties` cooperating callers.
pub struct CyclicRendezvous {
    parties: usize,
    state: Mutex<BarrierState>,
    tripped: Condvar,
    counter: Option<Arc<dyn OpCounter>>,
}

impl std::fmt::Debug for CyclicRendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CyclicRendezvous")
            .field("parties", &self.parties)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl CyclicRendezvous {
    /// Creates a barrier that trips when `parties` callers have arrived.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `parties == 0`.
    pub fn new(parties: usize) -> Result<Self, Error> {
        if parties == 0 {
            return Err(Error::InvalidArgument("parties must be positive"));
        }
        Ok(Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            tripped: Condvar::new(),
            counter: None,
        })
    }

    /// Attaches an operation counter, marked once per completed wait.
    #[must_use]
    pub fn with_counter(mut self, counter: Arc<dyn OpCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Returns the number of parties required to trip the barrier.
    #[must_use]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Returns a point-in-time snapshot of the current generation number.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Arrives at the barrier and blocks until the current generation trips.
    ///
    /// The arrival that completes the generation resets the count, advances
    /// the generation, wakes every waiter, and reports itself as leader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled while the
    /// caller's generation is still open; the arrival is withdrawn first and
    /// the remaining waiters are woken to re-check the count.
    pub fn wait(&self, token: &CancelToken) -> Result<RendezvousOutcome, Error> {
        let mut state = self.state.lock();
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.parties {
            // Trip: close this generation and open the next.
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.tripped.notify_all();
            self.tick();
            tracing::trace!(generation, "rendezvous tripped");
            return Ok(RendezvousOutcome { leader: true });
        }

        loop {
            if state.generation != generation {
                self.tick();
                return Ok(RendezvousOutcome { leader: false });
            }
            if token.is_cancelled() {
                // Still in our generation: withdraw the arrival so the group
                // sees an accurate count.
                state.arrived -= 1;
                self.tripped.notify_all();
                tracing::trace!(generation, "rendezvous wait cancelled");
                return Err(Error::Cancelled);
            }
            self.tripped.wait_for(&mut state, CANCEL_POLL);
        }
    }

    fn tick(&self) {
        if let Some(counter) = &self.counter {
            counter.mark();
        }
    }
}

/// The result of a completed rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendezvousOutcome {
    leader: bool,
}

impl RendezvousOutcome {
    /// True for exactly one caller per generation: the one that tripped it.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.leader
    }
}
