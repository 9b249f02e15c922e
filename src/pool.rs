//! Weighted counting pool with strict-FIFO admission.
//!
//! A [`WeightedPool`] accounts for a fixed number of resource units.
//! `acquire(weight)` blocks until the request can be granted, `release`
//! returns units. Two admission policies exist:
//!
//! - **FIFO** (canonical, [`WeightedPool::new`]): requests are granted in
//!   strict arrival order. A large request at the head of the line blocks
//!   smaller, already-satisfiable requests behind it. Fairness is prioritized
//!   over throughput, and no request can starve.
//! - **Unordered** ([`WeightedPool::unordered`]): first-ready-wins. Any
//!   caller whose request fits is granted as soon as capacity allows. Simpler
//!   and often faster, but a large request can starve indefinitely under
//!   steady small-request load.
//!
//! # Invariant
//!
//! `available + Σ(granted weights) == capacity` after every operation, and
//! `0 <= available <= capacity`. Over-release is rejected with
//! [`Error::InvalidState`] and leaves the pool untouched.
//!
//! # Example
//!
//! ```
//! use corral::cancel::CancelToken;
//! use corral::pool::WeightedPool;
//!
//! let pool = WeightedPool::new(4).unwrap();
//! let token = CancelToken::new();
//!
//! pool.acquire(&token, 3).unwrap();
//! assert_eq!(pool.available(), 1);
//! pool.release(3).unwrap();
//! assert_eq!(pool.available(), 4);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::error::Error;
use crate::observe::OpCounter;

/// Admission policy of a [`WeightedPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOrder {
    /// Strict arrival order; head-of-line requests are never overtaken.
    Fifo,
    /// First-ready-wins; no ordering guarantee.
    Unordered,
}

/// One pending request in the FIFO admission queue.
#[derive(Debug)]
struct Ticket {
    id: u64,
    weight: usize,
}

#[derive(Debug)]
struct PoolState {
    available: usize,
    tickets: VecDeque<Ticket>,
    next_ticket: u64,
}

/// A capacity-bounded resource pool with weighted acquire/release.
pub struct WeightedPool {
    capacity: usize,
    order: AdmissionOrder,
    state: Mutex<PoolState>,
    changed: Condvar,
    counter: Option<Arc<dyn OpCounter>>,
}

impl std::fmt::Debug for WeightedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedPool")
            .field("capacity", &self.capacity)
            .field("order", &self.order)
            .field("available", &self.available())
            .finish_non_exhaustive()
    }
}

impl WeightedPool {
    /// Creates a pool with strict-FIFO admission.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        Self::with_order(capacity, AdmissionOrder::Fifo)
    }

    /// Creates a pool with unordered (first-ready-wins) admission.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `capacity == 0`.
    pub fn unordered(capacity: usize) -> Result<Self, Error> {
        Self::with_order(capacity, AdmissionOrder::Unordered)
    }

    fn with_order(capacity: usize, order: AdmissionOrder) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("capacity must be positive"));
        }
        Ok(Self {
            capacity,
            order,
            state: Mutex::new(PoolState {
                available: capacity,
                tickets: VecDeque::new(),
                next_ticket: 0,
            }),
            changed: Condvar::new(),
            counter: None,
        })
    }

    /// Attaches an operation counter, marked once per granted acquire and
    /// once per release.
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

    /// Returns the admission policy.
    #[must_use]
    pub fn admission(&self) -> AdmissionOrder {
        self.order
    }

    /// Returns a point-in-time snapshot of the available units.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Returns a point-in-time snapshot of the pending-request count.
    ///
    /// Always 0 for an unordered pool, which keeps no queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().tickets.len()
    }

    /// Acquires `weight` units, blocking until the request can be granted.
    ///
    /// Under FIFO admission the request is granted only once it is at the
    /// head of the arrival queue *and* enough units are available; under
    /// unordered admission it is granted as soon as enough units are
    /// available, regardless of who arrived first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `weight == 0` or
    ///   `weight > capacity` (the request could never be granted).
    /// - [`Error::Cancelled`] if `token` is cancelled while waiting. A queued
    ///   ticket is removed and the remaining waiters are woken, since
    ///   removing a head-of-line ticket may unblock the new head.
    pub fn acquire(&self, token: &CancelToken, weight: usize) -> Result<(), Error> {
        if weight == 0 || weight > self.capacity {
            return Err(Error::InvalidArgument("weight must be in 1..=capacity"));
        }
        match self.order {
            AdmissionOrder::Fifo => self.acquire_fifo(token, weight),
            AdmissionOrder::Unordered => self.acquire_unordered(token, weight),
        }
    }

    fn acquire_fifo(&self, token: &CancelToken, weight: usize) -> Result<(), Error> {
        let mut state = self.state.lock();
        let id = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.tickets.push_back(Ticket { id, weight });

        loop {
            let at_head = state.tickets.front().map(|t| t.id) == Some(id);
            if at_head && state.available >= weight {
                state.tickets.pop_front();
                state.available -= weight;
                // Popping the head may have unblocked the next ticket.
                self.changed.notify_all();
                self.tick();
                tracing::trace!(weight, available = state.available, "pool acquire granted");
                return Ok(());
            }
            if token.is_cancelled() {
                let before = state.tickets.len();
                state.tickets.retain(|t| t.id != id);
                if state.tickets.len() != before {
                    self.changed.notify_all();
                }
                tracing::trace!(weight, "pool acquire cancelled");
                return Err(Error::Cancelled);
            }
            self.changed.wait_for(&mut state, CANCEL_POLL);
        }
    }

    fn acquire_unordered(&self, token: &CancelToken, weight: usize) -> Result<(), Error> {
        let mut state = self.state.lock();
        loop {
            if state.available >= weight {
                state.available -= weight;
                self.tick();
                tracing::trace!(weight, available = state.available, "pool acquire granted");
                return Ok(());
            }
            token.checkpoint()?;
            self.changed.wait_for(&mut state, CANCEL_POLL);
        }
    }

    /// Returns `weight` units to the pool and wakes all waiters.
    ///
    /// All waiters are woken rather than one: a release may satisfy any of
    /// the suspended requests, not just the head.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `weight == 0` or `weight > capacity`.
    /// - [`Error::InvalidState`] if the release would push `available` above
    ///   `capacity` (double-release or over-release); the pool is unchanged.
    pub fn release(&self, weight: usize) -> Result<(), Error> {
        if weight == 0 || weight > self.capacity {
            return Err(Error::InvalidArgument("weight must be in 1..=capacity"));
        }
        let mut state = self.state.lock();
        if state.available + weight > self.capacity {
            return Err(Error::InvalidState("release would exceed capacity"));
        }
        state.available += weight;
        self.changed.notify_all();
        self.tick();
        tracing::trace!(weight, available = state.available, "pool release");
        Ok(())
    }

    fn tick(&self) {
        if let Some(counter) = &self.counter {
            counter.mark();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn rejects_zero_capacity() {
        assert!(WeightedPool::new(0).is_err());
        assert!(WeightedPool::unordered(0).is_err());
    }

    #[test]
    fn basic_acquire_release() {
        let pool = WeightedPool::new(3).unwrap();
        let token = CancelToken::new();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.available(), 3);

        pool.acquire(&token, 2).unwrap();
        assert_eq!(pool.available(), 1);
        pool.release(2).unwrap();
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn rejects_bad_weights() {
        let pool = WeightedPool::new(3).unwrap();
        let token = CancelToken::new();
        assert_eq!(
            pool.acquire(&token, 0),
            Err(Error::InvalidArgument("weight must be in 1..=capacity"))
        );
        assert_eq!(
            pool.acquire(&token, 4),
            Err(Error::InvalidArgument("weight must be in 1..=capacity"))
        );
        assert!(pool.release(0).is_err());
        assert!(pool.release(4).is_err());
    }

    #[test]
    fn over_release_leaves_state_unchanged() {
        let pool = WeightedPool::new(3).unwrap();
        let token = CancelToken::new();
        pool.acquire(&token, 1).unwrap();
        assert_eq!(pool.available(), 2);

        assert_eq!(
            pool.release(2),
            Err(Error::InvalidState("release would exceed capacity"))
        );
        // Rejected release must not have moved the count.
        assert_eq!(pool.available(), 2);
        pool.release(1).unwrap();
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn cancelled_waiter_removes_its_ticket() {
        let pool = WeightedPool::new(1).unwrap();
        let token = CancelToken::new();
        pool.acquire(&token, 1).unwrap();

        let waiter = CancelToken::new();
        waiter.cancel();
        assert_eq!(pool.acquire(&waiter, 1), Err(Error::Cancelled));
        assert_eq!(pool.queued(), 0);

        // The pool stays fully usable after the cancelled attempt.
        pool.release(1).unwrap();
        pool.acquire(&token, 1).unwrap();
    }

    #[test]
    fn cancelling_head_of_line_unblocks_successor() {
        let pool = Arc::new(WeightedPool::new(2).unwrap());
        let token = CancelToken::new();
        pool.acquire(&token, 2).unwrap();

        // Head waiter wants the whole pool; a weight-1 waiter queues behind it.
        let head_token = CancelToken::new();
        let head = {
            let pool = Arc::clone(&pool);
            let head_token = head_token.clone();
            std::thread::spawn(move || pool.acquire(&head_token, 2))
        };
        while pool.queued() < 1 {
            std::thread::yield_now();
        }
        let tail_done = Arc::new(AtomicUsize::new(0));
        let tail = {
            let pool = Arc::clone(&pool);
            let tail_done = Arc::clone(&tail_done);
            std::thread::spawn(move || {
                let token = CancelToken::new();
                pool.acquire(&token, 1).unwrap();
                tail_done.store(1, Ordering::SeqCst);
            })
        };
        while pool.queued() < 2 {
            std::thread::yield_now();
        }

        // One unit back: the head (weight 2) still blocks, and so does the
        // tail behind it.
        pool.release(1).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(tail_done.load(Ordering::SeqCst), 0, "no overtaking");

        // Cancelling the head must unblock the tail.
        head_token.cancel();
        assert_eq!(head.join().unwrap(), Err(Error::Cancelled));
        tail.join().unwrap();
        assert_eq!(tail_done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unordered_pool_lets_small_requests_pass() {
        let pool = Arc::new(WeightedPool::unordered(2).unwrap());
        let token = CancelToken::new();
        pool.acquire(&token, 1).unwrap();

        // A weight-2 request cannot fit, but a weight-1 request can and is
        // allowed to pass it.
        let big_token = CancelToken::new();
        let big = {
            let pool = Arc::clone(&pool);
            let big_token = big_token.clone();
            std::thread::spawn(move || pool.acquire(&big_token, 2))
        };
        std::thread::sleep(Duration::from_millis(30));

        pool.acquire(&token, 1).unwrap();
        pool.release(1).unwrap();
        pool.release(1).unwrap();

        big.join().unwrap().unwrap();
        pool.release(2).unwrap();
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn counter_marks_operations() {
        use crate::observe::OpMeter;

        let meter = Arc::new(OpMeter::new());
        let pool = WeightedPool::new(2).unwrap().with_counter(meter.clone());
        let token = CancelToken::new();

        pool.acquire(&token, 1).unwrap();
        pool.release(1).unwrap();
        assert_eq!(meter.snapshot(), 2);
    }
}
