//! Starvation-free reader/writer lock (turnstile algorithm).
//!
//! A [`FairRwLock`] lets any number of readers share the protected section or
//! exactly one writer hold it exclusively. Every arrival, reader or writer,
//! first passes a single-slot FIFO *turnstile*:
//!
//! - A reader acquires the turnstile and releases it immediately, so a burst
//!   of readers is not serialized behind it, then registers in the reader
//!   count. The first reader of a batch claims *room occupancy*.
//! - A writer acquires the turnstile and **holds it until it is done**. Once
//!   a writer is queued, no new reader can even begin registering, so the
//!   reader population drains and the writer gets the room. This is what
//!   makes writer starvation impossible.
//! - The last reader of a batch, or the finishing writer, releases room
//!   occupancy. A finishing writer releases the turnstile *after* the room,
//!   so the next turnstile waiter proceeds only once occupancy is truly free.
//!
//! Under continuous write pressure readers can still wait a long time; the
//! guarantee is ordering through the turnstile, not reader latency.
//!
//! # Example
//!
//! ```
//! use corral::cancel::CancelToken;
//! use corral::rwlock::FairRwLock;
//!
//! let lock = FairRwLock::new();
//! let token = CancelToken::new();
//!
//! lock.begin_read(&token).unwrap();
//! lock.begin_read(&token).unwrap(); // readers share
//! lock.end_read().unwrap();
//! lock.end_read().unwrap();
//!
//! let guard = lock.write(&token).unwrap(); // RAII variant
//! drop(guard);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::error::Error;

/// A fair (FIFO) single-slot gate.
///
/// Both the arrival turnstile and room occupancy are instances of this.
/// Waiters queue by ticket id and the slot always goes to the head, so the
/// lock inherits strict arrival ordering from it.
#[derive(Debug)]
struct Turnstile {
    state: Mutex<TurnstileState>,
    changed: Condvar,
}

#[derive(Debug)]
struct TurnstileState {
    taken: bool,
    queue: VecDeque<u64>,
    next_waiter: u64,
}

impl Turnstile {
    fn new() -> Self {
        Self {
            state: Mutex::new(TurnstileState {
                taken: false,
                queue: VecDeque::new(),
                next_waiter: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Takes the slot, blocking in FIFO order.
    fn acquire(&self, token: &CancelToken) -> Result<(), Error> {
        let mut state = self.state.lock();
        let id = state.next_waiter;
        state.next_waiter = state.next_waiter.wrapping_add(1);
        state.queue.push_back(id);

        loop {
            if state.queue.front() == Some(&id) && !state.taken {
                state.queue.pop_front();
                state.taken = true;
                return Ok(());
            }
            if token.is_cancelled() {
                let before = state.queue.len();
                state.queue.retain(|&w| w != id);
                if state.queue.len() != before {
                    self.changed.notify_all();
                }
                return Err(Error::Cancelled);
            }
            self.changed.wait_for(&mut state, CANCEL_POLL);
        }
    }

    /// Frees the slot and wakes the head waiter.
    fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.taken, "turnstile released while free");
        state.taken = false;
        self.changed.notify_all();
    }
}

/// A reader/writer lock in which a queued writer cannot be starved.
///
/// The lock guards a section, not a value: callers bracket their own shared
/// state with `begin_read`/`end_read` and `begin_write`/`end_write`, or use
/// the RAII [`read`](Self::read)/[`write`](Self::write) variants.
#[derive(Debug)]
pub struct FairRwLock {
    turnstile: Turnstile,
    room: Turnstile,
    readers: Mutex<usize>,
    writer: AtomicBool,
}

impl Default for FairRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl FairRwLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            turnstile: Turnstile::new(),
            room: Turnstile::new(),
            readers: Mutex::new(0),
            writer: AtomicBool::new(false),
        }
    }

    /// Enters the section as a reader, blocking while a writer holds or is
    /// queued ahead at the turnstile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled while waiting.
    /// If the cancellation lands while claiming room occupancy, the reader
    /// registration is rolled back first.
    pub fn begin_read(&self, token: &CancelToken) -> Result<(), Error> {
        // Pass through and release right away: a waiting writer holds the
        // turnstile, so this is where new readers pile up behind it.
        self.turnstile.acquire(token)?;
        self.turnstile.release();

        let mut count = self.readers.lock();
        *count += 1;
        if *count == 1 {
            // First reader of the batch claims the room against writers.
            if let Err(err) = self.room.acquire(token) {
                *count -= 1;
                return Err(err);
            }
        }
        tracing::trace!(readers = *count, "read section entered");
        Ok(())
    }

    /// Leaves the reader section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no reader is inside.
    pub fn end_read(&self) -> Result<(), Error> {
        let mut count = self.readers.lock();
        if *count == 0 {
            return Err(Error::InvalidState("end_read without matching begin_read"));
        }
        *count -= 1;
        if *count == 0 {
            // Last reader out hands the room back.
            self.room.release();
        }
        Ok(())
    }

    /// Enters the section as the exclusive writer.
    ///
    /// Holds the turnstile for the whole write so no reader arriving later
    /// can slip in ahead, then waits for the room to drain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled while waiting.
    /// A turnstile already claimed is released before the error surfaces.
    pub fn begin_write(&self, token: &CancelToken) -> Result<(), Error> {
        self.turnstile.acquire(token)?;
        if let Err(err) = self.room.acquire(token) {
            self.turnstile.release();
            return Err(err);
        }
        self.writer.store(true, Ordering::SeqCst);
        tracing::trace!("write section entered");
        Ok(())
    }

    /// Leaves the writer section.
    ///
    /// Releases the room first and the turnstile last, so the next turnstile
    /// waiter proceeds only once occupancy is actually free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no writer is inside.
    pub fn end_write(&self) -> Result<(), Error> {
        if !self.writer.swap(false, Ordering::SeqCst) {
            return Err(Error::InvalidState(
                "end_write without matching begin_write",
            ));
        }
        self.room.release();
        self.turnstile.release();
        Ok(())
    }

    /// RAII reader entry; the section ends when the pass drops.
    ///
    /// # Errors
    ///
    /// Same as [`begin_read`](Self::begin_read).
    pub fn read(&self, token: &CancelToken) -> Result<ReadPass<'_>, Error> {
        self.begin_read(token)?;
        Ok(ReadPass { lock: self })
    }

    /// RAII writer entry; the section ends when the pass drops.
    ///
    /// # Errors
    ///
    /// Same as [`begin_write`](Self::begin_write).
    pub fn write(&self, token: &CancelToken) -> Result<WritePass<'_>, Error> {
        self.begin_write(token)?;
        Ok(WritePass { lock: self })
    }
}

/// A held reader entry, returned by [`FairRwLock::read`].
#[must_use = "dropping the pass immediately ends the read section"]
#[derive(Debug)]
pub struct ReadPass<'a> {
    lock: &'a FairRwLock,
}

impl Drop for ReadPass<'_> {
    fn drop(&mut self) {
        // The pass proves a begin_read is outstanding.
        let _ = self.lock.end_read();
    }
}

/// A held writer entry, returned by [`FairRwLock::write`].
#[must_use = "dropping the pass immediately ends the write section"]
#[derive(Debug)]
pub struct WritePass<'a> {
    lock: &'a FairRwLock,
}

impl Drop for WritePass<'_> {
    fn drop(&mut self) {
        let _ = self.lock.end_write();
    }
}
