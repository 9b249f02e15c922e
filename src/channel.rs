//! Bounded producer/consumer channel with blocking put/take.
//!
//! A [`BoundedChannel`] is a fixed-capacity FIFO buffer. `put` blocks while
//! the buffer is full, `take` blocks while it is empty. Each completed `put`
//! wakes exactly one suspended consumer and each completed `take` wakes
//! exactly one suspended producer: one state transition matches the need of
//! exactly one waiter, so waking everyone would only cause a stampede.
//!
//! No fairness guarantee is made about *which* of several suspended
//! producers or consumers is woken first, beyond what the underlying
//! condition variable provides.
//!
//! # Example
//!
//! ```
//! use corral::cancel::CancelToken;
//! use corral::channel::BoundedChannel;
//!
//! let chan = BoundedChannel::new(2).unwrap();
//! let token = CancelToken::new();
//!
//! chan.put(&token, "a").unwrap();
//! chan.put(&token, "b").unwrap();
//! assert_eq!(chan.len(), 2);
//! assert_eq!(chan.take(&token).unwrap(), "a");
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::error::Error;
use crate::observe::OpCounter;

/// A fixed-capacity blocking FIFO channel.
pub struct BoundedChannel<T> {
    capacity: usize,
    buffer: Mutex<VecDeque<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    counter: Option<Arc<dyn OpCounter>>,
}

impl<T> std::fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> BoundedChannel<T> {
    /// Creates a channel holding at most `capacity` items.
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
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            counter: None,
        })
    }

    /// Attaches an operation counter, marked once per completed put/take.
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

    /// Returns a point-in-time snapshot of the buffered item count, taken
    /// under the same exclusion used by put/take.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Returns true if the buffer is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Appends `item`, blocking while the buffer is full.
    ///
    /// Wakes exactly one suspended consumer on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled while waiting for
    /// space. The handed-down wakeup (if any) is passed along to another
    /// suspended producer so it is not lost.
    pub fn put(&self, token: &CancelToken, item: T) -> Result<(), Error> {
        let mut buffer = self.buffer.lock();
        while buffer.len() == self.capacity {
            if token.is_cancelled() {
                // A notify_one aimed at us would otherwise evaporate.
                self.not_full.notify_one();
                return Err(Error::Cancelled);
            }
            self.not_full.wait_for(&mut buffer, CANCEL_POLL);
        }
        buffer.push_back(item);
        // One new item satisfies exactly one consumer.
        self.not_empty.notify_one();
        self.tick();
        tracing::trace!(len = buffer.len(), "channel put");
        Ok(())
    }

    /// Removes and returns the head item, blocking while the buffer is empty.
    ///
    /// Wakes exactly one suspended producer on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled while waiting for
    /// an item.
    pub fn take(&self, token: &CancelToken) -> Result<T, Error> {
        let mut buffer = self.buffer.lock();
        loop {
            if let Some(item) = buffer.pop_front() {
                // One freed slot satisfies exactly one producer.
                self.not_full.notify_one();
                self.tick();
                tracing::trace!(len = buffer.len(), "channel take");
                return Ok(item);
            }
            if token.is_cancelled() {
                self.not_empty.notify_one();
                return Err(Error::Cancelled);
            }
            self.not_empty.wait_for(&mut buffer, CANCEL_POLL);
        }
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

    #[test]
    fn rejects_zero_capacity() {
        assert!(BoundedChannel::<u32>::new(0).is_err());
    }

    #[test]
    fn put_take_preserves_fifo_order() {
        let chan = BoundedChannel::new(2).unwrap();
        let token = CancelToken::new();
        assert_eq!(chan.len(), 0);
        assert!(chan.is_empty());

        chan.put(&token, 1).unwrap();
        chan.put(&token, 2).unwrap();
        assert_eq!(chan.len(), 2);

        assert_eq!(chan.take(&token).unwrap(), 1);
        assert_eq!(chan.take(&token).unwrap(), 2);
        assert!(chan.is_empty());
    }

    #[test]
    fn cancelled_put_on_full_buffer() {
        let chan = BoundedChannel::new(1).unwrap();
        let token = CancelToken::new();
        chan.put(&token, 7).unwrap();

        let cancelled = CancelToken::new();
        cancelled.cancel();
        assert_eq!(chan.put(&cancelled, 8), Err(Error::Cancelled));

        // The buffered item is untouched by the failed put.
        assert_eq!(chan.len(), 1);
        assert_eq!(chan.take(&token).unwrap(), 7);
    }

    #[test]
    fn cancelled_take_on_empty_buffer() {
        let chan = BoundedChannel::<u32>::new(1).unwrap();
        let cancelled = CancelToken::new();
        cancelled.cancel();
        assert_eq!(chan.take(&cancelled), Err(Error::Cancelled));
        assert!(chan.is_empty());
    }

    #[test]
    fn counter_marks_operations() {
        use crate::observe::OpMeter;

        let meter = Arc::new(OpMeter::new());
        let chan = BoundedChannel::new(2).unwrap().with_counter(meter.clone());
        let token = CancelToken::new();

        chan.put(&token, 1).unwrap();
        let _ = chan.take(&token).unwrap();
        assert_eq!(meter.take_snapshot(), 2);
    }
}
