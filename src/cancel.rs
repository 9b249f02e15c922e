//! Cancellation signaling for blocking waits.
//!
//! Every blocking operation in this crate takes a [`CancelToken`]. The token
//! is the only channel through which an external party can interrupt a
//! suspended caller: set it with [`CancelToken::cancel`] and the suspended
//! operation rolls back whatever it had registered (ticket, arrival count,
//! queue slot) and returns [`Error::Cancelled`].
//!
//! # How delivery works
//!
//! The primitives never park unboundedly. A suspended caller re-checks its
//! wait condition and its token on every condition-variable wakeup, and in
//! the worst case after [`CANCEL_POLL`], so a cancellation is observed within
//! one poll interval even if no notification arrives.
//!
//! # Example
//!
//! ```
//! use corral::cancel::CancelToken;
//!
//! let token = CancelToken::new();
//! assert!(token.checkpoint().is_ok());
//!
//! token.cancel();
//! assert!(token.checkpoint().is_err());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;

/// Upper bound on how long a suspended caller goes without re-checking its
/// cancellation token; the worst-case latency of a cancellation.
pub const CANCEL_POLL: Duration = Duration::from_millis(10);

/// A cloneable cancellation signal shared between a blocked caller and
/// whoever may need to interrupt it.
///
/// Clones share the same underlying flag, so cancelling any clone cancels
/// them all. Cancellation is sticky: once set it cannot be cleared, which
/// keeps rollback reasoning one-way.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every operation holding a clone of this token.
    ///
    /// Suspended callers observe the request within [`CANCEL_POLL`] at the
    /// latest, undo their partial registration, and return
    /// [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        tracing::trace!("cancel requested");
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checks for cancellation, returning an error if it was requested.
    ///
    /// Convenient with the `?` operator at the top of a blocking operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if [`cancel`](Self::cancel) was called.
    pub fn checkpoint(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
