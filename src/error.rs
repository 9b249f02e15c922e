//! Error types shared by all primitives.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Every error is a synchronous return value; nothing is retried internally
//! - No error is fatal to the primitive: after any `Err` the primitive is
//!   still usable and its invariants hold
//!
//! # Error Categories
//!
//! - [`Error::InvalidArgument`]: a capacity, party count, weight, or request
//!   that the contract rejects up front. State is never touched.
//! - [`Error::InvalidState`]: the operation would corrupt an invariant (for
//!   example a release that would push availability above capacity). The
//!   operation is rejected and state is left unchanged.
//! - [`Error::Cancelled`]: the calling thread's blocking wait was cancelled
//!   through its [`CancelToken`](crate::cancel::CancelToken). Any partial
//!   registration (ticket, arrival count, queue slot) is rolled back before
//!   the error surfaces.

use core::fmt;

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument violated the operation's contract.
    InvalidArgument(&'static str),
    /// The operation would have corrupted an invariant; state is unchanged.
    InvalidState(&'static str),
    /// The blocking wait was cancelled; state was rolled back.
    Cancelled,
}

impl Error {
    /// Returns true if this error is a cancellation outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Self::InvalidState(what) => write!(f, "invalid state: {what}"),
            Self::Cancelled => write!(f, "operation cancelled while waiting"),
        }
    }
}

impl std::error::Error for Error {}
