//! Blocking synchronization primitives for coordinating concurrent workers
//! over shared, capacity-limited resources.
//!
//! Five independent primitives, each built on one internal exclusion region
//! plus condition waiting, with explicit ordering, fairness, and
//! cancellation-rollback guarantees:
//!
//! - [`pool::WeightedPool`]: weighted counting pool; strict-FIFO admission
//!   (canonical) or unordered first-ready-wins
//! - [`channel::BoundedChannel`]: fixed-capacity FIFO buffer with blocking
//!   put/take and wake-one handoff
//! - [`rwlock::FairRwLock`]: reader/writer lock in which a queued writer
//!   cannot be starved (turnstile algorithm)
//! - [`gate::AdmissionGate`]: counting permit gate with FIFO admission,
//!   non-blocking and timed variants
//! - [`barrier::CyclicRendezvous`]: reusable N-party barrier advancing
//!   through generations
//!
//! # Cancellation
//!
//! Every blocking operation takes a [`cancel::CancelToken`]. Cancelling the
//! token while a caller is suspended rolls back whatever the caller had
//! registered (ticket, queue slot, arrival count) and surfaces
//! [`error::Error::Cancelled`]; the primitive stays consistent and usable.
//!
//! # Errors
//!
//! All failures are synchronous return values ([`error::Error`]); nothing is
//! retried internally and no error poisons a primitive.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use corral::{AdmissionGate, CancelToken};
//!
//! let gate = Arc::new(AdmissionGate::new(3).unwrap());
//! let token = CancelToken::new();
//!
//! let pass = gate.enter_scoped(&token).unwrap();
//! assert_eq!(gate.approx_available(), 2);
//! drop(pass);
//! assert_eq!(gate.approx_available(), 3);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod barrier;
pub mod cancel;
pub mod channel;
pub mod error;
pub mod gate;
pub mod observe;
pub mod pool;
pub mod rwlock;

pub use barrier::{CyclicRendezvous, RendezvousOutcome};
pub use cancel::CancelToken;
pub use channel::BoundedChannel;
pub use error::Error;
pub use gate::{AdmissionGate, GatePass};
pub use pool::{AdmissionOrder, WeightedPool};
pub use rwlock::{FairRwLock, ReadPass, WritePass};
