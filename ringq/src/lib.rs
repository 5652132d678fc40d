//! # ringq
//!
//! Bounded lock-free ring buffer queues for handing items between threads
//! with as little coherence traffic as possible.
//!
//! ## Variants
//!
//! - [`spsc`]: one producer thread, one consumer thread. Each side keeps a
//!   cached copy of the other's cursor and only touches the shared line when
//!   the queue looks full or empty.
//! - [`mpsc`]: any number of producer threads, one consumer thread.
//!   Producers claim positions with a CAS and publish through per-slot stamps.
//!
//! Both queues are fixed capacity, allocate once at construction, never
//! block, and never spin on behalf of the caller: a full queue hands the
//! item back in [`Full`], an empty queue returns `None`.
//!
//! Thread roles are enforced by the handle types. An SPSC [`spsc::Producer`]
//! cannot be cloned and an MPSC [`mpsc::Consumer`] cannot be cloned, and both
//! require `&mut self` on the single-owner side.
//!
//! ## Example
//!
//! ```
//! use ringq::{spsc, Full};
//!
//! let (mut tx, mut rx) = spsc::channel::<u64>(2).unwrap();
//!
//! tx.enqueue(1).unwrap();
//! tx.enqueue(2).unwrap();
//! assert_eq!(tx.enqueue(3), Err(Full(3)));
//!
//! assert_eq!(rx.dequeue(), Some(1));
//! assert_eq!(rx.dequeue(), Some(2));
//! assert_eq!(rx.dequeue(), None);
//! ```
//!
//! ## Features
//!
//! - `tracing`: emit `debug!` on construction and `trace!` on teardown. The
//!   enqueue and dequeue paths never log.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod ring;
mod sync;
mod trace;

pub mod error;
pub mod mpsc;
pub mod spsc;

pub use error::{Full, InvalidCapacity};
pub use mpsc::MpscQueue;
pub use spsc::SpscQueue;
