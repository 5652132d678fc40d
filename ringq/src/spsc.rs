//! Single-producer single-consumer (SPSC) bounded queue.
//!
//! Each side owns one cursor and only ever reads the other. The hot path
//! touches no remote cache line: each handle keeps a private copy of the
//! other side's cursor and reloads the real one only when that copy says the
//! queue is full (producer) or empty (consumer).
//!
//! The ring has `capacity + 1` slots. One slot always stays unused so that
//! `head == tail` means empty and `next(tail) == head` means full, without a
//! shared counter.
//!
//! ```text
//!            head                tail
//!             v                   v
//! ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//! │     │  a  │  b  │  c  │  d  │     │     │   capacity 6, 7 slots
//! └─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//!        consumer reads here      producer writes here
//! ```
//!
//! # Example
//!
//! ```
//! use ringq::spsc;
//! use std::thread;
//!
//! let (mut tx, mut rx) = spsc::channel::<u64>(1024).unwrap();
//!
//! let producer = thread::spawn(move || {
//!     for i in 0..10_000 {
//!         while tx.enqueue(i).is_err() {
//!             std::hint::spin_loop();
//!         }
//!     }
//! });
//!
//! for expected in 0..10_000 {
//!     let value = loop {
//!         if let Some(value) = rx.dequeue() {
//!             break value;
//!         }
//!         std::hint::spin_loop();
//!     };
//!     assert_eq!(value, expected);
//! }
//!
//! producer.join().unwrap();
//! assert!(rx.is_empty());
//! ```

use std::fmt;
use std::mem::{self, MaybeUninit};

use crossbeam_utils::CachePadded;

use crate::error::{Full, InvalidCapacity};
use crate::ring::{self, RingBuffer, Sizing};
use crate::sync::{Arc, AtomicUsize, Ordering, UnsafeCell};
use crate::trace::{debug, trace};

type Slot<T> = UnsafeCell<MaybeUninit<T>>;

/// Creates an SPSC queue and splits it into its two handles.
///
/// # Errors
///
/// Returns [`InvalidCapacity`] if `capacity` is zero or too large to allocate.
pub fn channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), InvalidCapacity> {
    SpscQueue::new(capacity).map(SpscQueue::split)
}

/// A bounded SPSC ring buffer.
///
/// Construct with [`new`](Self::new), then [`split`](Self::split) into a
/// [`Producer`] and a [`Consumer`]. Neither handle can be cloned, so the
/// single-producer single-consumer contract holds by construction.
pub struct SpscQueue<T> {
    /// Next slot to read. Stored only by the consumer.
    head: CachePadded<AtomicUsize>,
    /// Next slot to write. Stored only by the producer.
    tail: CachePadded<AtomicUsize>,
    ring: RingBuffer<Slot<T>>,
}

// Safety: a slot is written only by the producer while it lies outside
// [head, tail) and read only by the consumer while it lies inside. The
// Release/Acquire pairs on `head` and `tail` order those accesses.
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// Allocates `capacity + 1` slots up front; nothing is allocated
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCapacity::Zero`] for a zero capacity and
    /// [`InvalidCapacity::TooLarge`] when the slot array cannot be allocated.
    ///
    /// # Example
    ///
    /// ```
    /// use ringq::{InvalidCapacity, SpscQueue};
    ///
    /// let queue = SpscQueue::<u32>::new(3).unwrap();
    /// assert_eq!(queue.capacity(), 3);
    ///
    /// assert_eq!(SpscQueue::<u32>::new(0).err(), Some(InvalidCapacity::Zero));
    /// ```
    pub fn new(capacity: usize) -> Result<Self, InvalidCapacity> {
        let size = ring::slot_count::<Slot<T>>(capacity, Sizing::Modulo)?;
        let ring = RingBuffer::new(size, |_| UnsafeCell::new(MaybeUninit::uninit()));

        debug!(capacity, slots = size, "allocated spsc ring");

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            ring,
        })
    }

    /// Splits the queue into its producer and consumer handles.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let queue = Arc::new(self);

        (
            Producer {
                queue: Arc::clone(&queue),
                cached_head: 0,
            },
            Consumer {
                queue,
                cached_tail: 0,
            },
        )
    }

    /// Maximum number of items the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.size() - 1
    }

    /// Number of resident items.
    ///
    /// Relaxed snapshot of both cursors; may be stale by the time it returns.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        if tail >= head {
            tail - head
        } else {
            tail + self.ring.size() - head
        }
    }

    /// Returns `true` if the queue holds no items.
    ///
    /// Relaxed snapshot of both cursors. It is not a synchronization point
    /// and says nothing about slot contents being visible to the caller.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == self.tail.load(Ordering::Relaxed)
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        if !mem::needs_drop::<T>() {
            return;
        }

        trace!(resident = self.len(), "dropping spsc queue");

        // Both handles are gone; the last Arc release made their stores visible.
        let mut head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);

        while head != tail {
            // SAFETY: head < size, and [head, tail) holds initialized items.
            let slot = unsafe { self.ring.get_unchecked(head) };
            slot.with_mut(|ptr| unsafe { ptr.cast::<T>().drop_in_place() });
            head = self.ring.next(head);
        }
    }
}

impl<T> fmt::Debug for SpscQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// The producing half of an SPSC queue.
pub struct Producer<T> {
    queue: Arc<SpscQueue<T>>,
    /// Last observed consumer cursor. Only refreshed when the queue looks full.
    cached_head: usize,
}

impl<T> Producer<T> {
    /// Attempts to enqueue `item`.
    ///
    /// Never blocks and never retries: a full queue is reported immediately
    /// and the queue is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(item))` if the queue is full.
    ///
    /// # Example
    ///
    /// ```
    /// use ringq::{spsc, Full};
    ///
    /// let (mut tx, mut rx) = spsc::channel::<u32>(2).unwrap();
    ///
    /// assert!(tx.enqueue(1).is_ok());
    /// assert!(tx.enqueue(2).is_ok());
    /// assert_eq!(tx.enqueue(3), Err(Full(3)));
    ///
    /// assert_eq!(rx.dequeue(), Some(1));
    /// assert!(tx.enqueue(3).is_ok());
    /// ```
    #[inline]
    pub fn enqueue(&mut self, item: T) -> Result<(), Full<T>> {
        let queue = &*self.queue;

        // Only this handle stores `tail`.
        let tail = queue.tail.load(Ordering::Relaxed);
        let next_tail = queue.ring.next(tail);

        if next_tail == self.cached_head {
            // Pairs with the consumer's Release store: every slot behind the
            // loaded head has been read out.
            self.cached_head = queue.head.load(Ordering::Acquire);
            if next_tail == self.cached_head {
                return Err(Full(item));
            }
        }

        // SAFETY: tail < size. The slot at `tail` is outside [head, tail), and
        // its previous occupant was read before the head value we acquired.
        let slot = unsafe { queue.ring.get_unchecked(tail) };
        slot.with_mut(|ptr| unsafe { ptr.cast::<T>().write(item) });

        // Publishes the write above to the consumer's Acquire load of `tail`.
        queue.tail.store(next_tail, Ordering::Release);

        Ok(())
    }

    /// Maximum number of items the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Advisory number of resident items. See [`SpscQueue::len`].
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Advisory emptiness snapshot. See [`SpscQueue::is_empty`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

/// The consuming half of an SPSC queue.
pub struct Consumer<T> {
    queue: Arc<SpscQueue<T>>,
    /// Last observed producer cursor. Only refreshed when the queue looks empty.
    cached_tail: usize,
}

impl<T> Consumer<T> {
    /// Attempts to dequeue the oldest item.
    ///
    /// Returns `None` if the queue is empty. Never blocks.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        let queue = &*self.queue;

        // Only this handle stores `head`.
        let head = queue.head.load(Ordering::Relaxed);

        if head == self.cached_tail {
            // Pairs with the producer's Release store: every slot before the
            // loaded tail is fully written.
            self.cached_tail = queue.tail.load(Ordering::Acquire);
            if head == self.cached_tail {
                return None;
            }
        }

        // SAFETY: head < size and lies in [head, tail), so the slot holds an
        // item whose write happened-before the tail value we acquired.
        let slot = unsafe { queue.ring.get_unchecked(head) };
        let item = slot.with(|ptr| unsafe { ptr.cast::<T>().read() });

        // Hands the slot back to the producer's Acquire load of `head`.
        queue.head.store(queue.ring.next(head), Ordering::Release);

        Some(item)
    }

    /// Maximum number of items the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Advisory number of resident items. See [`SpscQueue::len`].
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Advisory emptiness snapshot. See [`SpscQueue::is_empty`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
