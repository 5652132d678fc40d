//! Multi-producer single-consumer (MPSC) bounded queue.
//!
//! Producers race for the next position with a compare-and-swap on `tail`.
//! The winner owns that slot exclusively, writes the item, and only then
//! publishes it by storing the slot's *stamp*. The consumer never infers
//! occupancy from `tail`: it waits on the stamp of the slot at `head`, so an
//! item is always visible by the time the consumer can see its slot is full.
//!
//! Positions are monotonically increasing (wrapping) counters and the slot
//! index is `position & mask`. The slot count is `capacity + 1` rounded up to
//! a power of two.
//!
//! ```text
//!  stamp == position + 1   slot holds the published item for `position`
//!  anything else           empty, or reserved and still being written
//! ```
//!
//! A producer that has won a position but not yet published it holds up the
//! consumer at that position. Items committed behind it by faster producers
//! are delivered once it publishes, so consumption follows reservation order.
//!
//! # Example
//!
//! ```
//! use ringq::mpsc;
//! use std::thread;
//!
//! let (tx, mut rx) = mpsc::channel::<u64>(1024).unwrap();
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|id| {
//!         let tx = tx.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 while tx.enqueue(id * 1000 + i).is_err() {
//!                     std::hint::spin_loop();
//!                 }
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let mut received = Vec::new();
//! while received.len() < 400 {
//!     match rx.dequeue() {
//!         Some(value) => received.push(value),
//!         None => std::hint::spin_loop(),
//!     }
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! assert!(rx.is_empty());
//! ```

use std::fmt;
use std::mem::{self, MaybeUninit};

use crossbeam_utils::{Backoff, CachePadded};

use crate::error::{Full, InvalidCapacity};
use crate::ring::{self, RingBuffer, Sizing};
use crate::sync::{Arc, AtomicUsize, Ordering, UnsafeCell};
use crate::trace::{debug, trace};

/// A slot in the sequenced ring.
struct Slot<T> {
    /// `position + 1` of the last item published into this slot.
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Creates an MPSC queue and splits it into its handles.
///
/// # Errors
///
/// Returns [`InvalidCapacity`] if `capacity` is zero or too large to allocate.
pub fn channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), InvalidCapacity> {
    MpscQueue::new(capacity).map(MpscQueue::split)
}

/// A bounded MPSC ring buffer.
///
/// Construct with [`new`](Self::new), then [`split`](Self::split) into a
/// cloneable [`Producer`] and a single [`Consumer`].
pub struct MpscQueue<T> {
    /// Next position to read. Stored only by the consumer.
    head: CachePadded<AtomicUsize>,
    /// Next position to reserve. Advanced by producers via CAS.
    tail: CachePadded<AtomicUsize>,
    capacity: usize,
    ring: RingBuffer<Slot<T>>,
}

// Safety: a slot's value is written only by the producer that reserved its
// position, and read only by the consumer after observing the stamp that
// producer stored with Release.
unsafe impl<T: Send> Sync for MpscQueue<T> {}

impl<T> MpscQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// Every slot is written during construction so no thread pays a page
    /// fault on its first access.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCapacity::Zero`] for a zero capacity and
    /// [`InvalidCapacity::TooLarge`] when the rounded slot array cannot be
    /// allocated.
    ///
    /// # Example
    ///
    /// ```
    /// use ringq::MpscQueue;
    ///
    /// let queue = MpscQueue::<u32>::new(100).unwrap();
    /// assert_eq!(queue.capacity(), 100);
    /// assert!(queue.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Result<Self, InvalidCapacity> {
        let size = ring::slot_count::<Slot<T>>(capacity, Sizing::PowerOfTwo)?;

        // Slot `i` starts out as if it had held position `i - size`.
        let ring = RingBuffer::new(size, |i| Slot {
            stamp: AtomicUsize::new(i.wrapping_sub(size).wrapping_add(1)),
            value: UnsafeCell::new(MaybeUninit::zeroed()),
        });

        debug!(capacity, slots = size, "allocated mpsc ring");

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            capacity,
            ring,
        })
    }

    /// Splits the queue into a cloneable producer and the single consumer.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let queue = Arc::new(self);

        (
            Producer {
                queue: Arc::clone(&queue),
            },
            Consumer { queue },
        )
    }

    /// Maximum number of items the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of reserved or resident items, clamped to the capacity.
    ///
    /// Advisory only: positions that are reserved but not yet published
    /// count as resident.
    #[inline]
    pub fn len(&self) -> usize {
        // Acquire keeps the later tail load from reading a value older than
        // the reservation that allowed this head.
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        tail.wrapping_sub(head).min(self.capacity)
    }

    /// Returns `true` if no position is reserved or resident.
    ///
    /// Relaxed snapshot of both cursors, not a synchronization point. A
    /// `false` result does not mean `dequeue` will succeed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == self.tail.load(Ordering::Relaxed)
    }

    /// Reserves the next position for writing.
    ///
    /// Returns `None` when the queue is full. Retries only when another
    /// producer won the race for the same position.
    #[inline]
    fn reserve(&self) -> Option<usize> {
        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            // Pairs with the consumer's Release store: the slot for `tail` was
            // read out before head moved past its previous occupant.
            let head = self.head.load(Ordering::Acquire);

            if tail.wrapping_sub(head) >= self.capacity {
                // head was loaded after tail. If tail has not moved since, the
                // snapshot was consistent and the queue is full.
                let current = self.tail.load(Ordering::Relaxed);
                if current == tail {
                    return None;
                }
                tail = current;
                continue;
            }

            // Relaxed: the CAS only arbitrates ownership of `tail`; slot
            // contents are ordered by the stamp, not by this cursor.
            match self.tail.compare_exchange_weak(
                tail,
                tail.wrapping_add(1),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(tail),
                Err(current) => {
                    tail = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Writes `item` into a reserved position and publishes it.
    ///
    /// # Safety
    ///
    /// `position` must come from a successful [`reserve`](Self::reserve) and
    /// must be committed exactly once.
    #[inline]
    unsafe fn commit(&self, position: usize, item: T) {
        let slot = self.ring.masked(position);
        slot.value
            .with_mut(|ptr| unsafe { ptr.cast::<T>().write(item) });

        // Publishes the write above to the consumer's Acquire load of the stamp.
        slot.stamp
            .store(position.wrapping_add(1), Ordering::Release);
    }
}

impl<T> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        if !mem::needs_drop::<T>() {
            return;
        }

        trace!(resident = self.len(), "dropping mpsc queue");

        // All handles are gone; the last Arc release made their stores visible.
        let tail = self.tail.load(Ordering::Relaxed);
        let mut position = self.head.load(Ordering::Relaxed);

        while position != tail {
            let slot = self.ring.masked(position);
            // Positions reserved but never committed hold nothing.
            if slot.stamp.load(Ordering::Relaxed) == position.wrapping_add(1) {
                slot.value
                    .with_mut(|ptr| unsafe { ptr.cast::<T>().drop_in_place() });
            }
            position = position.wrapping_add(1);
        }
    }
}

impl<T> fmt::Debug for MpscQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpscQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// The producing half of an MPSC queue.
///
/// Clone it to add producers; every clone feeds the same queue.
pub struct Producer<T> {
    queue: Arc<MpscQueue<T>>,
}

impl<T> Producer<T> {
    /// Attempts to enqueue `item`.
    ///
    /// Never blocks. Lost races against other producers are retried
    /// internally; a full queue is reported immediately.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(item))` if the queue is full.
    ///
    /// # Example
    ///
    /// ```
    /// use ringq::{mpsc, Full};
    ///
    /// let (tx, mut rx) = mpsc::channel::<u32>(2).unwrap();
    ///
    /// assert!(tx.enqueue(1).is_ok());
    /// assert!(tx.clone().enqueue(2).is_ok());
    /// assert_eq!(tx.enqueue(3), Err(Full(3)));
    ///
    /// assert_eq!(rx.dequeue(), Some(1));
    /// assert!(tx.enqueue(3).is_ok());
    /// ```
    #[inline]
    pub fn enqueue(&self, item: T) -> Result<(), Full<T>> {
        match self.queue.reserve() {
            Some(position) => {
                // SAFETY: `position` was just reserved by this call.
                unsafe { self.queue.commit(position, item) };
                Ok(())
            }
            None => Err(Full(item)),
        }
    }

    /// Maximum number of items the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Advisory number of items. See [`MpscQueue::len`].
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Advisory emptiness snapshot. See [`MpscQueue::is_empty`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

/// The consuming half of an MPSC queue. There is exactly one.
pub struct Consumer<T> {
    queue: Arc<MpscQueue<T>>,
}

impl<T> Consumer<T> {
    /// Attempts to dequeue the item at the head position.
    ///
    /// Returns `None` if the queue is empty, or if the producer that reserved
    /// the head position has not finished publishing it. Never blocks.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        let queue = &*self.queue;

        // Only this handle stores `head`.
        let head = queue.head.load(Ordering::Relaxed);
        let slot = queue.ring.masked(head);

        // Pairs with the Release store in `commit`: the value is fully written.
        if slot.stamp.load(Ordering::Acquire) != head.wrapping_add(1) {
            return None;
        }

        let item = slot.value.with(|ptr| unsafe { ptr.cast::<T>().read() });

        // Hands the slot back to producers' Acquire load of `head`.
        queue.head.store(head.wrapping_add(1), Ordering::Release);

        Some(item)
    }

    /// Maximum number of items the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Advisory number of items. See [`MpscQueue::len`].
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Advisory emptiness snapshot. See [`MpscQueue::is_empty`].
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
