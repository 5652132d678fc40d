//! Slot storage and index arithmetic shared by both queue variants.
//!
//! A ring always has more physical slots than usable capacity:
//!
//! ```text
//! Modulo       size = capacity + 1                (SPSC, one reserved slot)
//! PowerOfTwo   size = (capacity + 1).next_power_of_two()   (MPSC, mask)
//! ```
//!
//! The storage itself is a single boxed slice allocated once at construction
//! and never resized.

use std::alloc::Layout;
use std::mem;

use crate::error::InvalidCapacity;

/// How a requested capacity maps onto a physical slot count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sizing {
    /// `capacity + 1` slots; indices wrap with a compare, not a division.
    Modulo,
    /// `capacity + 1` rounded up to a power of two; indices wrap with a mask.
    PowerOfTwo,
}

/// Slot limit for zero-sized slots, which no allocation bound applies to.
/// Construction visits every slot, so this keeps it finite in practice.
pub(crate) const MAX_ZERO_SIZED_SLOTS: usize = 1 << 24;

/// Validates `capacity` and returns the number of physical slots of type `S`.
///
/// Rejects zero, and any capacity whose slot array could not be laid out in
/// a single allocation (`Layout::array` refuses anything above `isize::MAX`
/// bytes). Zero-sized slots are capped at [`MAX_ZERO_SIZED_SLOTS`].
pub(crate) fn slot_count<S>(capacity: usize, sizing: Sizing) -> Result<usize, InvalidCapacity> {
    if capacity == 0 {
        return Err(InvalidCapacity::Zero);
    }

    let too_large = InvalidCapacity::TooLarge {
        requested: capacity,
    };

    let size = capacity.checked_add(1).ok_or(too_large)?;
    let size = match sizing {
        Sizing::Modulo => size,
        Sizing::PowerOfTwo => size.checked_next_power_of_two().ok_or(too_large)?,
    };

    // Index arithmetic must never overflow, even for zero-sized slots.
    if size > isize::MAX as usize {
        return Err(too_large);
    }
    if mem::size_of::<S>() == 0 && size > MAX_ZERO_SIZED_SLOTS {
        return Err(too_large);
    }
    Layout::array::<S>(size).map_err(|_| too_large)?;

    Ok(size)
}

/// Fixed array of slots.
pub(crate) struct RingBuffer<S> {
    slots: Box<[S]>,
    mask: usize,
}

impl<S> RingBuffer<S> {
    /// Allocates `size` slots, building slot `i` with `init(i)`.
    ///
    /// `size` must come from [`slot_count`].
    pub(crate) fn new(size: usize, init: impl FnMut(usize) -> S) -> Self {
        debug_assert!(size >= 2);
        let slots: Box<[S]> = (0..size).map(init).collect();

        Self {
            slots,
            mask: size - 1,
        }
    }

    /// Number of physical slots.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.slots.len()
    }

    /// Advances an index in `[0, size)` by one, wrapping to zero at `size`.
    #[inline(always)]
    pub(crate) fn next(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.slots.len() { 0 } else { next }
    }

    /// Returns the slot at `index`.
    ///
    /// # Safety
    ///
    /// `index` must be less than [`size`](Self::size).
    #[inline(always)]
    pub(crate) unsafe fn get_unchecked(&self, index: usize) -> &S {
        debug_assert!(index < self.slots.len());
        // SAFETY: caller guarantees index < size.
        unsafe { self.slots.get_unchecked(index) }
    }

    /// Returns the slot a monotonically increasing position maps to.
    ///
    /// Only meaningful for [`Sizing::PowerOfTwo`] rings.
    #[inline(always)]
    pub(crate) fn masked(&self, position: usize) -> &S {
        debug_assert!(self.slots.len().is_power_of_two());
        // SAFETY: position & (size - 1) <= size - 1 for any size >= 1.
        unsafe { self.slots.get_unchecked(position & self.mask) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_rejected() {
        assert_eq!(
            slot_count::<u64>(0, Sizing::Modulo),
            Err(InvalidCapacity::Zero)
        );
        assert_eq!(
            slot_count::<u64>(0, Sizing::PowerOfTwo),
            Err(InvalidCapacity::Zero)
        );
    }

    #[test]
    fn modulo_reserves_one_slot() {
        assert_eq!(slot_count::<u64>(1, Sizing::Modulo), Ok(2));
        assert_eq!(slot_count::<u64>(3, Sizing::Modulo), Ok(4));
        assert_eq!(slot_count::<u64>(100_000, Sizing::Modulo), Ok(100_001));
    }

    #[test]
    fn power_of_two_rounds_up() {
        assert_eq!(slot_count::<u64>(1, Sizing::PowerOfTwo), Ok(2));
        assert_eq!(slot_count::<u64>(3, Sizing::PowerOfTwo), Ok(4));
        assert_eq!(slot_count::<u64>(4, Sizing::PowerOfTwo), Ok(8));
        assert_eq!(slot_count::<u64>((1 << 17) - 1, Sizing::PowerOfTwo), Ok(1 << 17));
    }

    #[test]
    fn oversized_rejected() {
        let requested = usize::MAX;
        assert_eq!(
            slot_count::<u8>(requested, Sizing::Modulo),
            Err(InvalidCapacity::TooLarge { requested })
        );

        // Fits in usize but not in a single allocation.
        let requested = usize::MAX / 8;
        assert_eq!(
            slot_count::<u64>(requested, Sizing::Modulo),
            Err(InvalidCapacity::TooLarge { requested })
        );

        // Rounding up to a power of two overflows.
        let requested = (usize::MAX >> 1) + 1;
        assert_eq!(
            slot_count::<u8>(requested, Sizing::PowerOfTwo),
            Err(InvalidCapacity::TooLarge { requested })
        );
    }

    #[test]
    fn zero_sized_slots_capped() {
        let requested = isize::MAX as usize - 1;
        assert_eq!(
            slot_count::<()>(requested, Sizing::Modulo),
            Err(InvalidCapacity::TooLarge { requested })
        );

        let requested = MAX_ZERO_SIZED_SLOTS;
        assert_eq!(
            slot_count::<()>(requested, Sizing::PowerOfTwo),
            Err(InvalidCapacity::TooLarge { requested })
        );

        assert_eq!(
            slot_count::<()>(MAX_ZERO_SIZED_SLOTS - 1, Sizing::Modulo),
            Ok(MAX_ZERO_SIZED_SLOTS)
        );
        // Sized slots are bounded by the allocation limit only.
        assert_eq!(
            slot_count::<u8>(MAX_ZERO_SIZED_SLOTS, Sizing::Modulo),
            Ok(MAX_ZERO_SIZED_SLOTS + 1)
        );
    }

    #[test]
    fn next_wraps_at_size() {
        let ring = RingBuffer::new(4, |i| i);
        assert_eq!(ring.size(), 4);
        assert_eq!(ring.next(0), 1);
        assert_eq!(ring.next(2), 3);
        assert_eq!(ring.next(3), 0);
    }

    #[test]
    fn masked_positions_cycle() {
        let ring = RingBuffer::new(8, |i| i);
        for position in 0..64 {
            assert_eq!(*ring.masked(position), position % 8);
        }
        assert_eq!(*ring.masked(usize::MAX), 7);
    }

    #[test]
    fn slots_initialized_in_order() {
        let ring = RingBuffer::new(5, |i| i * 10);
        for i in 0..5 {
            assert_eq!(unsafe { *ring.get_unchecked(i) }, i * 10);
        }
    }
}
