//! Error types shared by both queue variants.

use std::fmt;

/// A queue could not be constructed with the requested capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCapacity {
    /// A queue with zero usable slots cannot hold anything.
    #[error("capacity must be non-zero")]
    Zero,
    /// The slot array for this capacity cannot be addressed or allocated.
    #[error("capacity {requested} exceeds the allocatable slot array size")]
    TooLarge {
        /// The capacity that was asked for.
        requested: usize,
    },
}

/// Returned by `enqueue` when the queue is full.
///
/// Carries the rejected value so it is not lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T: fmt::Debug> std::error::Error for Full<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(InvalidCapacity::Zero.to_string(), "capacity must be non-zero");
        assert_eq!(
            InvalidCapacity::TooLarge { requested: 7 }.to_string(),
            "capacity 7 exceeds the allocatable slot array size"
        );
        assert_eq!(Full(3u8).to_string(), "queue is full");
    }

    #[test]
    fn full_returns_value() {
        let err = Full(String::from("payload"));
        assert_eq!(err.into_inner(), "payload");
    }
}
