//! Cardinality markers for the producer and consumer sides of an engine.

use crate::sync::{AtomicU64, Ordering};

mod sealed {
    pub trait Sealed {}
}

/// How many threads may advance one cursor.
///
/// Chosen at the type level when the queue is built. Nothing checks it at
/// runtime: handing a [`Single`] side to two threads is a data race.
pub trait Access: sealed::Sealed + Send + Sync + 'static {
    /// Exactly one thread owns the cursor.
    const EXCLUSIVE: bool;

    /// Reserves the next position with a single atomic step.
    fn reserve(cursor: &AtomicU64) -> u64;

    /// Moves `cursor` from `from` to `from + 1` after a successful claim.
    ///
    /// With shared access any thread that sees the claim may do this on the
    /// claimer's behalf, so losing the race is fine.
    fn advance(cursor: &AtomicU64, from: u64);
}

/// One thread owns this side of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Single;

/// Any number of threads share this side of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Multi;

impl sealed::Sealed for Single {}
impl sealed::Sealed for Multi {}

impl Access for Single {
    const EXCLUSIVE: bool = true;

    #[inline]
    fn reserve(cursor: &AtomicU64) -> u64 {
        let pos = cursor.load(Ordering::Relaxed);
        cursor.store(pos.wrapping_add(1), Ordering::SeqCst);
        pos
    }

    #[inline]
    fn advance(cursor: &AtomicU64, from: u64) {
        cursor.store(from.wrapping_add(1), Ordering::SeqCst);
    }
}

impl Access for Multi {
    const EXCLUSIVE: bool = false;

    #[inline]
    fn reserve(cursor: &AtomicU64) -> u64 {
        cursor.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    fn advance(cursor: &AtomicU64, from: u64) {
        let _ = cursor.compare_exchange(
            from,
            from.wrapping_add(1),
            Ordering::SeqCst,
            Ordering::Relaxed,
        );
    }
}
