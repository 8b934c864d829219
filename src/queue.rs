//! The operations every engine shares.

use crate::error::{Full, WouldBlock};
use crate::select::EngineKind;

/// Operations shared by every engine.
///
/// FIFO order is the order in which positions are reserved, not the order
/// in which calls return. Neither operation retries on the caller's behalf.
pub trait Queue {
    /// Element type.
    type Item;

    /// Appends `item`, or hands it back inside [`Full`] when the queue is at
    /// capacity.
    fn enqueue(&self, item: Self::Item) -> Result<(), Full<Self::Item>>;

    /// Removes the oldest element, or reports [`WouldBlock`] when there is
    /// none to take.
    fn dequeue(&self) -> Result<Self::Item, WouldBlock>;

    /// Element capacity; a power of two fixed at construction.
    fn capacity(&self) -> usize;

    /// Approximate number of buffered elements. Exact only while no other
    /// thread is operating on the queue.
    fn len(&self) -> usize;

    /// `true` when [`len`](Self::len) is zero.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which engine serves this queue.
    fn engine(&self) -> EngineKind;
}

/// Terminal drain for multi-access engines.
pub trait Drain: Queue {
    /// Permanently disables the livelock threshold so consumers keep
    /// scanning until they reach the tail.
    ///
    /// Only call this once every producer has stopped for good; it is not
    /// synchronized with concurrent `enqueue` calls.
    fn drain(&self);
}
