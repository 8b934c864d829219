//! Compare-and-swap engine over a single-capacity slot table.
//!
//! Position `p` lives in slot `p mod n` and belongs to cycle `p / n`. Each
//! slot walks through one state per cycle:
//!
//! ```text
//! (c, vacant) --producer--> (c, FULL) --consumer--> (c + 1, vacant)
//! ```
//!
//! Producers and consumers read their cursor, then race for the slot with a
//! compare-and-swap on its tag. The winner advances the cursor; a loser that
//! sees the slot already claimed for its cycle helps advance the cursor and
//! retries. No thread ever waits on another, but a thread can keep losing
//! races, so the engine is lock-free rather than wait-free.

use core::cmp;
use core::fmt;
use core::marker::PhantomData;

use crossbeam_utils::CachePadded;

use crate::codec::{distance, Tag};
use crate::cursor::Access;
use crate::error::{Full, WouldBlock};
use crate::queue::{Drain, Queue};
use crate::select::{round_capacity, EngineKind};
use crate::slot::Slot;
use crate::sync::{AtomicU64, Ordering};

/// Bounded multi-access queue with compare-and-swap slot claiming.
///
/// Uses half the slots of [`Scq`](crate::Scq) at the price of a retry loop
/// under contention. There is no threshold, so [`Drain`] is a no-op here.
pub struct Compact<S, P, C> {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    slots: Box<[S]>,
    mask: u64,
    order: u32,
    _access: PhantomData<(P, C)>,
}

impl<S: Slot, P: Access, C: Access> Compact<S, P, C> {
    const NOT_SPSC: () = assert!(
        !(P::EXCLUSIVE && C::EXCLUSIVE),
        "single-producer/single-consumer queues are served by Lamport"
    );

    /// Creates a queue holding `capacity` elements, rounded up to a power of
    /// two.
    pub fn new(capacity: usize) -> Self {
        Self::with_start(capacity, 0)
    }

    /// Like [`new`](Self::new) with both cursors starting at `position`.
    pub fn with_start(capacity: usize, position: u64) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NOT_SPSC;

        let capacity = round_capacity(capacity);
        let mask = capacity as u64 - 1;
        let order = capacity.trailing_zeros();
        // Slot `i` starts vacant for the first position at or after
        // `position` that maps to it.
        let slots = (0..capacity as u64)
            .map(|i| {
                let first = position.wrapping_add(i.wrapping_sub(position) & mask);
                S::vacant(first >> order)
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let queue = Compact {
            head: CachePadded::new(AtomicU64::new(position)),
            tail: CachePadded::new(AtomicU64::new(position)),
            slots,
            mask,
            order,
            _access: PhantomData,
        };
        tracing::debug!(
            engine = ?queue.engine(),
            capacity,
            slots = capacity,
            "queue constructed"
        );
        queue
    }

    #[inline]
    fn slot(&self, pos: u64) -> &S {
        &self.slots[(pos & self.mask) as usize]
    }

    #[inline]
    fn cycle(&self, pos: u64) -> u64 {
        pos >> self.order
    }

    /// Appends `item` unless the slot at the tail still holds the previous
    /// lap's element.
    pub fn enqueue(&self, mut item: S::Item) -> Result<(), Full<S::Item>> {
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let cycle = self.cycle(tail);
            let slot = self.slot(tail);
            let seen = slot.tag();

            match seen.cmp_cycle(cycle) {
                cmp::Ordering::Equal if seen.is_vacant() => {
                    match slot.try_put(seen, cycle, item) {
                        Ok(()) => {
                            P::advance(&self.tail, tail);
                            return Ok(());
                        }
                        Err((_, rejected)) => item = rejected,
                    }
                }
                // Another producer claimed `tail` but has not advanced it.
                cmp::Ordering::Equal | cmp::Ordering::Greater => {
                    if !P::EXCLUSIVE {
                        P::advance(&self.tail, tail);
                    }
                }
                cmp::Ordering::Less => {
                    if self.tail.load(Ordering::Acquire) == tail {
                        return Err(Full(item));
                    }
                }
            }
        }
    }

    /// Removes the oldest element, or reports [`WouldBlock`] when the slot at
    /// the head has nothing published for its cycle.
    pub fn dequeue(&self) -> Result<S::Item, WouldBlock> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let cycle = self.cycle(head);
            let slot = self.slot(head);
            let seen = slot.tag();

            match seen.cmp_cycle(cycle) {
                cmp::Ordering::Equal if seen.is_full() && !seen.is_busy() => {
                    if let Ok(item) = slot.try_take(seen, Tag::vacant(cycle.wrapping_add(1))) {
                        C::advance(&self.head, head);
                        return Ok(item);
                    }
                }
                // Another consumer is reading `head` or already released it.
                cmp::Ordering::Equal if seen.is_full() => {
                    if !C::EXCLUSIVE {
                        C::advance(&self.head, head);
                    }
                }
                cmp::Ordering::Greater => {
                    if !C::EXCLUSIVE {
                        C::advance(&self.head, head);
                    }
                }
                // Nothing published yet for this cycle.
                cmp::Ordering::Equal | cmp::Ordering::Less => {
                    if self.head.load(Ordering::Acquire) == head {
                        return Err(WouldBlock);
                    }
                }
            }
        }
    }

    /// No threshold to disable; kept so every multi-access engine offers the
    /// same capability.
    pub fn drain(&self) {
        tracing::trace!(engine = ?self.engine(), "drain requested on compact layout");
    }

    /// Maximum number of elements, after rounding.
    pub fn capacity(&self) -> usize {
        (self.mask + 1) as usize
    }

    /// Elements currently held. A snapshot under concurrent use.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        distance(tail, head).clamp(0, self.capacity() as i64) as usize
    }

    /// `true` when [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which variant this instantiation is.
    pub fn engine(&self) -> EngineKind {
        match (P::EXCLUSIVE, C::EXCLUSIVE) {
            (false, true) => EngineKind::CompactMpsc,
            (true, false) => EngineKind::CompactSpmc,
            _ => EngineKind::CompactMpmc,
        }
    }
}

impl<S: Slot, P: Access, C: Access> Queue for Compact<S, P, C> {
    type Item = S::Item;

    fn enqueue(&self, item: S::Item) -> Result<(), Full<S::Item>> {
        Compact::enqueue(self, item)
    }

    fn dequeue(&self) -> Result<S::Item, WouldBlock> {
        Compact::dequeue(self)
    }

    fn capacity(&self) -> usize {
        Compact::capacity(self)
    }

    fn len(&self) -> usize {
        Compact::len(self)
    }

    fn engine(&self) -> EngineKind {
        Compact::engine(self)
    }
}

impl<S: Slot, P: Access, C: Access> Drain for Compact<S, P, C> {
    fn drain(&self) {
        Compact::drain(self)
    }
}

impl<S: Slot, P: Access, C: Access> fmt::Debug for Compact<S, P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compact")
            .field("engine", &self.engine())
            .field("capacity", &self.capacity())
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .finish()
    }
}
