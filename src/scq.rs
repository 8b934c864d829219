//! Fetch-and-add engine over a doubled slot table.
//!
//! A queue of capacity `n` owns `2n` slots. Position `p` lives in slot
//! `p mod 2n` and belongs to cycle `p / 2n`. Producers and consumers reserve
//! positions with a single fetch-and-add and never retry on cursor
//! contention; what they find in the slot decides the rest:
//!
//! - a producer claims the slot only if it is vacant for an older cycle, and
//!   takes a fresh position otherwise;
//! - a consumer takes the element if the slot is full for its own cycle,
//!   waits briefly if the producer is still copying, and otherwise moves the
//!   slot's cycle forward (or marks it unsafe) so a late producer cannot
//!   publish into a position nobody will read.
//!
//! Before reserving anything a producer takes one unit of `room`, a counter of
//! free capacity that consumers give back as they take elements. A producer
//! that finds no room returns [`Full`] with `tail` untouched, so accepted
//! elements never outnumber the capacity, however many producers race.
//!
//! Consumers that keep finding nothing burn a shared threshold. Once it goes
//! negative they stop reserving until the next successful enqueue resets it,
//! which bounds how far they can run ahead of producers and rules out
//! livelock. [`Drain`] turns the threshold off for a final sweep.

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
use crate::sync::{AtomicBool, AtomicI64, AtomicU64, Backoff, Ordering};

struct Gate {
    threshold: AtomicI64,
    draining: AtomicBool,
}

/// Bounded multi-access queue with fetch-and-add reservation.
///
/// `P` and `C` declare whether producers and consumers are
/// [`Single`](crate::Single) or [`Multi`](crate::Multi). Using more threads
/// on a side than declared is a data race.
///
/// Operations are lock-free, not wait-free. A consumer whose position is
/// still being written (the slot is tagged `BUSY` for its cycle) waits for
/// that one producer to finish copying its element. The wait covers a single
/// payload write, but nothing bounds it if the producer is preempted between
/// claiming and publishing the slot.
pub struct Scq<S, P, C> {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    room: CachePadded<AtomicI64>,
    gate: CachePadded<Gate>,
    slots: Box<[S]>,
    capacity: u64,
    order: u32,
    _access: PhantomData<(P, C)>,
}

impl<S: Slot, P: Access, C: Access> Scq<S, P, C> {
    const NOT_SPSC: () = assert!(
        !(P::EXCLUSIVE && C::EXCLUSIVE),
        "single-producer/single-consumer queues are served by Lamport"
    );

    /// Creates a queue holding `capacity` elements, rounded up to a power of
    /// two.
    pub fn new(capacity: usize) -> Self {
        let slots = round_capacity(capacity) as u64 * 2;
        Self::with_start(capacity, slots)
    }

    /// Like [`new`](Self::new) with both cursors starting at `position`.
    pub fn with_start(capacity: usize, position: u64) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NOT_SPSC;

        let capacity = round_capacity(capacity);
        let slots = capacity * 2;
        let order = slots.trailing_zeros();
        let initial = (position >> order).wrapping_sub(1);
        let slots = (0..slots)
            .map(|_| S::vacant(initial))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let queue = Scq {
            head: CachePadded::new(AtomicU64::new(position)),
            tail: CachePadded::new(AtomicU64::new(position)),
            room: CachePadded::new(AtomicI64::new(capacity as i64)),
            gate: CachePadded::new(Gate {
                threshold: AtomicI64::new(-1),
                draining: AtomicBool::new(false),
            }),
            slots,
            capacity: capacity as u64,
            order,
            _access: PhantomData,
        };
        tracing::debug!(
            engine = ?queue.engine(),
            capacity,
            slots = queue.slots.len(),
            threshold = queue.threshold_max(),
            "queue constructed"
        );
        queue
    }

    #[inline]
    fn threshold_max(&self) -> i64 {
        3 * self.capacity as i64 - 1
    }

    #[inline]
    fn slot(&self, pos: u64) -> &S {
        &self.slots[(pos & (self.slots.len() as u64 - 1)) as usize]
    }

    #[inline]
    fn cycle(&self, pos: u64) -> u64 {
        pos >> self.order
    }

    /// Appends `item` unless the queue already holds `capacity` elements.
    pub fn enqueue(&self, mut item: S::Item) -> Result<(), Full<S::Item>> {
        if !self.acquire_room() {
            return Err(Full(item));
        }
        // The unit of room stays ours across retries.
        loop {
            let pos = self.reserve_tail();
            match self.try_publish(pos, item) {
                Ok(()) => {
                    self.reset_threshold();
                    return Ok(());
                }
                Err(rejected) => item = rejected,
            }
        }
    }

    /// Takes one unit of free capacity. A failed attempt is handed straight
    /// back.
    #[inline]
    fn acquire_room(&self) -> bool {
        if self.room.fetch_sub(1, Ordering::SeqCst) > 0 {
            return true;
        }
        self.room.fetch_add(1, Ordering::SeqCst);
        false
    }

    #[inline]
    fn release_room(&self) {
        self.room.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    fn reserve_tail(&self) -> u64 {
        if P::EXCLUSIVE {
            // Everything below `head` was already passed by consumers.
            let head = self.head.load(Ordering::SeqCst);
            let tail = self.tail.load(Ordering::Relaxed);
            let pos = if distance(head, tail) > 0 { head } else { tail };
            self.tail.store(pos.wrapping_add(1), Ordering::SeqCst);
            pos
        } else {
            P::reserve(&self.tail)
        }
    }

    fn try_publish(&self, pos: u64, mut item: S::Item) -> Result<(), S::Item> {
        let cycle = self.cycle(pos);
        let slot = self.slot(pos);
        let mut seen = slot.tag();
        loop {
            if seen.cmp_cycle(cycle) != cmp::Ordering::Less || !seen.is_vacant() {
                return Err(item);
            }
            // An unsafe slot is only usable if no consumer has reached `pos`.
            if seen.is_unsafe() && distance(self.head.load(Ordering::SeqCst), pos) > 0 {
                return Err(item);
            }
            match slot.try_put(seen, cycle, item) {
                Ok(()) => return Ok(()),
                Err((found, rejected)) => {
                    seen = found;
                    item = rejected;
                }
            }
        }
    }

    #[inline]
    fn reset_threshold(&self) {
        let max = self.threshold_max();
        if self.gate.threshold.load(Ordering::SeqCst) != max {
            self.gate.threshold.store(max, Ordering::SeqCst);
        }
    }

    #[inline]
    fn is_draining(&self) -> bool {
        self.gate.draining.load(Ordering::Acquire)
    }

    /// Removes the oldest element, or reports [`WouldBlock`] when the queue
    /// is empty or the threshold has closed.
    pub fn dequeue(&self) -> Result<S::Item, WouldBlock> {
        if !self.is_draining() && self.gate.threshold.load(Ordering::SeqCst) < 0 {
            return Err(WouldBlock);
        }

        loop {
            let pos = C::reserve(&self.head);
            if let Some(item) = self.try_consume(pos) {
                self.release_room();
                return Ok(item);
            }

            let next = pos.wrapping_add(1);
            let tail = self.tail.load(Ordering::SeqCst);
            if distance(tail, next) <= 0 {
                if !P::EXCLUSIVE {
                    self.catch_up(tail, next);
                }
                self.gate.threshold.fetch_sub(1, Ordering::SeqCst);
                return Err(WouldBlock);
            }
            if self.gate.threshold.fetch_sub(1, Ordering::SeqCst) <= 0 && !self.is_draining() {
                return Err(WouldBlock);
            }
        }
    }

    fn try_consume(&self, pos: u64) -> Option<S::Item> {
        let cycle = self.cycle(pos);
        let slot = self.slot(pos);
        let backoff = Backoff::new();
        let mut seen = slot.tag();
        loop {
            match seen.cmp_cycle(cycle) {
                cmp::Ordering::Equal if seen.is_full() => {
                    // SAFETY: `pos` was reserved by this call alone and the
                    // slot is full for its cycle.
                    return Some(unsafe { slot.take() });
                }
                cmp::Ordering::Equal if seen.is_busy() => {
                    // The producer of `pos` claimed the slot and is writing
                    // its element. Only that one write stands between us and
                    // the value, so wait it out rather than give up `pos`.
                    backoff.snooze();
                    seen = slot.tag();
                }
                cmp::Ordering::Equal | cmp::Ordering::Greater => return None,
                cmp::Ordering::Less => {
                    let next = if seen.is_vacant() {
                        Tag::vacant(cycle)
                    } else if seen.is_unsafe() {
                        return None;
                    } else {
                        seen.with(Tag::UNSAFE)
                    };
                    match slot.swap_tag(seen, next) {
                        Ok(()) => return None,
                        Err(found) => seen = found,
                    }
                }
            }
        }
    }

    /// Pulls `tail` up to `head` so producers stop reserving positions that
    /// consumers already skipped.
    fn catch_up(&self, mut tail: u64, mut head: u64) {
        while self
            .tail
            .compare_exchange_weak(tail, head, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            head = self.head.load(Ordering::SeqCst);
            tail = self.tail.load(Ordering::SeqCst);
            if distance(tail, head) >= 0 {
                break;
            }
        }
    }

    /// Disables the threshold for good. See [`Drain::drain`].
    pub fn drain(&self) {
        if !self.gate.draining.swap(true, Ordering::AcqRel) {
            tracing::debug!(engine = ?self.engine(), "threshold disabled for drain");
        }
    }

    /// Maximum number of elements, after rounding.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Accepted elements not yet dequeued. Exact when no operation is in
    /// flight, a snapshot otherwise.
    pub fn len(&self) -> usize {
        let room = self.room.load(Ordering::SeqCst);
        (self.capacity as i64 - room).clamp(0, self.capacity as i64) as usize
    }

    /// `true` when [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which variant this instantiation is.
    pub fn engine(&self) -> EngineKind {
        match (P::EXCLUSIVE, C::EXCLUSIVE) {
            (false, true) => EngineKind::FaaMpsc,
            (true, false) => EngineKind::FaaSpmc,
            _ => EngineKind::FaaMpmc,
        }
    }
}

impl<S: Slot, P: Access, C: Access> Queue for Scq<S, P, C> {
    type Item = S::Item;

    fn enqueue(&self, item: S::Item) -> Result<(), Full<S::Item>> {
        Scq::enqueue(self, item)
    }

    fn dequeue(&self) -> Result<S::Item, WouldBlock> {
        Scq::dequeue(self)
    }

    fn capacity(&self) -> usize {
        Scq::capacity(self)
    }

    fn len(&self) -> usize {
        Scq::len(self)
    }

    fn engine(&self) -> EngineKind {
        Scq::engine(self)
    }
}

impl<S: Slot, P: Access, C: Access> Drain for Scq<S, P, C> {
    fn drain(&self) {
        Scq::drain(self)
    }
}

impl<S: Slot, P: Access, C: Access> fmt::Debug for Scq<S, P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scq")
            .field("engine", &self.engine())
            .field("capacity", &self.capacity)
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .field("room", &self.room.load(Ordering::Relaxed))
            .field("threshold", &self.gate.threshold.load(Ordering::Relaxed))
            .field("draining", &self.gate.draining.load(Ordering::Relaxed))
            .finish()
    }
}
