//! Wait-free single-producer/single-consumer ring.
//!
//! The producer owns `tail`, the consumer owns `head`. Each side keeps a
//! private copy of the other's cursor and only reloads it when the copy says
//! the ring is full (producer) or empty (consumer), so the common case
//! touches no cache line the other side writes.

use core::cell::UnsafeCell;
use core::fmt;
use core::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::error::{Full, WouldBlock};
use crate::queue::Queue;
use crate::select::{round_capacity, EngineKind};
use crate::sync::{AtomicU64, Ordering};

struct ProducerSide {
    tail: AtomicU64,
    /// Last observed `head`. Producer-private.
    cached_head: UnsafeCell<u64>,
}

struct ConsumerSide {
    head: AtomicU64,
    /// Last observed `tail`. Consumer-private.
    cached_tail: UnsafeCell<u64>,
}

/// Bounded SPSC queue (Lamport ring with cached peer cursors).
///
/// Exactly one thread may enqueue and exactly one thread may dequeue at any
/// time. Both operations are wait-free.
pub struct Lamport<T> {
    producer: CachePadded<ProducerSide>,
    consumer: CachePadded<ConsumerSide>,
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u64,
}

// SAFETY: each payload cell is written only by the producer before it
// publishes `tail`, and read only by the consumer after it observes that
// `tail`. The cached cursors are each touched by one side only.
unsafe impl<T: Send> Send for Lamport<T> {}
unsafe impl<T: Send> Sync for Lamport<T> {}

impl<T> Lamport<T> {
    /// Creates a ring holding `capacity` elements, rounded up to a power of
    /// two.
    pub fn new(capacity: usize) -> Self {
        Self::with_start(capacity, 0)
    }

    /// Like [`new`](Self::new) with both cursors starting at `position`.
    ///
    /// Useful to exercise cursor wraparound without pushing billions of
    /// elements first.
    pub fn with_start(capacity: usize, position: u64) -> Self {
        let capacity = round_capacity(capacity);
        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        tracing::debug!(engine = "lamport", capacity, slots = capacity, "queue constructed");

        Lamport {
            producer: CachePadded::new(ProducerSide {
                tail: AtomicU64::new(position),
                cached_head: UnsafeCell::new(position),
            }),
            consumer: CachePadded::new(ConsumerSide {
                head: AtomicU64::new(position),
                cached_tail: UnsafeCell::new(position),
            }),
            buffer,
            mask: capacity as u64 - 1,
        }
    }

    #[inline]
    fn cell(&self, pos: u64) -> *mut MaybeUninit<T> {
        self.buffer[(pos & self.mask) as usize].get()
    }

    /// Appends `item`. Must only be called from the producer thread.
    pub fn enqueue(&self, item: T) -> Result<(), Full<T>> {
        let tail = self.producer.tail.load(Ordering::Relaxed);
        let cached_head = self.producer.cached_head.get();
        let capacity = self.mask + 1;

        if tail.wrapping_sub(unsafe { *cached_head }) >= capacity {
            let head = self.consumer.head.load(Ordering::Acquire);
            unsafe { *cached_head = head };
            if tail.wrapping_sub(head) >= capacity {
                return Err(Full(item));
            }
        }

        unsafe { (*self.cell(tail)).write(item) };
        self.producer
            .tail
            .store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Removes the oldest element. Must only be called from the consumer
    /// thread.
    pub fn dequeue(&self) -> Result<T, WouldBlock> {
        let head = self.consumer.head.load(Ordering::Relaxed);
        let cached_tail = self.consumer.cached_tail.get();

        if unsafe { *cached_tail } == head {
            let tail = self.producer.tail.load(Ordering::Acquire);
            unsafe { *cached_tail = tail };
            if tail == head {
                return Err(WouldBlock);
            }
        }

        let item = unsafe { (*self.cell(head)).assume_init_read() };
        self.consumer
            .head
            .store(head.wrapping_add(1), Ordering::Release);
        Ok(item)
    }

    /// Maximum number of elements, after rounding.
    pub fn capacity(&self) -> usize {
        (self.mask + 1) as usize
    }

    /// Elements currently held. A snapshot under concurrent use.
    pub fn len(&self) -> usize {
        let head = self.consumer.head.load(Ordering::Acquire);
        let tail = self.producer.tail.load(Ordering::Acquire);
        (tail.wrapping_sub(head) as usize).min(self.capacity())
    }

    /// `true` when [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send> Queue for Lamport<T> {
    type Item = T;

    fn enqueue(&self, item: T) -> Result<(), Full<T>> {
        Lamport::enqueue(self, item)
    }

    fn dequeue(&self) -> Result<T, WouldBlock> {
        Lamport::dequeue(self)
    }

    fn capacity(&self) -> usize {
        Lamport::capacity(self)
    }

    fn len(&self) -> usize {
        Lamport::len(self)
    }

    fn engine(&self) -> EngineKind {
        EngineKind::Lamport
    }
}

impl<T> Drop for Lamport<T> {
    fn drop(&mut self) {
        let mut pos = self.consumer.head.load(Ordering::Relaxed);
        let tail = self.producer.tail.load(Ordering::Relaxed);
        while pos != tail {
            unsafe { (*self.cell(pos)).assume_init_drop() };
            pos = pos.wrapping_add(1);
        }
    }
}

impl<T> fmt::Debug for Lamport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lamport")
            .field("capacity", &self.capacity())
            .field("head", &self.consumer.head.load(Ordering::Relaxed))
            .field("tail", &self.producer.tail.load(Ordering::Relaxed))
            .finish()
    }
}
