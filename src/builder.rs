//! Builder surface: capacity plus declared constraints in, matching engine
//! out.

use core::fmt;
use core::marker::PhantomData;

use crate::codec::Ptr;
use crate::compact::Compact;
use crate::cursor::{Access, Multi, Single};
use crate::error::{Full, WouldBlock};
use crate::lamport::Lamport;
use crate::queue::{Drain, Queue};
use crate::scq::Scq;
use crate::select::{self, EngineKind, Selection};
use crate::slot::{CellSlot, CompactPackedSlot, PackedSlot, Slot};

/// Element representation: decides which slot type each layout uses.
pub trait Repr {
    /// What callers enqueue and dequeue.
    type Item: Send;
    /// Slot for the doubled fetch-and-add layout.
    type Doubled: Slot<Item = Self::Item>;
    /// Slot for the compact compare-and-swap layout.
    type Compact: Slot<Item = Self::Item>;
}

/// Typed values moved into the slot.
pub struct Direct<T>(PhantomData<fn(T) -> T>);

/// `u64` handles into caller-owned storage, packed next to the tag.
pub struct Indirect;

/// Opaque addresses passed through without being dereferenced.
pub struct Opaque<T>(PhantomData<fn(T) -> T>);

impl<T: Send> Repr for Direct<T> {
    type Item = T;
    type Doubled = CellSlot<T>;
    type Compact = CellSlot<T>;
}

impl Repr for Indirect {
    type Item = u64;
    type Doubled = PackedSlot<u64>;
    type Compact = CompactPackedSlot<u64>;
}

impl<T> Repr for Opaque<T> {
    type Item = Ptr<T>;
    type Doubled = PackedSlot<Ptr<T>>;
    type Compact = CompactPackedSlot<Ptr<T>>;
}

/// A queue produced by [`Builder`]: one variant per engine.
pub enum AnyQueue<R: Repr> {
    /// [`EngineKind::Lamport`].
    Spsc(Lamport<R::Item>),
    /// [`EngineKind::FaaMpsc`].
    Mpsc(Scq<R::Doubled, Multi, Single>),
    /// [`EngineKind::FaaSpmc`].
    Spmc(Scq<R::Doubled, Single, Multi>),
    /// [`EngineKind::FaaMpmc`].
    Mpmc(Scq<R::Doubled, Multi, Multi>),
    /// [`EngineKind::CompactMpsc`].
    CompactMpsc(Compact<R::Compact, Multi, Single>),
    /// [`EngineKind::CompactSpmc`].
    CompactSpmc(Compact<R::Compact, Single, Multi>),
    /// [`EngineKind::CompactMpmc`].
    CompactMpmc(Compact<R::Compact, Multi, Multi>),
}

macro_rules! dispatch {
    ($queue:expr, $q:ident => $body:expr) => {
        match $queue {
            AnyQueue::Spsc($q) => $body,
            AnyQueue::Mpsc($q) => $body,
            AnyQueue::Spmc($q) => $body,
            AnyQueue::Mpmc($q) => $body,
            AnyQueue::CompactMpsc($q) => $body,
            AnyQueue::CompactSpmc($q) => $body,
            AnyQueue::CompactMpmc($q) => $body,
        }
    };
}

impl<R: Repr> AnyQueue<R> {
    fn from_selection(selection: Selection, start: Option<u64>) -> Self {
        let Selection { engine, capacity } = selection;
        match engine {
            EngineKind::Lamport => AnyQueue::Spsc(match start {
                Some(pos) => Lamport::with_start(capacity, pos),
                None => Lamport::new(capacity),
            }),
            EngineKind::FaaMpsc => AnyQueue::Mpsc(scq(capacity, start)),
            EngineKind::FaaSpmc => AnyQueue::Spmc(scq(capacity, start)),
            EngineKind::FaaMpmc => AnyQueue::Mpmc(scq(capacity, start)),
            EngineKind::CompactMpsc => AnyQueue::CompactMpsc(compact(capacity, start)),
            EngineKind::CompactSpmc => AnyQueue::CompactSpmc(compact(capacity, start)),
            EngineKind::CompactMpmc => AnyQueue::CompactMpmc(compact(capacity, start)),
        }
    }

    /// The drain capability, present only on multi-access engines.
    pub fn drainable(&self) -> Option<&dyn Drain<Item = R::Item>> {
        match self {
            AnyQueue::Spsc(_) => None,
            AnyQueue::Mpsc(q) => Some(q),
            AnyQueue::Spmc(q) => Some(q),
            AnyQueue::Mpmc(q) => Some(q),
            AnyQueue::CompactMpsc(q) => Some(q),
            AnyQueue::CompactSpmc(q) => Some(q),
            AnyQueue::CompactMpmc(q) => Some(q),
        }
    }
}

fn scq<S: Slot, P: Access, C: Access>(
    capacity: usize,
    start: Option<u64>,
) -> Scq<S, P, C> {
    match start {
        Some(pos) => Scq::with_start(capacity, pos),
        None => Scq::new(capacity),
    }
}

fn compact<S: Slot, P: Access, C: Access>(
    capacity: usize,
    start: Option<u64>,
) -> Compact<S, P, C> {
    match start {
        Some(pos) => Compact::with_start(capacity, pos),
        None => Compact::new(capacity),
    }
}

impl<R: Repr> Queue for AnyQueue<R> {
    type Item = R::Item;

    fn enqueue(&self, item: R::Item) -> Result<(), Full<R::Item>> {
        dispatch!(self, q => q.enqueue(item))
    }

    fn dequeue(&self) -> Result<R::Item, WouldBlock> {
        dispatch!(self, q => q.dequeue())
    }

    fn capacity(&self) -> usize {
        dispatch!(self, q => q.capacity())
    }

    fn len(&self) -> usize {
        dispatch!(self, q => q.len())
    }

    fn engine(&self) -> EngineKind {
        dispatch!(self, q => q.engine())
    }
}

impl<R: Repr> fmt::Debug for AnyQueue<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, q => fmt::Debug::fmt(q, f))
    }
}

/// Collects a capacity and access constraints, then builds the engine
/// [`select`](crate::select()) picks for them.
///
/// ```
/// use turbo_lfq::{Builder, EngineKind, Queue};
///
/// let q = Builder::new(1000).single_consumer().build::<String>();
/// assert_eq!(q.capacity(), 1024);
/// assert_eq!(q.engine(), EngineKind::FaaMpsc);
/// q.enqueue("job".to_string()).unwrap();
/// assert_eq!(q.dequeue().unwrap(), "job");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builder {
    capacity: usize,
    single_producer: bool,
    single_consumer: bool,
    compact: bool,
    start: Option<u64>,
}

impl Builder {
    /// Multi-producer, multi-consumer, doubled layout, default start.
    pub fn new(capacity: usize) -> Self {
        Builder {
            capacity,
            single_producer: false,
            single_consumer: false,
            compact: false,
            start: None,
        }
    }

    /// Promise that only one thread will ever enqueue.
    pub fn single_producer(mut self) -> Self {
        self.single_producer = true;
        self
    }

    /// Promise that only one thread will ever dequeue.
    pub fn single_consumer(mut self) -> Self {
        self.single_consumer = true;
        self
    }

    /// Prefer the compare-and-swap layout with `n` slots over the default
    /// fetch-and-add layout with `2n`.
    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    /// Start both cursors at `position` instead of the engine's default.
    pub fn with_start(mut self, position: u64) -> Self {
        self.start = Some(position);
        self
    }

    /// The engine and capacity this builder will produce.
    pub fn selection(&self) -> Selection {
        select::select(
            self.capacity,
            self.single_producer,
            self.single_consumer,
            self.compact,
        )
    }

    fn build_repr<R: Repr>(self) -> AnyQueue<R> {
        let selection = self.selection();
        if selection.capacity != self.capacity {
            tracing::debug!(
                requested = self.capacity,
                capacity = selection.capacity,
                "capacity rounded up to a power of two"
            );
        }
        tracing::debug!(engine = ?selection.engine, "engine selected");
        AnyQueue::from_selection(selection, self.start)
    }

    /// Builds a queue of typed values.
    pub fn build<T: Send>(self) -> AnyQueue<Direct<T>> {
        self.build_repr()
    }

    /// Builds a queue of `u64` handles. With [`compact`](Self::compact)
    /// the handles must fit in 63 bits.
    pub fn build_indirect(self) -> AnyQueue<Indirect> {
        self.build_repr()
    }

    /// Builds a queue of opaque addresses.
    pub fn build_ptr<T>(self) -> AnyQueue<Opaque<T>> {
        self.build_repr()
    }
}
