//! turbo_lfq - bounded lock-free and wait-free FIFO queues
//!
//! One engine per producer/consumer cardinality: a wait-free Lamport ring for
//! SPSC, a fetch-and-add engine over `2n` slots for everything else, and an
//! opt-in compare-and-swap engine over `n` slots. Capacities are powers of
//! two. `enqueue` and `dequeue` never block and never retry for the caller.
//!
//! ```
//! use turbo_lfq::Mpsc;
//!
//! let q = Mpsc::new(4);
//! q.enqueue(1).unwrap();
//! q.enqueue(2).unwrap();
//! assert_eq!(q.dequeue(), Ok(1));
//! assert_eq!(q.dequeue(), Ok(2));
//! assert!(q.dequeue().is_err());
//! ```
#![warn(missing_docs)]

mod sync;

pub mod builder;
pub mod codec;
pub mod compact;
pub mod cursor;
pub mod error;
pub mod lamport;
pub mod queue;
pub mod scq;
pub mod select;
pub mod slot;

pub use builder::{AnyQueue, Builder, Direct, Indirect, Opaque, Repr};
pub use codec::{pack, unpack, Packable, Ptr, Tag, COMPACT_PAYLOAD_MAX};
pub use compact::Compact;
pub use cursor::{Access, Multi, Single};
pub use error::{is_would_block, Full, WouldBlock};
pub use lamport::Lamport;
pub use queue::{Drain, Queue};
pub use scq::Scq;
pub use select::{round_capacity, select, Cardinality, EngineKind, Progress, Selection};
pub use slot::{CellSlot, CompactPackedSlot, PackedSlot, Slot};

/// Spin-then-yield helper for callers that retry on [`Full`] or [`WouldBlock`].
pub use crossbeam_utils::Backoff;

/// Wait-free single-producer/single-consumer queue of `T`.
pub type Spsc<T> = Lamport<T>;
/// [`Spsc`] of `u64` handles.
pub type SpscIndirect = Lamport<u64>;
/// [`Spsc`] of opaque addresses.
pub type SpscPtr<T> = Lamport<Ptr<T>>;

/// Multi-producer/single-consumer queue of `T`.
pub type Mpsc<T> = Scq<CellSlot<T>, Multi, Single>;
/// [`Mpsc`] of `u64` handles packed beside the tag.
pub type MpscIndirect = Scq<PackedSlot<u64>, Multi, Single>;
/// [`Mpsc`] of opaque addresses packed beside the tag.
pub type MpscPtr<T> = Scq<PackedSlot<Ptr<T>>, Multi, Single>;

/// Single-producer/multi-consumer queue of `T`.
pub type Spmc<T> = Scq<CellSlot<T>, Single, Multi>;
/// [`Spmc`] of `u64` handles packed beside the tag.
pub type SpmcIndirect = Scq<PackedSlot<u64>, Single, Multi>;
/// [`Spmc`] of opaque addresses packed beside the tag.
pub type SpmcPtr<T> = Scq<PackedSlot<Ptr<T>>, Single, Multi>;

/// Multi-producer/multi-consumer queue of `T`.
pub type Mpmc<T> = Scq<CellSlot<T>, Multi, Multi>;
/// [`Mpmc`] of `u64` handles packed beside the tag.
pub type MpmcIndirect = Scq<PackedSlot<u64>, Multi, Multi>;
/// [`Mpmc`] of opaque addresses packed beside the tag.
pub type MpmcPtr<T> = Scq<PackedSlot<Ptr<T>>, Multi, Multi>;

/// Compact-layout [`Mpsc`].
pub type MpscCompact<T> = Compact<CellSlot<T>, Multi, Single>;
/// Compact-layout [`MpscIndirect`]; handles are limited to 63 bits.
pub type MpscCompactIndirect = Compact<CompactPackedSlot<u64>, Multi, Single>;
/// Compact-layout [`MpscPtr`].
pub type MpscCompactPtr<T> = Compact<CompactPackedSlot<Ptr<T>>, Multi, Single>;

/// Compact-layout [`Spmc`].
pub type SpmcCompact<T> = Compact<CellSlot<T>, Single, Multi>;
/// Compact-layout [`SpmcIndirect`]; handles are limited to 63 bits.
pub type SpmcCompactIndirect = Compact<CompactPackedSlot<u64>, Single, Multi>;
/// Compact-layout [`SpmcPtr`].
pub type SpmcCompactPtr<T> = Compact<CompactPackedSlot<Ptr<T>>, Single, Multi>;

/// Compact-layout [`Mpmc`].
pub type MpmcCompact<T> = Compact<CellSlot<T>, Multi, Multi>;
/// Compact-layout [`MpmcIndirect`]; handles are limited to 63 bits.
pub type MpmcCompactIndirect = Compact<CompactPackedSlot<u64>, Multi, Multi>;
/// Compact-layout [`MpmcPtr`].
pub type MpmcCompactPtr<T> = Compact<CompactPackedSlot<Ptr<T>>, Multi, Multi>;
