//! Slot table entries.
//!
//! Every slot pairs a [`Tag`] with a payload. Ownership of the payload moves
//! between producer and consumer only through the tag:
//!
//! - a writer must see the slot vacant for an older cycle before claiming it;
//! - a reader must see it full for its own cycle before trusting the payload.
//!
//! [`CellSlot`] keeps the payload outside the atomic word and uses the `BUSY`
//! flag to cover the copy. [`PackedSlot`] and [`CompactPackedSlot`] keep tag
//! and payload in one `AtomicU128`, so a single instruction publishes or
//! removes both and no reader can observe one without the other.

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;

use portable_atomic::AtomicU128;

use crate::codec::{pack, unpack, Packable, Tag, COMPACT_PAYLOAD_MAX};
use crate::sync::{AtomicU64, Ordering};

mod sealed {
    pub trait Sealed {}
}

/// One entry of an engine's slot table.
///
/// Sealed: the engines rely on the exact transitions documented on each
/// method.
pub trait Slot: Send + Sync + sealed::Sealed {
    /// Element type carried by the slot.
    type Item;

    /// An empty slot owned by `cycle`.
    fn vacant(cycle: u64) -> Self;

    /// Current tag.
    fn tag(&self) -> Tag;

    /// Replaces the tag if it still equals `seen`, leaving the payload alone.
    ///
    /// Only the cycle and `UNSAFE` may change: a `next` whose `FULL` or
    /// `BUSY` bits differ from `seen` is refused with the current tag.
    fn swap_tag(&self, seen: Tag, next: Tag) -> Result<(), Tag>;

    /// Claims the slot if its tag still equals `seen`, stores `item` and
    /// publishes `(cycle, FULL)`.
    ///
    /// `seen` must be vacant. On failure returns the tag that was found and
    /// hands `item` back.
    fn try_put(&self, seen: Tag, cycle: u64, item: Self::Item) -> Result<(), (Tag, Self::Item)>;

    /// Moves the element out and clears `FULL`, keeping any other flag.
    ///
    /// # Safety
    ///
    /// The tag must be `FULL` and the caller must hold the only right to
    /// consume it (an exclusive cursor reservation for that cycle).
    unsafe fn take(&self) -> Self::Item;

    /// Moves the element out if the tag still equals `seen`, leaving the slot
    /// tagged `next`.
    ///
    /// `seen` must be `FULL` and not `BUSY`, and `next` must be vacant;
    /// anything else is refused with the current tag.
    fn try_take(&self, seen: Tag, next: Tag) -> Result<Self::Item, Tag>;
}

/// Slot for typed values: an atomic tag beside a plain payload cell.
pub struct CellSlot<T> {
    tag: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: the payload cell is only touched by the thread that moved the tag
// into `BUSY` (writer) or that holds the `FULL` reservation (reader).
unsafe impl<T: Send> Send for CellSlot<T> {}
unsafe impl<T: Send> Sync for CellSlot<T> {}

/// `FULL` and `BUSY` track whether the payload cell is initialized, so no
/// tag transition may change them except through `try_put`/`try_take`/`take`.
#[inline]
fn same_occupancy(a: Tag, b: Tag) -> bool {
    (a.bits() ^ b.bits()) & (Tag::FULL | Tag::BUSY) == 0
}

impl<T> CellSlot<T> {
    #[inline]
    fn cas_tag(&self, seen: Tag, next: Tag) -> Result<(), Tag> {
        self.tag
            .compare_exchange(seen.bits(), next.bits(), Ordering::SeqCst, Ordering::SeqCst)
            .map(drop)
            .map_err(Tag::from_bits)
    }
}

impl<T> sealed::Sealed for CellSlot<T> {}

impl<T: Send> Slot for CellSlot<T> {
    type Item = T;

    fn vacant(cycle: u64) -> Self {
        CellSlot {
            tag: AtomicU64::new(Tag::vacant(cycle).bits()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[inline]
    fn tag(&self) -> Tag {
        Tag::from_bits(self.tag.load(Ordering::SeqCst))
    }

    #[inline]
    fn swap_tag(&self, seen: Tag, next: Tag) -> Result<(), Tag> {
        if !same_occupancy(seen, next) {
            return Err(self.tag());
        }
        self.cas_tag(seen, next)
    }

    #[inline]
    fn try_put(&self, seen: Tag, cycle: u64, item: T) -> Result<(), (Tag, T)> {
        if !seen.is_vacant() {
            return Err((self.tag(), item));
        }
        if let Err(found) = self.cas_tag(seen, Tag::new(cycle, Tag::BUSY)) {
            return Err((found, item));
        }
        // SAFETY: the cell was vacant and our `BUSY` claim excludes everyone
        // else until the flags flip below.
        unsafe { (*self.value.get()).write(item) };
        // A consumer may set UNSAFE while we copy; xor keeps it.
        self.tag.fetch_xor(Tag::BUSY | Tag::FULL, Ordering::SeqCst);
        Ok(())
    }

    #[inline]
    unsafe fn take(&self) -> T {
        let value = unsafe { (*self.value.get()).assume_init_read() };
        self.tag.fetch_and(!Tag::FULL, Ordering::SeqCst);
        value
    }

    #[inline]
    fn try_take(&self, seen: Tag, next: Tag) -> Result<T, Tag> {
        if !seen.is_full() || seen.is_busy() || !next.is_vacant() {
            return Err(self.tag());
        }
        self.cas_tag(seen, seen.with(Tag::BUSY))?;
        // SAFETY: the tag was `FULL` without `BUSY`, so the cell holds a
        // published value, and our `BUSY` claim makes this the only read.
        let value = unsafe { (*self.value.get()).assume_init_read() };
        self.tag.store(next.bits(), Ordering::SeqCst);
        Ok(value)
    }
}

impl<T> Drop for CellSlot<T> {
    fn drop(&mut self) {
        if Tag::from_bits(self.tag.load(Ordering::Relaxed)).is_full() {
            unsafe { (*self.value.get()).assume_init_drop() };
        }
    }
}

impl<T> fmt::Debug for CellSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellSlot")
            .field("tag", &Tag::from_bits(self.tag.load(Ordering::Relaxed)))
            .finish_non_exhaustive()
    }
}

/// Slot for word-sized values with tag and payload in one `AtomicU128`.
///
/// The payload may use all 64 bits.
pub struct PackedSlot<V> {
    word: AtomicU128,
    _marker: PhantomData<fn(V) -> V>,
}

impl<V> sealed::Sealed for PackedSlot<V> {}

impl<V: Packable> Slot for PackedSlot<V> {
    type Item = V;

    fn vacant(cycle: u64) -> Self {
        PackedSlot {
            word: AtomicU128::new(pack(Tag::vacant(cycle), 0)),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn tag(&self) -> Tag {
        unpack(self.word.load(Ordering::SeqCst)).0
    }

    #[inline]
    fn swap_tag(&self, seen: Tag, next: Tag) -> Result<(), Tag> {
        let mut word = self.word.load(Ordering::SeqCst);
        loop {
            let (tag, payload) = unpack(word);
            if tag != seen || !same_occupancy(seen, next) {
                return Err(tag);
            }
            match self.word.compare_exchange(
                word,
                pack(next, payload),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => word = current,
            }
        }
    }

    #[inline]
    fn try_put(&self, seen: Tag, cycle: u64, item: V) -> Result<(), (Tag, V)> {
        let published = pack(Tag::new(cycle, Tag::FULL), item.into_word());
        let mut word = self.word.load(Ordering::SeqCst);
        loop {
            let tag = unpack(word).0;
            if tag != seen || !seen.is_vacant() {
                return Err((tag, item));
            }
            match self
                .word
                .compare_exchange(word, published, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Ok(()),
                Err(current) => word = current,
            }
        }
    }

    #[inline]
    unsafe fn take(&self) -> V {
        let old = self
            .word
            .fetch_and(!((Tag::FULL as u128) << 64), Ordering::SeqCst);
        V::from_word(unpack(old).1)
    }

    #[inline]
    fn try_take(&self, seen: Tag, next: Tag) -> Result<V, Tag> {
        let mut word = self.word.load(Ordering::SeqCst);
        loop {
            let (tag, payload) = unpack(word);
            if tag != seen || !seen.is_full() || !next.is_vacant() {
                return Err(tag);
            }
            match self.word.compare_exchange(
                word,
                pack(next, payload),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(V::from_word(payload)),
                Err(current) => word = current,
            }
        }
    }
}

impl<V> fmt::Debug for PackedSlot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, payload) = unpack(self.word.load(Ordering::Relaxed));
        f.debug_struct("PackedSlot")
            .field("tag", &tag)
            .field("payload", &payload)
            .finish()
    }
}

const OCCUPIED: u64 = 1 << 63;

/// Packed slot for the compact layout.
///
/// The high half is a bare generation counter; occupancy lives in bit 63 of
/// the payload word, which caps payloads at [`COMPACT_PAYLOAD_MAX`].
pub struct CompactPackedSlot<V> {
    word: AtomicU128,
    _marker: PhantomData<fn(V) -> V>,
}

impl<V> CompactPackedSlot<V> {
    #[inline]
    fn decode(word: u128) -> (Tag, u64) {
        let (tag, payload) = unpack(word);
        if payload & OCCUPIED != 0 {
            (tag.with(Tag::FULL), payload & COMPACT_PAYLOAD_MAX)
        } else {
            (tag, payload)
        }
    }

    #[inline]
    fn encode(tag: Tag, payload: u64) -> u128 {
        let payload = if tag.is_full() {
            payload | OCCUPIED
        } else {
            payload & COMPACT_PAYLOAD_MAX
        };
        pack(tag.without(Tag::FULL), payload)
    }

    fn replace(&self, seen: Tag, next: Tag) -> Result<u64, Tag> {
        let mut word = self.word.load(Ordering::SeqCst);
        loop {
            let (tag, payload) = Self::decode(word);
            if tag != seen {
                return Err(tag);
            }
            match self.word.compare_exchange(
                word,
                Self::encode(next, payload),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(payload),
                Err(current) => word = current,
            }
        }
    }
}

impl<V> sealed::Sealed for CompactPackedSlot<V> {}

impl<V: Packable> Slot for CompactPackedSlot<V> {
    type Item = V;

    fn vacant(cycle: u64) -> Self {
        CompactPackedSlot {
            word: AtomicU128::new(Self::encode(Tag::vacant(cycle), 0)),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn tag(&self) -> Tag {
        Self::decode(self.word.load(Ordering::SeqCst)).0
    }

    #[inline]
    fn swap_tag(&self, seen: Tag, next: Tag) -> Result<(), Tag> {
        if !same_occupancy(seen, next) {
            return Err(self.tag());
        }
        self.replace(seen, next).map(drop)
    }

    #[inline]
    fn try_put(&self, seen: Tag, cycle: u64, item: V) -> Result<(), (Tag, V)> {
        let payload = item.into_word();
        assert!(
            payload <= COMPACT_PAYLOAD_MAX,
            "compact packed payloads are limited to 63 bits"
        );
        let published = Self::encode(Tag::new(cycle, Tag::FULL), payload);
        let mut word = self.word.load(Ordering::SeqCst);
        loop {
            let tag = Self::decode(word).0;
            if tag != seen || !seen.is_vacant() {
                return Err((tag, item));
            }
            match self
                .word
                .compare_exchange(word, published, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Ok(()),
                Err(current) => word = current,
            }
        }
    }

    #[inline]
    unsafe fn take(&self) -> V {
        let old = self.word.fetch_and(!(OCCUPIED as u128), Ordering::SeqCst);
        V::from_word(Self::decode(old).1)
    }

    #[inline]
    fn try_take(&self, seen: Tag, next: Tag) -> Result<V, Tag> {
        if !seen.is_full() || !next.is_vacant() {
            return Err(self.tag());
        }
        self.replace(seen, next).map(V::from_word)
    }
}

impl<V> fmt::Debug for CompactPackedSlot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, payload) = Self::decode(self.word.load(Ordering::Relaxed));
        f.debug_struct("CompactPackedSlot")
            .field("tag", &tag)
            .field("payload", &payload)
            .finish()
    }
}
