//! Cycle tags and the double-width word codec.
//!
//! A [`Tag`] packs a slot's generation ("cycle") and three state flags into a
//! single `u64`. Packed slots place the tag in the high half of a `u128` and
//! the payload word in the low half, so one atomic instruction moves both.

use core::cmp;
use core::fmt;
use core::ptr::NonNull;

const FLAG_BITS: u32 = 3;
const FLAG_MASK: u64 = (1 << FLAG_BITS) - 1;

/// Largest payload a compact packed slot can carry; bit 63 marks occupancy.
pub const COMPACT_PAYLOAD_MAX: u64 = (1 << 63) - 1;

/// Generation number plus state flags of one slot.
///
/// The cycle is kept modulo 2^61 and compared with wrapping arithmetic, so a
/// cursor can run past any fixed bound without a stale tag ever comparing as
/// current.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u64);

impl Tag {
    /// The slot holds a published element.
    pub const FULL: u64 = 0b001;
    /// A producer or consumer owns the payload cell and is mid-copy.
    pub const BUSY: u64 = 0b010;
    /// A consumer skipped this slot while an older element was still in it.
    pub const UNSAFE: u64 = 0b100;

    /// Builds a tag from a cycle and a flag set.
    #[inline]
    pub const fn new(cycle: u64, flags: u64) -> Self {
        Tag((cycle << FLAG_BITS) | (flags & FLAG_MASK))
    }

    /// An empty slot owned by `cycle`.
    #[inline]
    pub const fn vacant(cycle: u64) -> Self {
        Tag::new(cycle, 0)
    }

    /// Reinterprets raw bits as a tag.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Tag(bits)
    }

    /// Raw bits, as stored in a slot.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Generation number, 61 bits wide.
    #[inline]
    pub const fn cycle(self) -> u64 {
        self.0 >> FLAG_BITS
    }

    /// The `FULL`, `BUSY` and `UNSAFE` bits.
    #[inline]
    pub const fn flags(self) -> u64 {
        self.0 & FLAG_MASK
    }

    /// `FULL` is set.
    #[inline]
    pub const fn is_full(self) -> bool {
        self.0 & Tag::FULL != 0
    }

    /// `BUSY` is set.
    #[inline]
    pub const fn is_busy(self) -> bool {
        self.0 & Tag::BUSY != 0
    }

    /// `UNSAFE` is set.
    #[inline]
    pub const fn is_unsafe(self) -> bool {
        self.0 & Tag::UNSAFE != 0
    }

    /// Neither holding an element nor being written or read.
    #[inline]
    pub const fn is_vacant(self) -> bool {
        self.0 & (Tag::FULL | Tag::BUSY) == 0
    }

    /// Same cycle with `flags` added.
    #[inline]
    pub const fn with(self, flags: u64) -> Self {
        Tag(self.0 | (flags & FLAG_MASK))
    }

    /// Same cycle with `flags` cleared.
    #[inline]
    pub const fn without(self, flags: u64) -> Self {
        Tag(self.0 & !(flags & FLAG_MASK))
    }

    /// Orders this tag's cycle against `cycle` modulo 2^61.
    #[inline]
    pub fn cmp_cycle(self, cycle: u64) -> cmp::Ordering {
        cycle_cmp(self.cycle(), cycle)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("cycle", &self.cycle())
            .field("full", &self.is_full())
            .field("busy", &self.is_busy())
            .field("unsafe", &self.is_unsafe())
            .finish()
    }
}

/// Signed comparison of two cycles in the 61-bit tag space.
#[inline]
pub(crate) fn cycle_cmp(a: u64, b: u64) -> cmp::Ordering {
    ((a.wrapping_sub(b) << FLAG_BITS) as i64).cmp(&0)
}

/// Signed distance between two cursor positions.
#[inline]
pub(crate) fn distance(later: u64, earlier: u64) -> i64 {
    later.wrapping_sub(earlier) as i64
}

/// Joins a tag and a payload word into one double-width value.
#[inline]
pub const fn pack(tag: Tag, payload: u64) -> u128 {
    ((tag.bits() as u128) << 64) | payload as u128
}

/// Splits a double-width value into its tag and payload word.
#[inline]
pub const fn unpack(word: u128) -> (Tag, u64) {
    (Tag::from_bits((word >> 64) as u64), word as u64)
}

/// Values that travel through packed slots as a single 64-bit word.
pub trait Packable: Copy + Send {
    /// The word stored in the slot.
    fn into_word(self) -> u64;
    /// Rebuilds the value from a word produced by [`into_word`](Self::into_word).
    fn from_word(word: u64) -> Self;
}

impl Packable for u64 {
    #[inline]
    fn into_word(self) -> u64 {
        self
    }

    #[inline]
    fn from_word(word: u64) -> Self {
        word
    }
}

/// An opaque address handed through a queue.
///
/// The queue never dereferences it; whoever enqueues a `Ptr` is responsible
/// for the pointee outliving its stay in the queue and for any
/// synchronization the pointee needs once dequeued.
#[repr(transparent)]
pub struct Ptr<T>(*mut T);

// SAFETY: a `Ptr` is an address. The queue only moves it between threads and
// never reads through it.
unsafe impl<T> Send for Ptr<T> {}
unsafe impl<T> Sync for Ptr<T> {}

impl<T> Ptr<T> {
    /// Wraps a raw pointer.
    #[inline]
    pub const fn new(ptr: *mut T) -> Self {
        Ptr(ptr)
    }

    /// The null address.
    #[inline]
    pub const fn null() -> Self {
        Ptr(core::ptr::null_mut())
    }

    /// The wrapped pointer.
    #[inline]
    pub const fn as_ptr(self) -> *mut T {
        self.0
    }

    /// Whether the address is null.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ptr<T> {}

impl<T> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.0, other.0)
    }
}

impl<T> Eq for Ptr<T> {}

impl<T> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ptr({:p})", self.0)
    }
}

impl<T> From<*mut T> for Ptr<T> {
    fn from(ptr: *mut T) -> Self {
        Ptr(ptr)
    }
}

impl<T> From<NonNull<T>> for Ptr<T> {
    fn from(ptr: NonNull<T>) -> Self {
        Ptr(ptr.as_ptr())
    }
}

impl<T> Packable for Ptr<T> {
    #[inline]
    fn into_word(self) -> u64 {
        self.0 as usize as u64
    }

    #[inline]
    fn from_word(word: u64) -> Self {
        Ptr(word as usize as *mut T)
    }
}
