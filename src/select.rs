//! Engine selection: a pure mapping from the caller's declared access pattern
//! to one concrete engine.

/// Declared producer/consumer cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// One producer, one consumer.
    Spsc,
    /// Many producers, one consumer.
    Mpsc,
    /// One producer, many consumers.
    Spmc,
    /// Many of both.
    Mpmc,
}

impl Cardinality {
    /// Maps the two single-thread promises to a cardinality.
    pub const fn new(single_producer: bool, single_consumer: bool) -> Self {
        match (single_producer, single_consumer) {
            (true, true) => Cardinality::Spsc,
            (false, true) => Cardinality::Mpsc,
            (true, false) => Cardinality::Spmc,
            (false, false) => Cardinality::Mpmc,
        }
    }
}

/// Progress guarantee of an engine's operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    /// Every call finishes in a bounded number of its own steps.
    WaitFree,
    /// Some call always finishes; a single call may be delayed by others.
    LockFree,
}

/// The closed set of engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Wait-free single-producer/single-consumer ring.
    Lamport,
    /// Fetch-and-add engine over `2n` slots, many producers.
    FaaMpsc,
    /// Fetch-and-add engine over `2n` slots, many consumers.
    FaaSpmc,
    /// Fetch-and-add engine over `2n` slots, many of both.
    FaaMpmc,
    /// Compare-and-swap engine over `n` slots, many producers.
    CompactMpsc,
    /// Compare-and-swap engine over `n` slots, many consumers.
    CompactSpmc,
    /// Compare-and-swap engine over `n` slots, many of both.
    CompactMpmc,
}

impl EngineKind {
    /// The access pattern this engine serves.
    pub const fn cardinality(self) -> Cardinality {
        match self {
            EngineKind::Lamport => Cardinality::Spsc,
            EngineKind::FaaMpsc | EngineKind::CompactMpsc => Cardinality::Mpsc,
            EngineKind::FaaSpmc | EngineKind::CompactSpmc => Cardinality::Spmc,
            EngineKind::FaaMpmc | EngineKind::CompactMpmc => Cardinality::Mpmc,
        }
    }

    /// Only the SPSC ring is wait-free.
    pub const fn progress(self) -> Progress {
        match self {
            EngineKind::Lamport => Progress::WaitFree,
            _ => Progress::LockFree,
        }
    }

    /// Physical slot count backing a queue of `capacity` elements.
    pub const fn slots(self, capacity: usize) -> usize {
        match self {
            EngineKind::FaaMpsc | EngineKind::FaaSpmc | EngineKind::FaaMpmc => capacity * 2,
            _ => capacity,
        }
    }

    /// Whether the engine carries the drain capability.
    pub const fn is_drainable(self) -> bool {
        !matches!(self, EngineKind::Lamport)
    }
}

/// Result of [`select`]: which engine, and at what capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    /// The engine to build.
    pub engine: EngineKind,
    /// Requested capacity rounded up to a power of two.
    pub capacity: usize,
}

/// Rounds a capacity request up to the next power of two, with a floor of 1.
///
/// # Panics
///
/// Panics if the rounded value does not fit in `usize`.
pub fn round_capacity(requested: usize) -> usize {
    match requested.max(1).checked_next_power_of_two() {
        Some(capacity) => capacity,
        None => panic!("capacity {requested} overflows usize when rounded"),
    }
}

/// Picks the engine for a capacity request and declared constraints.
///
/// `compact` trades the doubled fetch-and-add layout for the single-capacity
/// compare-and-swap one; the SPSC ring is already minimal and ignores it.
pub fn select(
    capacity: usize,
    single_producer: bool,
    single_consumer: bool,
    compact: bool,
) -> Selection {
    let engine = match (Cardinality::new(single_producer, single_consumer), compact) {
        (Cardinality::Spsc, _) => EngineKind::Lamport,
        (Cardinality::Mpsc, false) => EngineKind::FaaMpsc,
        (Cardinality::Spmc, false) => EngineKind::FaaSpmc,
        (Cardinality::Mpmc, false) => EngineKind::FaaMpmc,
        (Cardinality::Mpsc, true) => EngineKind::CompactMpsc,
        (Cardinality::Spmc, true) => EngineKind::CompactSpmc,
        (Cardinality::Mpmc, true) => EngineKind::CompactMpmc,
    };
    Selection {
        engine,
        capacity: round_capacity(capacity),
    }
}
