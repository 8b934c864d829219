//! Error values returned by the non-blocking operations.

use core::fmt;
use std::error::Error;

use thiserror::Error;

/// The queue cannot accept or produce an element right now.
///
/// Raised by `dequeue` on an empty queue and, through [`Full`], by `enqueue`
/// on a full or threshold-blocked one. Retrying is the caller's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Error)]
#[error("operation would block")]
pub struct WouldBlock;

static WOULD_BLOCK: WouldBlock = WouldBlock;

/// A rejected enqueue. Carries the value back to the caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> Error for Full<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&WOULD_BLOCK)
    }
}

impl<T> From<Full<T>> for WouldBlock {
    fn from(_: Full<T>) -> Self {
        WouldBlock
    }
}

/// Reports whether `err`, or anything in its source chain, is [`WouldBlock`].
pub fn is_would_block(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<WouldBlock>() {
            return true;
        }
        current = e.source();
    }
    false
}
