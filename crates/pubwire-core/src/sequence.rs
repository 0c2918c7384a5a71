//! Per-client publish sequence numbers.
//!
//! Every publish carries a `seqn` value that lets the service recognise a
//! retried call from the same sender. Values run from 1 to [`MAX_SEQUENCE`]
//! and then wrap back to 1.

use std::sync::atomic::{AtomicU32, Ordering};

/// Largest sequence number before wrapping.
pub const MAX_SEQUENCE: u16 = u16::MAX;

/// Atomic, wrapping sequence counter owned by one client instance.
///
/// The only way to observe or change the counter is [`SequenceGenerator::next`],
/// which is linearizable: concurrent callers never see the same value twice
/// between wraps.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last: AtomicU32,
}

impl SequenceGenerator {
    /// Creates a generator whose first value is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next sequence number.
    pub fn next(&self) -> u16 {
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(advance(last)))
            .unwrap_or_else(|last| last);
        // advance() keeps the counter inside [1, MAX_SEQUENCE]
        advance(previous) as u16
    }

    #[cfg(test)]
    fn starting_after(last: u16) -> Self {
        Self {
            last: AtomicU32::new(u32::from(last)),
        }
    }
}

fn advance(last: u32) -> u32 {
    if last >= u32::from(MAX_SEQUENCE) {
        1
    } else {
        last + 1
    }
}
