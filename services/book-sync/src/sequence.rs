//! Sequence continuity checks
//!
//! Every book-affecting message carries an exchange sequence number. A
//! message is compared against the book's current sequence before it is
//! allowed to touch the book, whether it arrives live or is replayed from
//! the pending queue.
//!
//! A gap is tolerated: the feed offers no in-band replay, so the book jumps
//! forward and the gap is reported instead of stalling the stream.

/// Outcome of comparing an incoming sequence with the book's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// At or below the current sequence; discard and report.
    Stale,
    /// Exactly one past the current sequence (or the first message seen).
    InOrder,
    /// Ahead of the expected sequence; apply, but surface the gap.
    Gapped { expected: u64, received: u64 },
}

impl SequenceCheck {
    /// Whether the message should be applied to the book.
    pub fn is_applicable(&self) -> bool {
        !matches!(self, SequenceCheck::Stale)
    }

    /// Number of messages skipped by a gap.
    pub fn missing(&self) -> u64 {
        match self {
            SequenceCheck::Gapped { expected, received } => received - expected,
            _ => 0,
        }
    }
}

/// Classify `incoming` against the book's `current` sequence.
pub fn classify(current: Option<u64>, incoming: u64) -> SequenceCheck {
    let Some(current) = current else {
        return SequenceCheck::InOrder;
    };

    if incoming <= current {
        return SequenceCheck::Stale;
    }

    let expected = current + 1;
    if incoming == expected {
        SequenceCheck::InOrder
    } else {
        SequenceCheck::Gapped {
            expected,
            received: incoming,
        }
    }
}
