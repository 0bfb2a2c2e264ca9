//! Pending-event queue
//!
//! Holds raw, time-stamped messages that arrive while the book is still
//! bootstrapping. Messages are drained in receipt order exactly once per
//! bootstrap; no reordering by sequence happens here, the validator
//! decides what each replayed message means.

use std::collections::VecDeque;

use tracing::debug;

use crate::events::{TimestampedEvent, UpdateMessage};

/// FIFO buffer of messages received before the snapshot was applied.
#[derive(Debug, Default)]
pub struct PendingQueue {
    buffer: VecDeque<TimestampedEvent<UpdateMessage>>,
    /// Total messages ever queued.
    total_queued: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, unmodified.
    pub fn push(&mut self, event: TimestampedEvent<UpdateMessage>) {
        self.total_queued += 1;
        debug!(
            sequence = ?event.payload.sequence,
            kind = event.payload.kind.label(),
            queued = self.buffer.len() + 1,
            "Queued message pending snapshot"
        );
        self.buffer.push_back(event);
    }

    /// Take every queued message in receipt order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<TimestampedEvent<UpdateMessage>> {
        self.buffer.drain(..).collect()
    }

    /// Drop everything without replaying it.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Peek at the oldest queued message.
    pub fn peek(&self) -> Option<&TimestampedEvent<UpdateMessage>> {
        self.buffer.front()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn total_queued(&self) -> u64 {
        self.total_queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(seq: u64) -> TimestampedEvent<UpdateMessage> {
        let text = format!(r#"{{"type":"received","sequence":{}}}"#, seq);
        TimestampedEvent::now(UpdateMessage::parse(&text).unwrap())
    }

    #[test]
    fn test_drain_keeps_receipt_order() {
        let mut queue = PendingQueue::new();
        // Deliberately out of sequence order: receipt order must win.
        queue.push(message(7));
        queue.push(message(3));
        queue.push(message(9));

        let drained: Vec<_> = queue
            .drain()
            .into_iter()
            .map(|e| e.payload.sequence.unwrap())
            .collect();
        assert_eq!(drained, vec![7, 3, 9]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_twice_yields_nothing() {
        let mut queue = PendingQueue::new();
        queue.push(message(1));
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
        assert_eq!(queue.total_queued(), 1);
    }

    #[test]
    fn test_clear_and_peek() {
        let mut queue = PendingQueue::new();
        assert!(queue.peek().is_none());
        queue.push(message(5));
        queue.push(message(6));
        assert_eq!(queue.peek().unwrap().payload.sequence, Some(5));
        assert_eq!(queue.len(), 2);

        queue.clear();
        assert!(queue.is_empty());
    }
}
