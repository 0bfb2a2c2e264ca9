//! Event definitions for the feed synchronizer
//!
//! `UpdateMessage` is what the socket delivers; `FeedEvent` is what the
//! emitter publishes. Update payloads are carried as the raw JSON value the
//! exchange sent: the synchronizer validates ordering, it does not
//! reinterpret content.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Closed,
    Open,
    Syncing,
    Processing,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Open => "open",
            ConnectionState::Syncing => "syncing",
            ConnectionState::Processing => "processing",
            ConnectionState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Declared `type` of a feed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Received,
    Open,
    Done,
    Match,
    Change,
    Activate,
    Heartbeat,
    Subscriptions,
    Error,
    #[serde(other)]
    Other,
}

impl UpdateKind {
    /// Get the kind as a string label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            UpdateKind::Received => "received",
            UpdateKind::Open => "open",
            UpdateKind::Done => "done",
            UpdateKind::Match => "match",
            UpdateKind::Change => "change",
            UpdateKind::Activate => "activate",
            UpdateKind::Heartbeat => "heartbeat",
            UpdateKind::Subscriptions => "subscriptions",
            UpdateKind::Error => "error",
            UpdateKind::Other => "other",
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: UpdateKind,
    #[serde(default)]
    sequence: Option<u64>,
}

/// A parsed socket message.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMessage {
    pub kind: UpdateKind,
    /// Absent on control messages such as `subscriptions` and `error`.
    pub sequence: Option<u64>,
    pub raw: serde_json::Value,
}

impl UpdateMessage {
    /// Parse a text frame, keeping the full JSON value alongside the envelope.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let envelope = Envelope::deserialize(&raw)?;
        Ok(Self {
            kind: envelope.kind,
            sequence: envelope.sequence,
            raw,
        })
    }

    /// String field lookup on the raw payload.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.raw.get(name).and_then(|v| v.as_str())
    }
}

/// A payload paired with the moment it was accepted from the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedEvent<T> {
    pub payload: T,
    pub received_at: DateTime<Utc>,
}

impl<T> TimestampedEvent<T> {
    pub fn new(payload: T, received_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            received_at,
        }
    }

    /// Stamp a payload with the current wall-clock time.
    pub fn now(payload: T) -> Self {
        Self::new(payload, Utc::now())
    }
}

/// Everything the feed publishes to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },
    /// A message whose sequence was at or below the book's sequence.
    Ignored(TimestampedEvent<UpdateMessage>),
    /// Messages between `expected` and `received` never arrived.
    SequenceGap { expected: u64, received: u64 },
    Update(UpdateKind, TimestampedEvent<UpdateMessage>),
}

/// Subscription key: one per `FeedEvent` variant, and one per update kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    Ignored,
    SequenceGap,
    Update(UpdateKind),
}

impl FeedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            FeedEvent::StateChanged { .. } => EventKind::StateChanged,
            FeedEvent::Ignored(_) => EventKind::Ignored,
            FeedEvent::SequenceGap { .. } => EventKind::SequenceGap,
            FeedEvent::Update(kind, _) => EventKind::Update(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequenced_message() {
        let text = r#"{"type":"open","sequence":10,"order_id":"a","price":"100.0","remaining_size":"1.5","side":"buy"}"#;
        let msg = UpdateMessage::parse(text).unwrap();
        assert_eq!(msg.kind, UpdateKind::Open);
        assert_eq!(msg.sequence, Some(10));
        assert_eq!(msg.str_field("order_id"), Some("a"));
        assert_eq!(msg.raw["remaining_size"], "1.5");
    }

    #[test]
    fn test_parse_control_message_without_sequence() {
        let msg = UpdateMessage::parse(r#"{"type":"subscriptions","channels":[]}"#).unwrap();
        assert_eq!(msg.kind, UpdateKind::Subscriptions);
        assert_eq!(msg.sequence, None);
    }

    #[test]
    fn test_unknown_type_maps_to_other() {
        let msg = UpdateMessage::parse(r#"{"type":"l2update","sequence":3}"#).unwrap();
        assert_eq!(msg.kind, UpdateKind::Other);
        assert_eq!(msg.sequence, Some(3));
    }

    #[test]
    fn test_parse_rejects_missing_type() {
        assert!(UpdateMessage::parse(r#"{"sequence":3}"#).is_err());
        assert!(UpdateMessage::parse("not json").is_err());
    }

    #[test]
    fn test_event_kind_mapping() {
        let msg = UpdateMessage::parse(r#"{"type":"match","sequence":1}"#).unwrap();
        let event = FeedEvent::Update(UpdateKind::Match, TimestampedEvent::now(msg));
        assert_eq!(event.kind(), EventKind::Update(UpdateKind::Match));

        let changed = FeedEvent::StateChanged {
            old: ConnectionState::Closed,
            new: ConnectionState::Open,
        };
        assert_eq!(changed.kind(), EventKind::StateChanged);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Processing.to_string(), "processing");
    }
}
