//! Typed event dispatch
//!
//! Subscribers register against an `EventKind` and receive every
//! `FeedEvent` of that kind, in emission order, on the feed's task.
//! Handlers must not block: a slow consumer should take a channel via
//! [`EventEmitter::channel`] and do its work elsewhere.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::trace;

use crate::events::{EventKind, FeedEvent};

type Handler = Box<dyn Fn(&FeedEvent) + Send + Sync>;

/// Per-kind subscriber lists plus catch-all subscribers.
#[derive(Default)]
pub struct EventEmitter {
    handlers: HashMap<EventKind, Vec<Handler>>,
    catch_all: Vec<Handler>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Register a handler for every event.
    pub fn on_any<F>(&mut self, handler: F)
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.catch_all.push(Box::new(handler));
    }

    /// Forward events of `kind` into an unbounded channel.
    pub fn channel(&mut self, kind: EventKind) -> mpsc::UnboundedReceiver<FeedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on(kind, move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Forward every event into an unbounded channel.
    pub fn channel_all(&mut self) -> mpsc::UnboundedReceiver<FeedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_any(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Number of handlers that would see an event of `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len) + self.catch_all.len()
    }

    pub fn emit(&self, event: FeedEvent) {
        let kind = event.kind();
        trace!(?kind, subscribers = self.subscriber_count(kind), "Emitting event");

        if let Some(handlers) = self.handlers.get(&kind) {
            for handler in handlers {
                handler(&event);
            }
        }
        for handler in &self.catch_all {
            handler(&event);
        }
    }
}
