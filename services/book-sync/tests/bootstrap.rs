//! Bootstrap and reconnect tests for the feed driver
//!
//! Runs `BookFeed` against an in-memory connector and a scripted snapshot
//! fetcher on a paused clock, so reconnect delays elapse instantly.
//!
//! Tests include:
//! - Snapshot merge followed by queue replay (stale, in order, gap)
//! - Reconnect rebuilding the book from scratch
//! - Give-up after repeated connection failures
//! - Disconnect misuse and late snapshot handling

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use book_sync::error::{SnapshotError, TransportError};
use book_sync::snapshot::{RawLevel, Snapshot, SnapshotFetcher};
use book_sync::transport::{Connector, SocketConnection, SocketSignal};
use book_sync::{BookFeed, ConnectionState, EventEmitter, FeedConfig, FeedError, FeedEvent};
use tokio::sync::mpsc;
use types::ids::{OrderId, ProductId};
use types::numeric::{Price, Size};

/// Test side of a socket opened by the feed.
struct FakeSocket {
    to_feed: mpsc::UnboundedSender<SocketSignal>,
    from_feed: mpsc::UnboundedReceiver<String>,
}

impl FakeSocket {
    fn text(&self, frame: &str) {
        self.to_feed
            .send(SocketSignal::Text(frame.to_string()))
            .unwrap();
    }
}

struct FakeConnector {
    refuse: bool,
    attempts: AtomicUsize,
    opened: mpsc::UnboundedSender<FakeSocket>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<SocketConnection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(TransportError::InvalidUrl(
                url::Url::parse("").unwrap_err(),
            ));
        }
        let (outbound, from_feed) = mpsc::unbounded_channel();
        let (to_feed, inbound) = mpsc::unbounded_channel();
        self.opened.send(FakeSocket { to_feed, from_feed }).unwrap();
        Ok(SocketConnection { outbound, inbound })
    }
}

/// Returns scripted snapshots, each after its own delay.
struct FakeFetcher {
    responses: Mutex<VecDeque<(Duration, Result<Snapshot, SnapshotError>)>>,
}

#[async_trait]
impl SnapshotFetcher for FakeFetcher {
    async fn fetch_snapshot(&self, product: &ProductId) -> Result<Snapshot, SnapshotError> {
        assert_eq!(product.as_str(), "BTC-USD");
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some((delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => Err(SnapshotError::HttpStatus { status: 404 }),
        }
    }
}

struct Harness {
    feed: BookFeed,
    connector: Arc<FakeConnector>,
    sockets: mpsc::UnboundedReceiver<FakeSocket>,
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

fn harness(refuse: bool, snapshots: Vec<(Duration, Result<Snapshot, SnapshotError>)>) -> Harness {
    let (opened, sockets) = mpsc::unbounded_channel();
    let connector = Arc::new(FakeConnector {
        refuse,
        attempts: AtomicUsize::new(0),
        opened,
    });
    let fetcher = Arc::new(FakeFetcher {
        responses: Mutex::new(snapshots.into()),
    });

    let mut emitter = EventEmitter::new();
    let events = emitter.channel_all();
    let feed = BookFeed::spawn(
        FeedConfig::default(),
        connector.clone(),
        fetcher,
        emitter,
    );

    Harness {
        feed,
        connector,
        sockets,
        events,
    }
}

fn level(price: u64, size: u64, id: &str) -> RawLevel {
    RawLevel(Price::from_u64(price), Size::from_u64(size), OrderId::new(id))
}

fn snapshot_at(sequence: u64) -> Snapshot {
    Snapshot {
        sequence,
        bids: vec![level(100, 2, "a"), level(99, 1, "b")],
        asks: vec![level(101, 3, "c")],
    }
}

fn received(sequence: u64) -> String {
    format!(
        r#"{{"type":"received","sequence":{},"order_id":"r{}","side":"buy","price":"98","size":"1"}}"#,
        sequence, sequence
    )
}

async fn wait_for_state(feed: &BookFeed, state: ConnectionState) {
    for _ in 0..1000 {
        if feed.view(0).await.unwrap().state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("feed never reached {}", state);
}

fn drain(events: &mut mpsc::UnboundedReceiver<FeedEvent>) -> Vec<FeedEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_then_replay_in_receipt_order() {
    let mut h = harness(false, vec![(Duration::from_secs(1), Ok(snapshot_at(50)))]);
    h.feed.connect().unwrap();

    let mut socket = h.sockets.recv().await.unwrap();
    let subscribe: serde_json::Value =
        serde_json::from_str(&socket.from_feed.recv().await.unwrap()).unwrap();
    assert_eq!(subscribe["type"], "subscribe");
    assert_eq!(subscribe["product_id"], "BTC-USD");

    socket.text(&received(48));
    socket.text(&received(51));
    socket.text(&received(53));

    wait_for_state(&h.feed, ConnectionState::Processing).await;

    let view = h.feed.view(10).await.unwrap();
    assert_eq!(view.sequence, Some(53));
    assert_eq!(view.order_count, 3);
    assert_eq!(view.best_bid, Some(Price::from_u64(100)));
    assert_eq!(view.best_ask, Some(Price::from_u64(101)));

    let events = drain(&mut h.events);
    let ignored: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            FeedEvent::Ignored(event) => event.payload.sequence,
            _ => None,
        })
        .collect();
    assert_eq!(ignored, vec![48]);
    assert!(events.contains(&FeedEvent::SequenceGap {
        expected: 52,
        received: 53
    }));

    let metrics = h.feed.metrics();
    assert_eq!(metrics.messages_queued, 3);
    assert_eq!(metrics.messages_applied, 2);
    assert_eq!(metrics.sequence_gaps, 1);
    assert_eq!(metrics.snapshots_merged, 1);

    // Live messages go straight to the book.
    socket.text(r#"{"type":"done","sequence":54,"order_id":"a"}"#);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let view = h.feed.view(10).await.unwrap();
    assert_eq!(view.sequence, Some(54));
    assert_eq!(view.best_bid, Some(Price::from_u64(99)));

    h.feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_rebuilds_book() {
    let replacement = Snapshot {
        sequence: 200,
        bids: vec![level(90, 1, "x")],
        asks: vec![],
    };
    let mut h = harness(
        false,
        vec![
            (Duration::from_millis(100), Ok(snapshot_at(50))),
            (Duration::from_secs(1), Ok(replacement)),
        ],
    );
    h.feed.connect().unwrap();

    let first = h.sockets.recv().await.unwrap();
    wait_for_state(&h.feed, ConnectionState::Processing).await;
    assert_eq!(h.feed.view(10).await.unwrap().order_count, 3);

    first.to_feed.send(SocketSignal::Closed).unwrap();
    wait_for_state(&h.feed, ConnectionState::Closed).await;

    // The reconnect fires after the fixed delay and starts from an empty book.
    let _second = h.sockets.recv().await.unwrap();
    let view = h.feed.view(10).await.unwrap();
    assert_eq!(view.order_count, 0);
    assert_eq!(view.sequence, None);

    wait_for_state(&h.feed, ConnectionState::Processing).await;
    let view = h.feed.view(10).await.unwrap();
    assert_eq!(view.sequence, Some(200));
    assert_eq!(view.order_count, 1);
    assert_eq!(view.best_bid, Some(Price::from_u64(90)));
    assert_eq!(view.best_ask, None);

    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(h.feed.metrics().connection_failures, 1);

    h.feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_four_failed_attempts() {
    let h = harness(true, vec![]);
    let started = tokio::time::Instant::now();
    h.feed.connect().unwrap();

    let result = h.feed.join().await;
    assert_eq!(result, Err(FeedError::GaveUp { failures: 4 }));
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 4);
    assert!(started.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_failure_retries() {
    let mut h = harness(
        false,
        vec![
            (Duration::from_millis(10), Err(SnapshotError::HttpStatus { status: 503 })),
            (Duration::from_millis(10), Ok(snapshot_at(7))),
        ],
    );
    h.feed.connect().unwrap();

    let _first = h.sockets.recv().await.unwrap();
    wait_for_state(&h.feed, ConnectionState::Error).await;

    let _second = h.sockets.recv().await.unwrap();
    wait_for_state(&h.feed, ConnectionState::Processing).await;
    assert_eq!(h.feed.view(1).await.unwrap().sequence, Some(7));

    let metrics = h.feed.metrics();
    assert_eq!(metrics.snapshot_failures, 1);
    assert_eq!(metrics.connection_attempts, 2);

    h.feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_without_socket() {
    let mut h = harness(false, vec![]);
    assert_eq!(h.feed.disconnect().await, Err(FeedError::NotConnected));

    let view = h.feed.view(1).await.unwrap();
    assert_eq!(view.state, ConnectionState::Closed);
    assert!(drain(&mut h.events).is_empty());

    h.feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_discards_late_snapshot() {
    let mut h = harness(false, vec![(Duration::from_secs(2), Ok(snapshot_at(50)))]);
    h.feed.connect().unwrap();

    let mut socket = h.sockets.recv().await.unwrap();
    assert!(socket.from_feed.recv().await.is_some());
    wait_for_state(&h.feed, ConnectionState::Syncing).await;

    h.feed.disconnect().await.unwrap();
    // The outbound side is released with the socket.
    assert!(socket.from_feed.recv().await.is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;

    let view = h.feed.view(10).await.unwrap();
    assert_eq!(view.state, ConnectionState::Closed);
    assert_eq!(view.sequence, None);
    assert_eq!(view.order_count, 0);
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.feed.metrics().connection_failures, 0);
    assert_eq!(h.feed.disconnect().await, Err(FeedError::NotConnected));

    h.feed.shutdown().await.unwrap();
}
