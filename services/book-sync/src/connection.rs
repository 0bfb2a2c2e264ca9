//! Connection state machine and feed driver
//!
//! `FeedMachine` is the synchronous core: it owns the connection state, the
//! failure counter, the connection epoch, the order book and the pending
//! queue, and decides what every input means. It performs no I/O.
//!
//! `BookFeed` is the async shell around it. A single task owns the machine
//! and receives every input (socket frames, snapshot completions, reconnect
//! timers, caller commands) through a mailbox, so all book mutations are
//! serialized in receipt order.
//!
//! Every asynchronous completion carries the epoch it was started under.
//! `connect()` and `disconnect()` bump the epoch, which is how a late
//! snapshot or an old timer is kept from touching a newer session.
//!
//! ```text
//!   connect()            socket open             snapshot ok
//! ──────────► Open ───────────────────► Syncing ─────────────► Processing
//!               │                          │                       │
//!               │ socket error/close       │ fetch failed /        │ socket closed
//!               ▼                          ▼ socket error          ▼
//!             Error ◄──────────────────── Error                 Closed
//!               │                                                  │
//!               └──── failures <= max: reconnect after delay ──────┘
//!                     failures  > max: GaveUp
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::ids::ProductId;
use types::numeric::Price;

use crate::config::FeedConfig;
use crate::emitter::EventEmitter;
use crate::error::{FeedError, SnapshotError};
use crate::events::{ConnectionState, FeedEvent, TimestampedEvent, UpdateKind, UpdateMessage};
use crate::metrics::{FeedMetrics, MetricsSnapshot};
use crate::order_book::{BookDepth, OrderBookStore};
use crate::pending::PendingQueue;
use crate::sequence::{classify, SequenceCheck};
use crate::snapshot::{RestSnapshotFetcher, Snapshot, SnapshotFetcher};
use crate::transport::{Connector, SocketConnection, SocketSignal, WsConnector};

/// What the driver must do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Input was stale or needs no follow-up.
    None,
    /// Schedule a reconnect for `epoch` after the configured delay.
    Reconnect { epoch: u64 },
}

/// Read-only copy of the book handed out to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookView {
    pub state: ConnectionState,
    pub sequence: Option<u64>,
    pub order_count: usize,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub depth: BookDepth,
}

/// Synchronous connection state machine.
pub struct FeedMachine {
    product: ProductId,
    max_failures: u32,
    state: ConnectionState,
    failures: u32,
    epoch: u64,
    /// A socket exists (opening or open) for the current epoch.
    has_socket: bool,
    store: OrderBookStore,
    pending: PendingQueue,
    emitter: EventEmitter,
    metrics: Arc<FeedMetrics>,
}

impl FeedMachine {
    pub fn new(product: ProductId, max_failures: u32, emitter: EventEmitter) -> Self {
        Self::with_metrics(product, max_failures, emitter, Arc::new(FeedMetrics::new()))
    }

    pub fn with_metrics(
        product: ProductId,
        max_failures: u32,
        emitter: EventEmitter,
        metrics: Arc<FeedMetrics>,
    ) -> Self {
        Self {
            product,
            max_failures,
            state: ConnectionState::Closed,
            failures: 0,
            epoch: 0,
            has_socket: false,
            store: OrderBookStore::new(),
            pending: PendingQueue::new(),
            emitter,
            metrics,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn has_socket(&self) -> bool {
        self.has_socket
    }

    pub fn store(&self) -> &OrderBookStore {
        &self.store
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn is_live(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.has_socket
    }

    /// Start a new session: fresh epoch, empty book, empty queue.
    ///
    /// Returns the epoch the caller must tag the new socket's inputs with.
    pub fn connect(&mut self) -> u64 {
        self.epoch += 1;
        self.has_socket = true;
        self.store = OrderBookStore::new();
        self.pending = PendingQueue::new();
        FeedMetrics::incr(&self.metrics.connection_attempts);

        info!(product = %self.product, epoch = self.epoch, failures = self.failures, "Connecting");
        self.transition(ConnectionState::Open);
        self.epoch
    }

    /// The socket for `epoch` is up. Returns true when the caller should send
    /// the subscribe message and start the snapshot fetch.
    pub fn socket_opened(&mut self, epoch: u64) -> bool {
        if !self.is_live(epoch) || self.state != ConnectionState::Open {
            debug!(epoch, current = self.epoch, "Ignoring open for superseded socket");
            return false;
        }
        self.transition(ConnectionState::Syncing);
        true
    }

    /// Subscribe frame sent when entering `Syncing`.
    pub fn subscribe_message(&self) -> String {
        serde_json::json!({
            "type": "subscribe",
            "product_id": self.product.as_str(),
        })
        .to_string()
    }

    /// A text frame arrived on the socket for `epoch` at `received_at`.
    pub fn message_received(&mut self, epoch: u64, text: &str, received_at: DateTime<Utc>) {
        if !self.is_live(epoch) {
            return;
        }
        FeedMetrics::incr(&self.metrics.messages_received);

        let message = match UpdateMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                FeedMetrics::incr(&self.metrics.messages_unparseable);
                warn!(error = %e, len = text.len(), "Dropping unparseable feed message");
                return;
            }
        };
        let event = TimestampedEvent::new(message, received_at);

        if self.state == ConnectionState::Processing {
            self.process(event);
        } else {
            FeedMetrics::incr(&self.metrics.messages_queued);
            self.pending.push(event);
        }
    }

    /// The snapshot fetch for `epoch` finished.
    pub fn snapshot_ready(
        &mut self,
        epoch: u64,
        result: Result<Snapshot, SnapshotError>,
    ) -> Result<Recovery, FeedError> {
        if !self.is_live(epoch) || self.state != ConnectionState::Syncing {
            debug!(epoch, current = self.epoch, "Discarding snapshot for superseded session");
            return Ok(Recovery::None);
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                FeedMetrics::incr(&self.metrics.snapshot_failures);
                warn!(product = %self.product, error = %e, "Snapshot fetch failed");
                return self.fail(ConnectionState::Error);
            }
        };

        info!(
            product = %self.product,
            sequence = snapshot.sequence,
            orders = snapshot.order_count(),
            queued = self.pending.len(),
            "Merging snapshot"
        );
        self.store.merge_snapshot(snapshot);
        FeedMetrics::incr(&self.metrics.snapshots_merged);
        self.transition(ConnectionState::Processing);

        for event in self.pending.drain() {
            self.process(event);
        }
        Ok(Recovery::None)
    }

    /// The socket for `epoch` closed.
    pub fn socket_closed(&mut self, epoch: u64) -> Result<Recovery, FeedError> {
        if !self.is_live(epoch) {
            return Ok(Recovery::None);
        }
        let next = if self.state == ConnectionState::Processing {
            ConnectionState::Closed
        } else {
            ConnectionState::Error
        };
        warn!(product = %self.product, epoch, state = %self.state, "Feed socket closed");
        self.fail(next)
    }

    /// The socket for `epoch` failed, or could not be opened at all.
    pub fn socket_failed(&mut self, epoch: u64, reason: &str) -> Result<Recovery, FeedError> {
        if !self.is_live(epoch) {
            return Ok(Recovery::None);
        }
        warn!(product = %self.product, epoch, error = reason, "Feed socket error");
        self.fail(ConnectionState::Error)
    }

    /// Whether a reconnect timer armed for `epoch` should still fire.
    pub fn reconnect_due(&self, epoch: u64) -> bool {
        epoch == self.epoch
            && !self.has_socket
            && matches!(self.state, ConnectionState::Error | ConnectionState::Closed)
    }

    /// Deliberate shutdown of the current socket. Not a failure: the counter
    /// is untouched and nothing is rescheduled.
    pub fn disconnect(&mut self) -> Result<(), FeedError> {
        if !self.has_socket {
            return Err(FeedError::NotConnected);
        }
        self.has_socket = false;
        self.epoch += 1;
        info!(product = %self.product, "Disconnecting");
        self.transition(ConnectionState::Closed);
        Ok(())
    }

    pub fn view(&self, max_levels: usize) -> BookView {
        BookView {
            state: self.state,
            sequence: self.store.sequence(),
            order_count: self.store.order_count(),
            best_bid: self.store.best_bid(),
            best_ask: self.store.best_ask(),
            depth: self.store.depth(max_levels),
        }
    }

    fn fail(&mut self, next: ConnectionState) -> Result<Recovery, FeedError> {
        self.failures += 1;
        self.has_socket = false;
        FeedMetrics::incr(&self.metrics.connection_failures);
        self.transition(next);

        if self.failures > self.max_failures {
            error!(
                product = %self.product,
                failures = self.failures,
                "Too many consecutive failures, giving up"
            );
            return Err(FeedError::GaveUp {
                failures: self.failures,
            });
        }
        Ok(Recovery::Reconnect { epoch: self.epoch })
    }

    fn transition(&mut self, new: ConnectionState) {
        let old = self.state;
        self.state = new;
        if new == ConnectionState::Processing {
            self.failures = 0;
        }
        debug!(%old, %new, epoch = self.epoch, "State changed");
        self.emitter.emit(FeedEvent::StateChanged { old, new });
    }

    fn process(&mut self, event: TimestampedEvent<UpdateMessage>) {
        let kind = event.payload.kind;
        let Some(sequence) = event.payload.sequence else {
            if kind == UpdateKind::Error {
                warn!(message = %event.payload.raw, "Feed reported an error");
            }
            self.emitter.emit(FeedEvent::Update(kind, event));
            return;
        };

        let check = classify(self.store.sequence(), sequence);
        match check {
            SequenceCheck::Stale => {
                FeedMetrics::incr(&self.metrics.messages_ignored);
                debug!(sequence, current = ?self.store.sequence(), kind = kind.label(), "Ignoring stale message");
                self.emitter.emit(FeedEvent::Ignored(event));
                return;
            }
            SequenceCheck::Gapped { expected, received } => {
                FeedMetrics::incr(&self.metrics.sequence_gaps);
                warn!(
                    product = %self.product,
                    expected,
                    received,
                    missing = check.missing(),
                    "Sequence gap detected, advancing"
                );
                self.emitter.emit(FeedEvent::SequenceGap { expected, received });
            }
            SequenceCheck::InOrder => {}
        }

        self.store.advance_to(sequence);
        self.store.apply(&event.payload);
        FeedMetrics::incr(&self.metrics.messages_applied);
        self.emitter.emit(FeedEvent::Update(kind, event));
    }
}

enum Command {
    Connect,
    Disconnect(oneshot::Sender<Result<(), FeedError>>),
    View {
        max_levels: usize,
        reply: oneshot::Sender<BookView>,
    },
    Shutdown,
}

enum Input {
    Opened { epoch: u64, connection: SocketConnection },
    ConnectFailed { epoch: u64, reason: String },
    Socket {
        epoch: u64,
        signal: SocketSignal,
        received_at: DateTime<Utc>,
    },
    Snapshot {
        epoch: u64,
        result: Result<Snapshot, SnapshotError>,
    },
    ReconnectDue { epoch: u64 },
}

/// The socket currently attached to the machine.
struct ActiveSocket {
    outbound: mpsc::UnboundedSender<String>,
    forwarder: JoinHandle<()>,
}

impl Drop for ActiveSocket {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

struct FeedDriver {
    config: FeedConfig,
    machine: FeedMachine,
    connector: Arc<dyn Connector>,
    fetcher: Arc<dyn SnapshotFetcher>,
    inputs: mpsc::UnboundedSender<Input>,
    socket: Option<ActiveSocket>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl FeedDriver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inputs: mpsc::UnboundedReceiver<Input>,
    ) -> Result<(), FeedError> {
        let result = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break Ok(()),
                    Some(command) => self.handle_command(command),
                },
                Some(input) = inputs.recv() => {
                    if let Err(e) = self.handle_input(input) {
                        break Err(e);
                    }
                }
            }
        };

        self.cancel_reconnect();
        self.socket = None;
        info!(product = %self.config.product_id, ?result, "Feed task stopped");
        result
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.start_connect(),
            Command::Disconnect(reply) => {
                let result = self.machine.disconnect();
                if result.is_ok() {
                    self.cancel_reconnect();
                    self.socket = None;
                }
                let _ = reply.send(result);
            }
            Command::View { max_levels, reply } => {
                let _ = reply.send(self.machine.view(max_levels));
            }
            Command::Shutdown => {}
        }
    }

    fn handle_input(&mut self, input: Input) -> Result<(), FeedError> {
        match input {
            Input::Opened { epoch, connection } => self.attach(epoch, connection),
            Input::ConnectFailed { epoch, reason } => {
                let recovery = self.machine.socket_failed(epoch, &reason)?;
                self.recover(recovery);
            }
            Input::Socket {
                epoch,
                signal,
                received_at,
            } => match signal {
                SocketSignal::Text(text) => self.machine.message_received(epoch, &text, received_at),
                SocketSignal::Closed => {
                    let recovery = self.machine.socket_closed(epoch)?;
                    self.recover(recovery);
                }
                SocketSignal::Error(reason) => {
                    let recovery = self.machine.socket_failed(epoch, &reason)?;
                    self.recover(recovery);
                }
            },
            Input::Snapshot { epoch, result } => {
                let recovery = self.machine.snapshot_ready(epoch, result)?;
                self.recover(recovery);
            }
            Input::ReconnectDue { epoch } => {
                self.reconnect_timer = None;
                if self.machine.reconnect_due(epoch) {
                    self.start_connect();
                }
            }
        }
        Ok(())
    }

    fn start_connect(&mut self) {
        self.cancel_reconnect();
        self.socket = None;
        let epoch = self.machine.connect();

        let connector = Arc::clone(&self.connector);
        let url = self.config.websocket_url.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let input = match connector.connect(&url).await {
                Ok(connection) => Input::Opened { epoch, connection },
                Err(e) => Input::ConnectFailed {
                    epoch,
                    reason: e.to_string(),
                },
            };
            let _ = inputs.send(input);
        });
    }

    fn attach(&mut self, epoch: u64, connection: SocketConnection) {
        if !self.machine.socket_opened(epoch) {
            return;
        }
        let SocketConnection {
            outbound,
            mut inbound,
        } = connection;

        let inputs = self.inputs.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(signal) = inbound.recv().await {
                let received_at = Utc::now();
                let terminal = !matches!(signal, SocketSignal::Text(_));
                if inputs
                    .send(Input::Socket {
                        epoch,
                        signal,
                        received_at,
                    })
                    .is_err()
                    || terminal
                {
                    return;
                }
            }
            // Sender side vanished without a terminal signal.
            let _ = inputs.send(Input::Socket {
                epoch,
                signal: SocketSignal::Closed,
                received_at: Utc::now(),
            });
        });

        if outbound.send(self.machine.subscribe_message()).is_err() {
            warn!(epoch, "Socket closed before subscribe could be sent");
        }
        self.socket = Some(ActiveSocket { outbound, forwarder });

        let fetcher = Arc::clone(&self.fetcher);
        let product = self.config.product_id.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch_snapshot(&product).await;
            let _ = inputs.send(Input::Snapshot { epoch, result });
        });
    }

    fn recover(&mut self, recovery: Recovery) {
        let Recovery::Reconnect { epoch } = recovery else {
            return;
        };
        self.socket = None;
        self.cancel_reconnect();

        let delay = self.config.reconnect_delay;
        info!(
            product = %self.config.product_id,
            failures = self.machine.failures(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        let inputs = self.inputs.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(Input::ReconnectDue { epoch });
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

/// Handle to a running order book feed.
pub struct BookFeed {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<Result<(), FeedError>>,
    metrics: Arc<FeedMetrics>,
}

impl BookFeed {
    /// Start a feed against the exchange's public WebSocket and REST endpoints.
    pub fn start(config: FeedConfig, emitter: EventEmitter) -> Self {
        let fetcher = Arc::new(RestSnapshotFetcher::new(&config));
        Self::spawn(config, Arc::new(WsConnector::new()), fetcher, emitter)
    }

    /// Spawn the feed task with explicit collaborators. The feed stays
    /// `Closed` until [`BookFeed::connect`] is called.
    pub fn spawn(
        config: FeedConfig,
        connector: Arc<dyn Connector>,
        fetcher: Arc<dyn SnapshotFetcher>,
        emitter: EventEmitter,
    ) -> Self {
        let metrics = Arc::new(FeedMetrics::new());
        let machine = FeedMachine::with_metrics(
            config.product_id.clone(),
            config.max_consecutive_failures,
            emitter,
            Arc::clone(&metrics),
        );
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let driver = FeedDriver {
            config,
            machine,
            connector,
            fetcher,
            inputs: input_tx,
            socket: None,
            reconnect_timer: None,
        };
        let task = tokio::spawn(driver.run(command_rx, input_rx));

        Self {
            commands: command_tx,
            task,
            metrics,
        }
    }

    /// Open (or reopen) the socket and bootstrap the book.
    pub fn connect(&self) -> Result<(), FeedError> {
        self.commands
            .send(Command::Connect)
            .map_err(|_| FeedError::Stopped)
    }

    /// Close the current socket without scheduling a reconnect.
    pub async fn disconnect(&self) -> Result<(), FeedError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Disconnect(reply))
            .map_err(|_| FeedError::Stopped)?;
        rx.await.map_err(|_| FeedError::Stopped)?
    }

    /// Current state plus a copy of the book aggregated to `max_levels`.
    pub async fn view(&self, max_levels: usize) -> Result<BookView, FeedError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::View { max_levels, reply })
            .map_err(|_| FeedError::Stopped)?;
        rx.await.map_err(|_| FeedError::Stopped)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Wait for the feed to stop. Resolves with `GaveUp` when the reconnect
    /// budget is exhausted.
    pub async fn join(self) -> Result<(), FeedError> {
        let BookFeed { commands, task, .. } = self;
        let result = task.await.map_err(|_| FeedError::Stopped)?;
        drop(commands);
        result
    }

    /// Stop the feed task and release the socket.
    pub async fn shutdown(self) -> Result<(), FeedError> {
        let _ = self.commands.send(Command::Shutdown);
        self.join().await
    }
}
