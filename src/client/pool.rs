//! Connection pool: a single event-driven task owns admission, scaling,
//! idle retirement, keep-alive scheduling and shutdown draining.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    ops::Deref,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex, mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    client::{connection::Connection, keepalive},
    error::ClientError,
    observability::{ConnectionId, NoopSink, ObservabilitySink},
};

/// A boxed future, used for the connector's return type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies fresh transport connections to the pool. Implement this against
/// `TcpStream::connect` for production use, or against an in-memory
/// `tokio::io::duplex()` half for tests.
pub trait Connector: Send + Sync + 'static {
    /// The byte-duplex stream type this connector produces.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Establishes one new transport connection.
    fn connect(&self) -> BoxFuture<'static, std::io::Result<Self::Stream>>;
}

/// Tunable pool limits, matching the defaults in §6.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PoolConfig {
    /// Floor on live connections.
    #[serde(rename = "min_connections", default)]
    pub min_connections: usize,
    /// Preferred ceiling; exceeded only under lease pressure.
    #[serde(rename = "soft_limit")]
    pub soft_limit: usize,
    /// Absolute ceiling.
    #[serde(rename = "hard_limit")]
    pub hard_limit: usize,
    /// Retirement threshold for idle connections.
    #[serde(rename = "idle_timeout_secs", with = "crate::cfg::config::serde_secs")]
    pub idle_timeout: Duration,
    /// Cadence of no-op probes against idle connections.
    #[serde(
        rename = "keep_alive_frequency_secs",
        with = "crate::cfg::config::serde_secs"
    )]
    pub keep_alive_frequency: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_connections: 0,
            soft_limit: 16,
            hard_limit: 16,
            idle_timeout: Duration::from_secs(60),
            keep_alive_frequency: Duration::from_secs(30),
        }
    }
}

/// Number of queued waiters beyond which the pool will grow past
/// `soft_limit` (while staying under `hard_limit`).
const PRESSURE_THRESHOLD: usize = 1;

/// Cadence at which the pool's internal idle/keep-alive timer fires.
const TICK_INTERVAL_FLOOR: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Starting,
    Idle,
    Leased,
    KeepAliveInFlight,
    Closing,
}

struct Entry<S> {
    state: EntryState,
    last_used: Instant,
    conn: Option<Arc<Connection<S>>>,
}

type LeaseResult<S> = Result<LeaseHandle<S>, ClientError>;

enum Event<S> {
    LeaseRequested(oneshot::Sender<LeaseResult<S>>),
    LeaseReturned { id: u64, failed: bool },
    ConnectionEstablished { id: u64, conn: Arc<Connection<S>> },
    ConnectionFailed { id: u64, cause: String },
    IdleTick,
    KeepAliveDue { id: u64 },
    KeepAliveResult { id: u64, ok: bool },
}

/// A leased connection. Dropping it returns the connection to the pool;
/// call [`LeaseHandle::mark_failed`] first if the lease observed a fatal
/// transport error so the pool retires the connection instead of recycling
/// it.
pub struct LeaseHandle<S> {
    id: u64,
    conn: Arc<Connection<S>>,
    events_tx: mpsc::Sender<Event<S>>,
    failed: AtomicBool,
}

impl<S> LeaseHandle<S> {
    /// Marks the underlying connection as unusable; on drop the pool will
    /// close it instead of returning it to the idle set.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    /// The pool-scoped identifier of the leased connection.
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }
}

impl<S> Deref for LeaseHandle<S> {
    type Target = Connection<S>;

    fn deref(&self) -> &Connection<S> {
        &self.conn
    }
}

impl<S> Drop for LeaseHandle<S> {
    fn drop(&mut self) {
        let _ = self.events_tx.try_send(Event::LeaseReturned {
            id: self.id,
            failed: self.failed.load(Ordering::SeqCst),
        });
    }
}

/// The connection pool. Call [`Pool::run`] exactly once to start the event
/// loop; call [`Pool::acquire`] any number of times (before or after `run`
/// starts — requests queue the same way [`Connection::submit`] does).
pub struct Pool<C: Connector> {
    connector: Arc<C>,
    config: PoolConfig,
    sink: Arc<dyn ObservabilitySink>,
    events_tx: mpsc::Sender<Event<C::Stream>>,
    events_rx: Mutex<Option<mpsc::Receiver<Event<C::Stream>>>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl<C: Connector> Pool<C> {
    /// Builds a pool with the default [`NoopSink`].
    pub fn new(connector: C, config: PoolConfig) -> Arc<Self> {
        Self::with_sink(connector, config, Arc::new(NoopSink))
    }

    /// Builds a pool reporting lifecycle events to `sink`.
    pub fn with_sink(
        connector: C,
        config: PoolConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(256);
        Arc::new(Pool {
            connector: Arc::new(connector),
            config,
            sink,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        })
    }

    /// A token that, when cancelled, stops [`Pool::run`] and closes every
    /// pooled connection.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests that [`Pool::run`] stop: pending and future leases fail with
    /// [`ClientError::ConnectionUnavailable`] and every pooled connection is
    /// closed.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Leases a connection, waiting if the pool is at `hard_limit`.
    pub async fn acquire(&self) -> Result<LeaseHandle<C::Stream>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.events_tx
            .send(Event::LeaseRequested(tx))
            .await
            .map_err(|_| ClientError::connection_unavailable("pool event loop is not running"))?;
        rx.await
            .map_err(|_| ClientError::connection_unavailable("pool event loop dropped the request"))?
    }

    /// Drives the pool's event loop until cancelled or told to shut down.
    /// Must be awaited exactly once.
    pub async fn run(&self) -> Result<(), ClientError> {
        let mut events_rx = self
            .events_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ClientError::protocol_error("Pool::run called more than once"))?;

        let mut entries: HashMap<u64, Entry<C::Stream>> = HashMap::new();
        let mut waiters: VecDeque<oneshot::Sender<LeaseResult<C::Stream>>> = VecDeque::new();

        let tick_period = self.config.keep_alive_frequency.min(self.config.idle_timeout).max(TICK_INTERVAL_FLOOR);
        let mut ticker = tokio::time::interval(tick_period);
        // warm the pool up to its floor
        for _ in 0..self.config.min_connections {
            self.spawn_connect(&mut entries);
        }

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => Event::IdleTick,
                maybe = events_rx.recv() => match maybe {
                    Some(e) => e,
                    None => break,
                },
            };

            match event {
                Event::LeaseRequested(waiter_tx) => {
                    self.handle_lease_requested(&mut entries, &mut waiters, waiter_tx);
                },
                Event::LeaseReturned { id, failed } => {
                    self.handle_lease_returned(&mut entries, &mut waiters, id, failed);
                },
                Event::ConnectionEstablished { id, conn } => {
                    self.handle_connection_established(&mut entries, &mut waiters, id, conn);
                },
                Event::ConnectionFailed { id, cause } => {
                    self.handle_connection_failed(&mut entries, &mut waiters, id, cause);
                },
                Event::IdleTick => {
                    self.handle_idle_tick(&mut entries);
                },
                Event::KeepAliveDue { id } => {
                    self.handle_keep_alive_due(&mut entries, id);
                },
                Event::KeepAliveResult { id, ok } => {
                    self.handle_keep_alive_result(&mut entries, &mut waiters, id, ok);
                },
            }
            self.sink.request_queue_depth_changed(waiters.len());
        }

        for (id, entry) in entries.drain() {
            if let Some(conn) = &entry.conn {
                conn.cancellation_token().cancel();
            }
            self.sink.connection_closed(id, Some("pool shut down"));
        }
        for waiter in waiters.drain(..) {
            let _ = waiter.send(Err(ClientError::connection_unavailable(
                "pool shut down while waiting for a connection",
            )));
        }

        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn live_count(entries: &HashMap<u64, Entry<C::Stream>>) -> usize {
        entries
            .values()
            .filter(|e| e.state != EntryState::Closing)
            .count()
    }

    fn find_idle(entries: &HashMap<u64, Entry<C::Stream>>) -> Option<u64> {
        entries
            .iter()
            .find(|(_, e)| e.state == EntryState::Idle)
            .map(|(id, _)| *id)
    }

    fn spawn_connect(&self, entries: &mut HashMap<u64, Entry<C::Stream>>) {
        let id = self.next_id();
        entries.insert(id, Entry {
            state: EntryState::Starting,
            last_used: Instant::now(),
            conn: None,
        });
        self.sink.started_connecting(id);

        let connector = Arc::clone(&self.connector);
        let events_tx = self.events_tx.clone();
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match connector.connect().await {
                Ok(stream) => {
                    let conn = Arc::new(Connection::with_sink(stream, id, sink));
                    let run_conn = Arc::clone(&conn);
                    let run_events_tx = events_tx.clone();
                    tokio::spawn(async move {
                        let outcome = run_conn.run().await;
                        let cause = match outcome {
                            Ok(()) => "connection loop finished".to_string(),
                            Err(e) => e.to_string(),
                        };
                        let _ = run_events_tx
                            .send(Event::ConnectionFailed { id, cause })
                            .await;
                    });
                    let _ = events_tx
                        .send(Event::ConnectionEstablished { id, conn })
                        .await;
                },
                Err(e) => {
                    let _ = events_tx
                        .send(Event::ConnectionFailed {
                            id,
                            cause: e.to_string(),
                        })
                        .await;
                },
            }
        });
    }

    fn handle_lease_requested(
        &self,
        entries: &mut HashMap<u64, Entry<C::Stream>>,
        waiters: &mut VecDeque<oneshot::Sender<LeaseResult<C::Stream>>>,
        waiter_tx: oneshot::Sender<LeaseResult<C::Stream>>,
    ) {
        if let Some(id) = Self::find_idle(entries) {
            self.lease_entry(entries, id, waiter_tx);
            return;
        }

        let live = Self::live_count(entries);
        let queue_depth = waiters.len();
        let should_spawn = live < self.config.soft_limit
            || (live < self.config.hard_limit && queue_depth >= PRESSURE_THRESHOLD);

        if should_spawn && live < self.config.hard_limit {
            self.spawn_connect(entries);
        }
        waiters.push_back(waiter_tx);
    }

    fn lease_entry(
        &self,
        entries: &mut HashMap<u64, Entry<C::Stream>>,
        id: u64,
        waiter_tx: oneshot::Sender<LeaseResult<C::Stream>>,
    ) {
        let Some(entry) = entries.get_mut(&id) else {
            waiters_fallback(waiter_tx);
            return;
        };
        let Some(conn) = entry.conn.clone() else {
            waiters_fallback(waiter_tx);
            return;
        };
        entry.state = EntryState::Leased;
        entry.last_used = Instant::now();
        let handle = LeaseHandle {
            id,
            conn,
            events_tx: self.events_tx.clone(),
            failed: AtomicBool::new(false),
        };
        self.sink.connection_leased(id);
        let _ = waiter_tx.send(Ok(handle));
    }

    fn handle_lease_returned(
        &self,
        entries: &mut HashMap<u64, Entry<C::Stream>>,
        waiters: &mut VecDeque<oneshot::Sender<LeaseResult<C::Stream>>>,
        id: u64,
        failed: bool,
    ) {
        self.sink.connection_released(id);
        if failed {
            self.close_entry(entries, id, "lease reported a fatal error");
            if Self::live_count(entries) < self.config.min_connections {
                self.spawn_connect(entries);
            }
            return;
        }

        if let Some(entry) = entries.get_mut(&id) {
            entry.state = EntryState::Idle;
            entry.last_used = Instant::now();
        }
        if let Some(waiter) = waiters.pop_front() {
            self.lease_entry(entries, id, waiter);
        }
    }

    fn handle_connection_established(
        &self,
        entries: &mut HashMap<u64, Entry<C::Stream>>,
        waiters: &mut VecDeque<oneshot::Sender<LeaseResult<C::Stream>>>,
        id: u64,
        conn: Arc<Connection<C::Stream>>,
    ) {
        self.sink.connect_succeeded(id);
        if let Some(entry) = entries.get_mut(&id) {
            entry.conn = Some(conn);
            entry.state = EntryState::Idle;
            entry.last_used = Instant::now();
        }
        if let Some(waiter) = waiters.pop_front() {
            self.lease_entry(entries, id, waiter);
        }
    }

    fn handle_connection_failed(
        &self,
        entries: &mut HashMap<u64, Entry<C::Stream>>,
        waiters: &mut VecDeque<oneshot::Sender<LeaseResult<C::Stream>>>,
        id: u64,
        cause: String,
    ) {
        self.sink.connect_failed(id, &cause);
        entries.remove(&id);
        if let Some(waiter) = waiters.pop_front() {
            let _ = waiter.send(Err(ClientError::connection_unavailable(cause)));
        }
    }

    fn handle_idle_tick(&self, entries: &mut HashMap<u64, Entry<C::Stream>>) {
        let now = Instant::now();
        let live = Self::live_count(entries);
        let min = self.config.min_connections;
        let idle_timeout = self.config.idle_timeout;
        let keep_alive_frequency = self.config.keep_alive_frequency;

        let mut to_retire = Vec::new();
        let mut to_probe = Vec::new();
        let mut retireable_live = live;

        for (id, entry) in entries.iter() {
            if entry.state != EntryState::Idle {
                continue;
            }
            let idle_for = now.saturating_duration_since(entry.last_used);
            if idle_for >= idle_timeout && retireable_live > min {
                to_retire.push(*id);
                retireable_live -= 1;
            } else if idle_for >= keep_alive_frequency {
                to_probe.push(*id);
            }
        }

        for id in to_retire {
            self.close_entry(entries, id, "idle timeout exceeded");
        }
        for id in to_probe {
            if let Some(entry) = entries.get_mut(&id) {
                entry.state = EntryState::KeepAliveInFlight;
            }
            self.dispatch_keep_alive(entries, id);
        }
    }

    fn handle_keep_alive_due(&self, entries: &mut HashMap<u64, Entry<C::Stream>>, id: u64) {
        if let Some(entry) = entries.get_mut(&id)
            && entry.state == EntryState::Idle
        {
            entry.state = EntryState::KeepAliveInFlight;
            self.dispatch_keep_alive(entries, id);
        }
    }

    fn dispatch_keep_alive(&self, entries: &HashMap<u64, Entry<C::Stream>>, id: u64) {
        let Some(conn) = entries.get(&id).and_then(|e| e.conn.clone()) else {
            return;
        };
        self.sink.keep_alive_triggered(id);
        let frequency = self.config.keep_alive_frequency;
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let ok = keepalive::probe(&conn, frequency).await.is_ok();
            let _ = events_tx.send(Event::KeepAliveResult { id, ok }).await;
        });
    }

    fn handle_keep_alive_result(
        &self,
        entries: &mut HashMap<u64, Entry<C::Stream>>,
        waiters: &mut VecDeque<oneshot::Sender<LeaseResult<C::Stream>>>,
        id: u64,
        ok: bool,
    ) {
        if ok {
            self.sink.keep_alive_succeeded(id);
            if let Some(entry) = entries.get_mut(&id) {
                entry.state = EntryState::Idle;
                entry.last_used = Instant::now();
            }
            if let Some(waiter) = waiters.pop_front() {
                self.lease_entry(entries, id, waiter);
            }
        } else {
            self.sink.keep_alive_failed(id, "probe failed or timed out");
            self.close_entry(entries, id, "keep-alive probe failed");
            if Self::live_count(entries) < self.config.min_connections {
                self.spawn_connect(entries);
            }
        }
    }

    fn close_entry(&self, entries: &mut HashMap<u64, Entry<C::Stream>>, id: u64, cause: &str) {
        self.sink.connection_closing(id);
        if let Some(entry) = entries.get_mut(&id) {
            entry.state = EntryState::Closing;
        }
        if let Some(entry) = entries.remove(&id)
            && let Some(conn) = entry.conn
        {
            conn.cancellation_token().cancel();
        }
        self.sink.connection_closed(id, Some(cause));
    }
}

fn waiters_fallback<S>(waiter_tx: oneshot::Sender<LeaseResult<S>>) {
    let _ = waiter_tx.send(Err(ClientError::connection_unavailable(
        "connection entry vanished before it could be leased",
    )));
    warn!("lease target disappeared between selection and handoff");
}
