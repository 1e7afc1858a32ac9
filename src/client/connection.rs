//! The connection multiplexer: one TCP (or TCP-like) pipeline, a FIFO waiter
//! queue, and the typed convenience operations built on top of it.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::VecDeque, sync::Arc, time::Instant};

use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{Mutex, mpsc, oneshot},
};
use tokio_util::{codec::Decoder, sync::CancellationToken};

use crate::{
    error::ClientError,
    observability::{ConnectionId, NoopSink, ObservabilitySink},
    value::Value,
    wire::{
        flags::{ArithmeticMode, Flags, StorageMode, TimeToLive},
        request::Request,
        response::ReturnCode,
        {RequestEncoder, Response, ResponseDecoder},
    },
};

/// Depth of the internal write queue, and the pipelining capacity reported
/// to [`ObservabilitySink::connection_utilization_changed`].
const WRITE_QUEUE_CAPACITY: usize = 64;

/// Connection lifecycle per §3: `Initial` accepts queued submissions,
/// `Running` actively serves them, `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Running,
    Finished,
}

type Waiter = oneshot::Sender<Result<Response, ClientError>>;

/// Outcome of an `increment`/`decrement` call, reflecting whether the caller
/// asked for the post-operation value (`flags.return_value`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOutcome {
    /// The operation applied; the caller did not ask for the new value.
    Stored,
    /// The operation applied and the server returned the new value.
    Value(u64),
}

/// One TCP pipeline: a single writer, a single reader, and the FIFO queue
/// tying submitted requests to the responses that answer them.
///
/// `submit` may be called before [`Connection::run`] starts — requests queue
/// on an internal channel and are served once the write side of `run`
/// begins draining it, which is what lets `Initial` accept submissions.
pub struct Connection<S> {
    write_tx: mpsc::Sender<(Request, Waiter)>,
    write_rx: Mutex<Option<mpsc::Receiver<(Request, Waiter)>>>,
    reader: Mutex<Option<ReadHalf<S>>>,
    writer: Mutex<Option<WriteHalf<S>>>,
    waiters: Arc<Mutex<VecDeque<Waiter>>>,
    state: Mutex<State>,
    cancel: CancellationToken,
    id: ConnectionId,
    sink: Arc<dyn ObservabilitySink>,
}

impl<S> Connection<S>
where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    /// Wraps a byte-duplex transport (a real `TcpStream`, a TLS stream, or a
    /// `tokio::io::duplex()` half in tests) in a fresh, not-yet-running
    /// connection.
    pub fn new(stream: S) -> Self {
        Self::with_sink(stream, 0, Arc::new(NoopSink))
    }

    /// Wraps `stream` in a connection reporting lifecycle events to `sink`
    /// under `id`. Used by [`crate::client::pool::Pool`], which owns both
    /// the id generator and the shared sink.
    pub fn with_sink(stream: S, id: ConnectionId, sink: Arc<dyn ObservabilitySink>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        Connection {
            write_tx,
            write_rx: Mutex::new(Some(write_rx)),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            waiters: Arc::new(Mutex::new(VecDeque::new())),
            state: Mutex::new(State::Initial),
            cancel: CancellationToken::new(),
            id,
            sink,
        }
    }

    /// A token that, when cancelled, stops [`Connection::run`] and fails all
    /// pending and future submissions with [`ClientError::ConnectionShutdown`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Enqueues `request` and waits for its matching response.
    ///
    /// Dropping the returned future before it resolves abandons the waiter
    /// slot in place (rather than removing it) so the FIFO queue stays
    /// aligned with the server's still-in-flight reply; that reply is simply
    /// discarded by the read loop once it arrives.
    pub async fn submit(&self, request: Request) -> Result<Response, ClientError> {
        if *self.state.lock().await == State::Finished {
            return Err(ClientError::connection_shutdown(
                "connection already finished",
            ));
        }
        let (tx, rx) = oneshot::channel();
        self.write_tx
            .send((request, tx))
            .await
            .map_err(|_| ClientError::connection_shutdown("write queue is closed"))?;
        rx.await
            .map_err(|_| ClientError::connection_shutdown("waiter was dropped"))?
    }

    /// Drives the read/write loop until a fatal error, remote close, or
    /// cancellation. Must be awaited exactly once per connection.
    pub async fn run(&self) -> Result<(), ClientError> {
        {
            let mut state = self.state.lock().await;
            if *state != State::Initial {
                return Err(ClientError::protocol_error(
                    "Connection::run called more than once",
                ));
            }
            *state = State::Running;
        }

        let reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or_else(|| ClientError::protocol_error("reader already taken"))?;
        let writer = self
            .writer
            .lock()
            .await
            .take()
            .ok_or_else(|| ClientError::protocol_error("writer already taken"))?;
        let mut write_rx = self
            .write_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ClientError::protocol_error("write queue already taken"))?;

        let waiters = Arc::clone(&self.waiters);
        let write_waiters = Arc::clone(&self.waiters);
        let cancel = self.cancel.clone();
        let read_cancel = self.cancel.clone();
        let write_sink = Arc::clone(&self.sink);
        let read_sink = Arc::clone(&self.sink);
        let id = self.id;

        let write_task = async move {
            let mut writer = writer;
            let mut buf = Vec::new();
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return Err(ClientError::connection_shutdown("run cancelled")),
                    next = write_rx.recv() => next,
                };
                // `write_tx` is held by `Connection` itself for its entire
                // lifetime, so this only fires once the connection is being
                // torn down.
                let Some((request, waiter)) = next else {
                    return Ok(());
                };
                buf.clear();
                if let Err(cause) = RequestEncoder.encode(&request, Instant::now(), &mut buf) {
                    let _ = waiter.send(Err(ClientError::protocol_error(cause)));
                    continue;
                }
                let in_flight = {
                    let mut pending = write_waiters.lock().await;
                    pending.push_back(waiter);
                    pending.len()
                };
                write_sink.connection_utilization_changed(id, in_flight, WRITE_QUEUE_CAPACITY);
                if let Err(e) = writer.write_all(&buf).await {
                    return Err(ClientError::connection_shutdown(format!(
                        "write failed: {e}"
                    )));
                }
            }
        };

        let read_task = async move {
            let mut reader = reader;
            let mut decoder = ResponseDecoder;
            let mut framed = BytesMut::with_capacity(4096);
            loop {
                let read = tokio::select! {
                    _ = read_cancel.cancelled() => return Err(ClientError::connection_shutdown("run cancelled")),
                    read = reader.read_buf(&mut framed) => read,
                };
                match read {
                    Ok(0) => {
                        return Err(ClientError::connection_shutdown(
                            "peer closed the connection",
                        ));
                    },
                    Ok(_) => loop {
                        match decoder.decode(&mut framed) {
                            Ok(Some(response)) => {
                                let resolved = {
                                    let mut pending = waiters.lock().await;
                                    let tx = pending.pop_front();
                                    tx.map(|tx| (tx, pending.len()))
                                };
                                if let Some((tx, in_flight)) = resolved {
                                    let _ = tx.send(Ok(response));
                                    read_sink.connection_utilization_changed(
                                        id,
                                        in_flight,
                                        WRITE_QUEUE_CAPACITY,
                                    );
                                }
                            },
                            Ok(None) => break,
                            Err(e) => return Err(e),
                        }
                    },
                    Err(e) => {
                        return Err(ClientError::connection_shutdown(format!(
                            "read failed: {e}"
                        )));
                    },
                }
            }
        };

        let result = tokio::select! {
            r = write_task => r,
            r = read_task => r,
        };

        *self.state.lock().await = State::Finished;
        let cause = match &result {
            Ok(()) => "connection closed".to_string(),
            Err(e) => e.to_string(),
        };
        let mut pending = self.waiters.lock().await;
        while let Some(tx) = pending.pop_front() {
            let _ = tx.send(Err(ClientError::connection_shutdown(cause.clone())));
        }

        result
    }

    async fn store(
        &self,
        key: &[u8],
        value: &[u8],
        mode: StorageMode,
        ttl: Option<TimeToLive>,
    ) -> Result<(), ClientError> {
        let response = self
            .submit(Request::Set {
                key: key.to_vec(),
                value: value.to_vec(),
                flags: Flags {
                    ttl,
                    storage_mode: Some(mode),
                    ..Default::default()
                },
            })
            .await?;
        match (mode, response.return_code) {
            (_, ReturnCode::Hd) => Ok(()),
            (StorageMode::Add, ReturnCode::Ns) => Err(ClientError::key_exists()),
            (
                StorageMode::Replace | StorageMode::Append | StorageMode::Prepend,
                ReturnCode::Ns,
            ) => Err(ClientError::key_not_found()),
            (_, other) => Err(ClientError::protocol_error(format!(
                "unexpected return code {other:?} for storage mode {mode:?}"
            ))),
        }
    }

    /// Unconditional store.
    pub async fn set<V: Value>(
        &self,
        key: &[u8],
        value: &V,
        ttl: Option<TimeToLive>,
    ) -> Result<(), ClientError> {
        let mut bytes = Vec::new();
        value.write_to(&mut bytes);
        self.store(key, &bytes, StorageMode::Set, ttl).await
    }

    /// Store only if the key does not already exist.
    pub async fn add<V: Value>(
        &self,
        key: &[u8],
        value: &V,
        ttl: Option<TimeToLive>,
    ) -> Result<(), ClientError> {
        let mut bytes = Vec::new();
        value.write_to(&mut bytes);
        self.store(key, &bytes, StorageMode::Add, ttl).await
    }

    /// Store only if the key already exists.
    pub async fn replace<V: Value>(
        &self,
        key: &[u8],
        value: &V,
        ttl: Option<TimeToLive>,
    ) -> Result<(), ClientError> {
        let mut bytes = Vec::new();
        value.write_to(&mut bytes);
        self.store(key, &bytes, StorageMode::Replace, ttl).await
    }

    /// Append to the existing value; fails with [`ClientError::KeyNotFound`]
    /// if absent.
    pub async fn append<V: Value>(&self, key: &[u8], value: &V) -> Result<(), ClientError> {
        let mut bytes = Vec::new();
        value.write_to(&mut bytes);
        self.store(key, &bytes, StorageMode::Append, None).await
    }

    /// Prepend to the existing value; fails with [`ClientError::KeyNotFound`]
    /// if absent.
    pub async fn prepend<V: Value>(&self, key: &[u8], value: &V) -> Result<(), ClientError> {
        let mut bytes = Vec::new();
        value.write_to(&mut bytes);
        self.store(key, &bytes, StorageMode::Prepend, None).await
    }

    /// Fetches the value for `key`, or `None` on a miss.
    pub async fn get<V: Value>(&self, key: &[u8]) -> Result<Option<V>, ClientError> {
        let response = self
            .submit(Request::Get {
                key: key.to_vec(),
                flags: Flags::get_value(),
            })
            .await?;
        match response.return_code {
            ReturnCode::Va => {
                let bytes = response
                    .value
                    .ok_or_else(|| ClientError::protocol_error("VA response missing a value"))?;
                V::read_from(&bytes)
                    .map(Some)
                    .ok_or_else(|| ClientError::protocol_error("value failed to decode"))
            },
            ReturnCode::En => Ok(None),
            other => Err(ClientError::protocol_error(format!(
                "unexpected return code {other:?} for get"
            ))),
        }
    }

    /// Deletes `key`.
    pub async fn delete(&self, key: &[u8]) -> Result<(), ClientError> {
        let response = self
            .submit(Request::Delete {
                key: key.to_vec(),
            })
            .await?;
        match response.return_code {
            ReturnCode::Hd => Ok(()),
            ReturnCode::Nf => Err(ClientError::key_not_found()),
            other => Err(ClientError::protocol_error(format!(
                "unexpected return code {other:?} for delete"
            ))),
        }
    }

    /// Extends `key`'s TTL without fetching its value. Implemented as a
    /// meta-get carrying a `T` token with `return_value = false`.
    pub async fn touch(&self, key: &[u8], ttl: TimeToLive) -> Result<(), ClientError> {
        let response = self
            .submit(Request::Get {
                key: key.to_vec(),
                flags: Flags {
                    ttl: Some(ttl),
                    ..Default::default()
                },
            })
            .await?;
        match response.return_code {
            ReturnCode::Hd => Ok(()),
            ReturnCode::Nf => Err(ClientError::key_not_found()),
            other => Err(ClientError::protocol_error(format!(
                "unexpected return code {other:?} for touch"
            ))),
        }
    }

    async fn arithmetic(
        &self,
        key: &[u8],
        mode: ArithmeticMode,
        return_value: bool,
    ) -> Result<ArithmeticOutcome, ClientError> {
        let response = self
            .submit(Request::Arithmetic {
                key: key.to_vec(),
                flags: Flags {
                    return_value,
                    arithmetic_mode: Some(mode),
                    ..Default::default()
                },
            })
            .await?;
        match response.return_code {
            ReturnCode::Va => {
                let bytes = response
                    .value
                    .ok_or_else(|| ClientError::protocol_error("VA response missing a value"))?;
                let value = u64::read_from(&bytes)
                    .ok_or_else(|| ClientError::protocol_error("arithmetic value not numeric"))?;
                Ok(ArithmeticOutcome::Value(value))
            },
            ReturnCode::Hd => Ok(ArithmeticOutcome::Stored),
            ReturnCode::Nf => Err(ClientError::key_not_found()),
            other => Err(ClientError::protocol_error(format!(
                "unexpected return code {other:?} for arithmetic"
            ))),
        }
    }

    /// Increments `key` by `delta`. Returns the new value only when
    /// `return_value` is set.
    pub async fn increment(
        &self,
        key: &[u8],
        delta: u64,
        return_value: bool,
    ) -> Result<ArithmeticOutcome, ClientError> {
        self.arithmetic(key, ArithmeticMode::Increment(delta), return_value)
            .await
    }

    /// Decrements `key` by `delta`. Returns the new value only when
    /// `return_value` is set.
    pub async fn decrement(
        &self,
        key: &[u8],
        delta: u64,
        return_value: bool,
    ) -> Result<ArithmeticOutcome, ClientError> {
        self.arithmetic(key, ArithmeticMode::Decrement(delta), return_value)
            .await
    }

    /// Sends a no-op, primarily used by [`crate::client::keepalive`].
    pub async fn noop(&self) -> Result<(), ClientError> {
        let response = self.submit(Request::NoOp).await?;
        match response.return_code {
            ReturnCode::Mn => Ok(()),
            other => Err(ClientError::protocol_error(format!(
                "unexpected return code {other:?} for noop"
            ))),
        }
    }
}
