//! The `Client` façade: a stateless holder of a [`Pool`] exposing a
//! lease-scoped entry point.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::warn;

use crate::{
    client::pool::{Connector, LeaseHandle, Pool, PoolConfig},
    error::ClientError,
    observability::ObservabilitySink,
};

/// Stateless façade over a [`Pool`]. Cloning is not needed — wrap in an
/// `Arc` if several tasks need to share one client.
pub struct Client<C: Connector> {
    pool: Arc<Pool<C>>,
    started: AtomicBool,
}

impl<C: Connector> Client<C> {
    /// Builds a client with the default [`crate::observability::NoopSink`].
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Client {
            pool: Pool::new(connector, config),
            started: AtomicBool::new(false),
        }
    }

    /// Builds a client reporting lifecycle events to `sink`.
    pub fn with_sink(connector: C, config: PoolConfig, sink: Arc<dyn ObservabilitySink>) -> Self {
        Client {
            pool: Pool::with_sink(connector, config, sink),
            started: AtomicBool::new(false),
        }
    }

    /// Drives the underlying pool's event loop. Must be awaited exactly
    /// once; typically spawned as its own task.
    pub async fn run(&self) -> Result<(), ClientError> {
        self.started.store(true, Ordering::SeqCst);
        self.pool.run().await
    }

    /// Requests that the pool's event loop stop: [`Client::run`] returns
    /// once pending leases have been failed and every pooled connection
    /// closed.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Leases a connection, invokes `f` with it, and releases it on every
    /// exit path — success, error, or the caller dropping the returned
    /// future.
    ///
    /// Calling this before [`Client::run`] has started is a logic error: the
    /// lease request will simply queue forever since nothing is driving the
    /// pool's event loop yet. A warning is emitted so the mistake is visible
    /// in logs rather than silently hanging.
    pub async fn with_connection<F, Fut, T>(&self, f: F) -> Result<T, ClientError>
    where
        F: FnOnce(&LeaseHandle<C::Stream>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        if !self.started.load(Ordering::SeqCst) {
            warn!(
                "Client::with_connection called before Client::run; the lease will not be \
                 served until run() starts the pool's event loop"
            );
        }

        let lease = self.pool.acquire().await?;
        let result = f(&lease).await;
        if let Err(ClientError::ConnectionShutdown { .. }) = &result {
            lease.mark_failed();
        }
        result
    }
}
