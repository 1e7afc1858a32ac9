//! Observability sink: the capability the core calls out to with named
//! lifecycle events. Distinct from the `tracing` logging layer in
//! [`crate::cfg::logger`] — this is for library consumers who want to feed
//! business metrics, not for operational logs a human reads.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{debug, warn};

/// Opaque identifier for a pool-owned connection, stable for its lifetime.
pub type ConnectionId = u64;

/// Lifecycle and health events a [`ObservabilitySink`] implementation may
/// act on. Implementations may no-op any subset.
pub trait ObservabilitySink: Send + Sync {
    /// The pool started establishing a new connection.
    fn started_connecting(&self, _id: ConnectionId) {}
    /// A connection finished its handshake successfully.
    fn connect_succeeded(&self, _id: ConnectionId) {}
    /// A connection attempt failed.
    fn connect_failed(&self, _id: ConnectionId, _cause: &str) {}
    /// A connection was handed out to a caller.
    fn connection_leased(&self, _id: ConnectionId) {}
    /// A connection was returned to the pool.
    fn connection_released(&self, _id: ConnectionId) {}
    /// A connection is being torn down.
    fn connection_closing(&self, _id: ConnectionId) {}
    /// A connection finished tearing down.
    fn connection_closed(&self, _id: ConnectionId, _cause: Option<&str>) {}
    /// A keep-alive probe was sent to an idle connection.
    fn keep_alive_triggered(&self, _id: ConnectionId) {}
    /// A keep-alive probe received its `MN` reply in time.
    fn keep_alive_succeeded(&self, _id: ConnectionId) {}
    /// A keep-alive probe failed or timed out.
    fn keep_alive_failed(&self, _id: ConnectionId, _cause: &str) {}
    /// The pool-wide count of queued lease waiters changed.
    fn request_queue_depth_changed(&self, _n: usize) {}
    /// A connection's in-flight request count changed relative to its
    /// pipelining capacity.
    fn connection_utilization_changed(
        &self,
        _id: ConnectionId,
        _in_flight: usize,
        _capacity: usize,
    ) {
    }
}

/// A sink that discards every event. The default for callers who don't need
/// one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {}

/// Bridges every [`ObservabilitySink`] event into a `tracing` event, mirroring
/// the way the connection lifecycle narration in this codebase's ancestry
/// used plain `debug!`/`warn!` calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn started_connecting(&self, id: ConnectionId) {
        debug!(connection_id = id, "started connecting");
    }

    fn connect_succeeded(&self, id: ConnectionId) {
        debug!(connection_id = id, "connect succeeded");
    }

    fn connect_failed(&self, id: ConnectionId, cause: &str) {
        warn!(connection_id = id, cause, "connect failed");
    }

    fn connection_leased(&self, id: ConnectionId) {
        debug!(connection_id = id, "connection leased");
    }

    fn connection_released(&self, id: ConnectionId) {
        debug!(connection_id = id, "connection released");
    }

    fn connection_closing(&self, id: ConnectionId) {
        debug!(connection_id = id, "connection closing");
    }

    fn connection_closed(&self, id: ConnectionId, cause: Option<&str>) {
        debug!(connection_id = id, cause, "connection closed");
    }

    fn keep_alive_triggered(&self, id: ConnectionId) {
        debug!(connection_id = id, "keep-alive triggered");
    }

    fn keep_alive_succeeded(&self, id: ConnectionId) {
        debug!(connection_id = id, "keep-alive succeeded");
    }

    fn keep_alive_failed(&self, id: ConnectionId, cause: &str) {
        warn!(connection_id = id, cause, "keep-alive failed");
    }

    fn request_queue_depth_changed(&self, n: usize) {
        debug!(depth = n, "request queue depth changed");
    }

    fn connection_utilization_changed(
        &self,
        id: ConnectionId,
        in_flight: usize,
        capacity: usize,
    ) {
        debug!(
            connection_id = id,
            in_flight, capacity, "connection utilization changed"
        );
    }
}
