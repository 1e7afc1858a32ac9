//! Async client for memory-caching servers speaking the meta text protocol
//! (`mg`/`ms`/`md`/`ma`/`mn`).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Configuration file parsing and logger initialization.
pub mod cfg;
/// Connection multiplexer, pool and client façade.
pub mod client;
/// Error taxonomy exposed at the public API boundary.
pub mod error;
/// Observability sink capability and built-in implementations.
pub mod observability;
/// User-value serialization contract.
pub mod value;
/// Wire protocol: requests, responses, flags, encoder and decoder.
pub mod wire;

pub use client::{connection::Connection, facade::Client, pool::Pool};
pub use error::ClientError;
pub use observability::ObservabilitySink;
pub use value::Value;
