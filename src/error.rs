//! Public error taxonomy.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::panic::Location;

use thiserror::Error;

/// Errors surfaced at the public API boundary.
///
/// Every variant records the call site via [`Location`] so operators can
/// tell where in the calling application a fault originated, independent of
/// any internal `anyhow` context chain that produced it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection has transitioned to `Finished` and can no longer serve
    /// requests.
    #[error("connection shut down at {location}: {cause}")]
    ConnectionShutdown {
        /// Human-readable cause (transport error, decode error, cancellation).
        cause: String,
        /// Call site that observed the shutdown.
        location: &'static Location<'static>,
    },

    /// The pool could not hand out a connection within its configured
    /// limits.
    #[error("no connection available at {location}: {cause}")]
    ConnectionUnavailable {
        /// Human-readable cause.
        cause: String,
        /// Call site that requested the lease.
        location: &'static Location<'static>,
    },

    /// The server replied with an unexpected return code, or a value payload
    /// could not be decoded into the requested [`crate::value::Value`] type.
    #[error("protocol error at {location}: {cause}")]
    ProtocolError {
        /// Human-readable cause.
        cause: String,
        /// Call site that observed the mismatch.
        location: &'static Location<'static>,
    },

    /// A command that demands presence of a key (delete, replace, touch)
    /// received `NF`.
    #[error("key not found at {location}")]
    KeyNotFound {
        /// Call site.
        location: &'static Location<'static>,
    },

    /// An `add` command received `NS` because the key already exists.
    #[error("key already exists at {location}")]
    KeyExists {
        /// Call site.
        location: &'static Location<'static>,
    },

    /// A framing violation in the response stream. Always fatal for the
    /// connection that raised it.
    #[error("decoder error at {location}: {cause}")]
    DecoderError {
        /// Human-readable cause.
        cause: String,
        /// Call site.
        location: &'static Location<'static>,
    },
}

impl ClientError {
    /// Builds a [`ClientError::ConnectionShutdown`] at the caller's location.
    #[track_caller]
    pub fn connection_shutdown(cause: impl Into<String>) -> Self {
        ClientError::ConnectionShutdown {
            cause: cause.into(),
            location: Location::caller(),
        }
    }

    /// Builds a [`ClientError::ConnectionUnavailable`] at the caller's
    /// location.
    #[track_caller]
    pub fn connection_unavailable(cause: impl Into<String>) -> Self {
        ClientError::ConnectionUnavailable {
            cause: cause.into(),
            location: Location::caller(),
        }
    }

    /// Builds a [`ClientError::ProtocolError`] at the caller's location.
    #[track_caller]
    pub fn protocol_error(cause: impl Into<String>) -> Self {
        ClientError::ProtocolError {
            cause: cause.into(),
            location: Location::caller(),
        }
    }

    /// Builds a [`ClientError::KeyNotFound`] at the caller's location.
    #[track_caller]
    pub fn key_not_found() -> Self {
        ClientError::KeyNotFound {
            location: Location::caller(),
        }
    }

    /// Builds a [`ClientError::KeyExists`] at the caller's location.
    #[track_caller]
    pub fn key_exists() -> Self {
        ClientError::KeyExists {
            location: Location::caller(),
        }
    }

    /// Builds a [`ClientError::DecoderError`] at the caller's location.
    #[track_caller]
    pub fn decoder_error(cause: impl Into<String>) -> Self {
        ClientError::DecoderError {
            cause: cause.into(),
            location: Location::caller(),
        }
    }
}

/// Convenience alias for fallible public API calls.
pub type Result<T> = std::result::Result<T, ClientError>;
