//! Request envelope and key validation.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::wire::flags::Flags;

/// Maximum key length accepted by the protocol.
pub const MAX_KEY_LEN: usize = 250;

/// A request to submit over a [`crate::client::connection::Connection`].
#[derive(Debug, Clone)]
pub enum Request {
    /// `mg <key> ...`
    Get {
        /// Target key.
        key: Vec<u8>,
        /// Request flags.
        flags: Flags,
    },
    /// `ms <key> <len> ...`
    Set {
        /// Target key.
        key: Vec<u8>,
        /// Raw payload bytes.
        value: Vec<u8>,
        /// Request flags.
        flags: Flags,
    },
    /// `md <key>`
    Delete {
        /// Target key.
        key: Vec<u8>,
    },
    /// `ma <key> M+|M- D<delta> ...`
    Arithmetic {
        /// Target key.
        key: Vec<u8>,
        /// Request flags; `arithmetic_mode` must be set.
        flags: Flags,
    },
    /// `mn`
    NoOp,
}

/// Validates a key per §3: non-empty, no whitespace or control bytes, at
/// most [`MAX_KEY_LEN`] bytes.
pub fn validate_key(key: &[u8]) -> Result<(), String> {
    if key.is_empty() {
        return Err("key must not be empty".to_string());
    }
    if key.len() > MAX_KEY_LEN {
        return Err(format!(
            "key length {} exceeds maximum of {MAX_KEY_LEN}",
            key.len()
        ));
    }
    if key.iter().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err("key must not contain whitespace or control bytes".to_string());
    }
    Ok(())
}
