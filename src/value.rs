//! User-value serialization: a narrow capability trait plus the
//! implementations the protocol actually needs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Converts a logical value to and from the raw bytes carried in a meta-set
/// payload or a meta-get `VA` data block.
///
/// The contract is intentionally narrow: writers append to a caller-owned
/// buffer and never fail; readers consume a byte slice and return `None` on
/// ill-formed input rather than panicking. Callers turn a `None` into
/// [`crate::error::ClientError::ProtocolError`].
pub trait Value: Sized {
    /// Appends this value's byte representation to `buffer`.
    fn write_to(&self, buffer: &mut Vec<u8>);

    /// Parses a value out of `bytes`, consuming the whole slice.
    ///
    /// Returns `None` if `bytes` is not a valid representation of `Self`.
    fn read_from(bytes: &[u8]) -> Option<Self>;
}

impl Value for Vec<u8> {
    fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self);
    }

    fn read_from(bytes: &[u8]) -> Option<Self> {
        Some(bytes.to_vec())
    }
}

impl Value for String {
    fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.as_bytes());
    }

    fn read_from(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().map(str::to_owned)
    }
}

/// Decimal-ASCII unsigned integer, matching the representation the server's
/// arithmetic commands operate on.
impl Value for u64 {
    fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.to_string().as_bytes());
    }

    fn read_from(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok()?.parse().ok()
    }
}
