//! Response representation.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::{Duration, Instant};

/// Closed set of return codes recognized on the wire. Any other two-letter
/// code is a fatal framing error (see [`crate::wire::decoder::ResponseDecoder`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// Stored / ok.
    Hd,
    /// Not stored.
    Ns,
    /// Exists.
    Ex,
    /// Not found.
    Nf,
    /// Value follows.
    Va,
    /// Miss / end.
    En,
    /// No-op reply.
    Mn,
}

impl ReturnCode {
    pub(crate) fn parse(token: &[u8]) -> Option<Self> {
        match token {
            b"HD" => Some(ReturnCode::Hd),
            b"NS" => Some(ReturnCode::Ns),
            b"EX" => Some(ReturnCode::Ex),
            b"NF" => Some(ReturnCode::Nf),
            b"VA" => Some(ReturnCode::Va),
            b"EN" => Some(ReturnCode::En),
            b"MN" => Some(ReturnCode::Mn),
            _ => None,
        }
    }
}

/// A fully framed, decoded response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The return code from the header line.
    pub return_code: ReturnCode,
    /// Payload length, present only for `VA`.
    pub data_length: Option<u64>,
    /// Remaining TTL, present only when the server echoed a `t` flag.
    pub ttl_remaining: Option<Duration>,
    /// Raw value bytes, present iff `return_code == Va`.
    pub value: Option<Vec<u8>>,
}

impl Response {
    pub(crate) fn new(
        return_code: ReturnCode,
        data_length: Option<u64>,
        ttl_remaining: Option<Duration>,
        value: Option<Vec<u8>>,
    ) -> Self {
        Response {
            return_code,
            data_length,
            ttl_remaining,
            value,
        }
    }
}

/// Helper matching the decoder's `now` reference point for any future
/// `ExpiresAt` math a caller performs on `ttl_remaining`.
pub fn instant_now() -> Instant {
    Instant::now()
}
