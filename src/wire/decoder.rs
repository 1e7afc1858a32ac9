//! Streaming response decoder.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::{
    error::ClientError,
    wire::response::{Response, ReturnCode},
};

/// Guards against an unbounded header line consuming memory indefinitely.
pub const MAX_HEADER_LEN: usize = 1024 * 1024;

/// Frames and parses the response stream per §4.1.2.
///
/// Implements [`tokio_util::codec::Decoder`] so a connection's read half can
/// be wrapped in a `FramedRead` (or driven manually via repeated `decode`
/// calls against a rolling [`BytesMut`]) the same way any other tokio-util
/// codec is used. A return of `Ok(None)` means "need more bytes"; the caller
/// must not consume anything from `src` in that case, which this
/// implementation upholds by only calling `src.advance` once a complete
/// frame is confirmed present.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseDecoder;

impl Decoder for ResponseDecoder {
    type Error = ClientError;
    type Item = Response;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, ClientError> {
        let header_end = match find_crlf(src) {
            Some(pos) => pos,
            None => {
                if src.len() > MAX_HEADER_LEN {
                    return Err(ClientError::decoder_error(
                        "header line exceeds maximum length without a terminating CRLF",
                    ));
                }
                return Ok(None);
            },
        };
        if header_end > MAX_HEADER_LEN {
            return Err(ClientError::decoder_error(
                "header line exceeds maximum length",
            ));
        }

        let header = &src[..header_end];
        let mut tokens = header.split(|b| *b == b' ').filter(|t| !t.is_empty());

        let code_token = tokens
            .next()
            .ok_or_else(|| ClientError::decoder_error("empty response header"))?;
        let return_code = ReturnCode::parse(code_token).ok_or_else(|| {
            ClientError::decoder_error(format!(
                "unknown return code {:?}",
                String::from_utf8_lossy(code_token)
            ))
        })?;

        let mut data_length = None;
        if return_code == ReturnCode::Va {
            let len_token = tokens
                .next()
                .ok_or_else(|| ClientError::decoder_error("VA header is missing its length"))?;
            let len: u64 = std::str::from_utf8(len_token)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    ClientError::decoder_error("VA header length is not a valid integer")
                })?;
            data_length = Some(len);
        }

        let mut ttl_remaining = None;
        for token in tokens {
            if let Some(rest) = token.strip_prefix(b"t")
                && let Ok(text) = std::str::from_utf8(rest)
                && let Ok(secs) = text.parse::<u64>()
            {
                ttl_remaining = Some(Duration::from_secs(secs));
            }
            // Unrecognized tokens are forward-compatible no-ops.
        }

        let total_needed = match data_length {
            Some(len) => header_end + 2 + len as usize + 2,
            None => header_end + 2,
        };
        if src.len() < total_needed {
            return Ok(None);
        }

        src.advance(header_end + 2);
        let value = match data_length {
            Some(len) => {
                let len = len as usize;
                let bytes = src[..len].to_vec();
                src.advance(len + 2);
                Some(bytes)
            },
            None => None,
        };

        Ok(Some(Response::new(
            return_code,
            data_length,
            ttl_remaining,
            value,
        )))
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
