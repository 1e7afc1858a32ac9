//! Stateless request encoder.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Instant;

use crate::wire::{
    flags::ArithmeticMode,
    request::{Request, validate_key},
};

/// Serializes [`Request`]s into the wire grammar described by §4.1.1.
///
/// Encoding is pure over its inputs: it never buffers across calls and never
/// fails for requests built through the typed methods on
/// [`crate::client::connection::Connection`] (which enforce key and delta
/// preconditions before reaching the encoder).
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestEncoder;

impl RequestEncoder {
    /// Appends the wire representation of `request` to `buffer`.
    ///
    /// `now` anchors any `TimeToLive::ExpiresAt` computation; callers
    /// normally pass `Instant::now()`.
    pub fn encode(
        &self,
        request: &Request,
        now: Instant,
        buffer: &mut Vec<u8>,
    ) -> Result<(), String> {
        match request {
            Request::Get { key, flags } => {
                validate_key(key)?;
                buffer.extend_from_slice(b"mg ");
                buffer.extend_from_slice(key);
                if flags.return_value {
                    buffer.extend_from_slice(b" v");
                }
                if flags.return_ttl {
                    buffer.extend_from_slice(b" t");
                }
                if let Some(ttl) = flags.ttl {
                    buffer.extend_from_slice(format!(" T{}", ttl.seconds_from(now)).as_bytes());
                }
                buffer.extend_from_slice(b"\r\n");
            },
            Request::Set { key, value, flags } => {
                validate_key(key)?;
                buffer.extend_from_slice(b"ms ");
                buffer.extend_from_slice(key);
                buffer.extend_from_slice(format!(" {}", value.len()).as_bytes());
                if let Some(ttl) = flags.ttl {
                    buffer.extend_from_slice(format!(" T{}", ttl.seconds_from(now)).as_bytes());
                }
                if let Some(mode) = flags.storage_mode {
                    buffer.extend_from_slice(format!(" M{}", mode.code()).as_bytes());
                }
                buffer.extend_from_slice(b"\r\n");
                buffer.extend_from_slice(value);
                buffer.extend_from_slice(b"\r\n");
            },
            Request::Delete { key } => {
                validate_key(key)?;
                buffer.extend_from_slice(b"md ");
                buffer.extend_from_slice(key);
                buffer.extend_from_slice(b"\r\n");
            },
            Request::Arithmetic { key, flags } => {
                validate_key(key)?;
                let mode = flags
                    .arithmetic_mode
                    .ok_or_else(|| "arithmetic request requires arithmetic_mode".to_string())?;
                let (op, delta) = match mode {
                    ArithmeticMode::Increment(d) => ("M+", d),
                    ArithmeticMode::Decrement(d) => ("M-", d),
                };
                if delta == 0 {
                    return Err("arithmetic delta must be > 0".to_string());
                }
                buffer.extend_from_slice(b"ma ");
                buffer.extend_from_slice(key);
                buffer.extend_from_slice(format!(" {op} D{delta}").as_bytes());
                if flags.return_value {
                    buffer.extend_from_slice(b" v");
                }
                buffer.extend_from_slice(b"\r\n");
            },
            Request::NoOp => {
                buffer.extend_from_slice(b"mn\r\n");
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::flags::{Flags, StorageMode, TimeToLive};

    fn encode(request: &Request) -> Vec<u8> {
        let mut buf = Vec::new();
        RequestEncoder
            .encode(request, Instant::now(), &mut buf)
            .expect("encode should succeed for a well-formed request");
        buf
    }

    #[test]
    fn set_without_ttl() {
        let req = Request::Set {
            key: b"foo".to_vec(),
            value: b"hi".to_vec(),
            flags: Flags::default(),
        };
        assert_eq!(encode(&req), b"ms foo 2\r\nhi\r\n");
    }

    #[test]
    fn set_with_ttl() {
        let req = Request::Set {
            key: b"foo".to_vec(),
            value: b"hi".to_vec(),
            flags: Flags {
                ttl: Some(TimeToLive::in_seconds(89)),
                ..Default::default()
            },
        };
        assert_eq!(encode(&req), b"ms foo 2 T89\r\nhi\r\n");
    }

    #[test]
    fn set_with_storage_mode_discriminates_every_mode() {
        let cases = [
            (StorageMode::Set, &b"ms foo 2 MS\r\nhi\r\n"[..]),
            (StorageMode::Add, &b"ms foo 2 ME\r\nhi\r\n"[..]),
            (StorageMode::Append, &b"ms foo 2 MA\r\nhi\r\n"[..]),
            (StorageMode::Prepend, &b"ms foo 2 MP\r\nhi\r\n"[..]),
            (StorageMode::Replace, &b"ms foo 2 MR\r\nhi\r\n"[..]),
        ];
        for (mode, expected) in cases {
            let req = Request::Set {
                key: b"foo".to_vec(),
                value: b"hi".to_vec(),
                flags: Flags {
                    storage_mode: Some(mode),
                    ..Default::default()
                },
            };
            assert_eq!(encode(&req), expected, "mismatch for {mode:?}");
        }
    }

    #[test]
    fn get_with_value_flag() {
        let req = Request::Get {
            key: b"foo".to_vec(),
            flags: Flags::get_value(),
        };
        assert_eq!(encode(&req), b"mg foo v\r\n");
    }

    #[test]
    fn get_token_order_is_v_t_capital_t() {
        let req = Request::Get {
            key: b"foo".to_vec(),
            flags: Flags {
                return_value: true,
                return_ttl: true,
                ttl: Some(TimeToLive::Indefinite),
                ..Default::default()
            },
        };
        assert_eq!(encode(&req), b"mg foo v t T0\r\n");
    }

    #[test]
    fn delete() {
        let req = Request::Delete {
            key: b"foo".to_vec(),
        };
        assert_eq!(encode(&req), b"md foo\r\n");
    }

    #[test]
    fn increment() {
        use crate::wire::flags::ArithmeticMode;
        let req = Request::Arithmetic {
            key: b"ctr".to_vec(),
            flags: Flags {
                arithmetic_mode: Some(ArithmeticMode::Increment(3)),
                ..Default::default()
            },
        };
        assert_eq!(encode(&req), b"ma ctr M+ D3\r\n");
    }

    #[test]
    fn noop() {
        assert_eq!(encode(&Request::NoOp), b"mn\r\n");
    }

    #[test]
    fn zero_delta_is_rejected() {
        use crate::wire::flags::ArithmeticMode;
        let req = Request::Arithmetic {
            key: b"ctr".to_vec(),
            flags: Flags {
                arithmetic_mode: Some(ArithmeticMode::Increment(0)),
                ..Default::default()
            },
        };
        let mut buf = Vec::new();
        assert!(
            RequestEncoder
                .encode(&req, Instant::now(), &mut buf)
                .is_err()
        );
    }

    #[test]
    fn empty_value_round_trips_through_the_wire_grammar() {
        let req = Request::Set {
            key: b"foo".to_vec(),
            value: Vec::new(),
            flags: Flags::default(),
        };
        assert_eq!(encode(&req), b"ms foo 0\r\n\r\n");
    }
}
