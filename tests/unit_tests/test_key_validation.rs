// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Instant;

use metacache_client_rs::wire::{Flags, Request, RequestEncoder};

fn assert_rejected(request: &Request) {
    let mut buf = Vec::new();
    assert!(
        RequestEncoder
            .encode(request, Instant::now(), &mut buf)
            .is_err()
    );
}

#[test]
fn get_rejects_an_overlong_key() {
    assert_rejected(&Request::Get {
        key: vec![b'k'; 251],
        flags: Flags::default(),
    });
}

#[test]
fn set_rejects_a_key_with_embedded_space() {
    assert_rejected(&Request::Set {
        key: b"bad key".to_vec(),
        value: b"v".to_vec(),
        flags: Flags::default(),
    });
}

#[test]
fn delete_rejects_an_empty_key() {
    assert_rejected(&Request::Delete { key: Vec::new() });
}

#[test]
fn arithmetic_rejects_a_key_with_a_control_byte() {
    use metacache_client_rs::wire::ArithmeticMode;

    assert_rejected(&Request::Arithmetic {
        key: vec![b'k', 0x07, b'y'],
        flags: Flags {
            arithmetic_mode: Some(ArithmeticMode::Increment(1)),
            ..Default::default()
        },
    });
}
