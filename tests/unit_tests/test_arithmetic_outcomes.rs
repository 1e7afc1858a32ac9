// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use metacache_client_rs::{Connection, client::connection::ArithmeticOutcome};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

fn spawn_server(
    mut server: DuplexStream,
    script: Vec<(&'static [u8], &'static [u8])>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for (expect_len, reply) in script {
            let mut buf = vec![0u8; expect_len.len()];
            if server.read_exact(&mut buf).await.is_err() {
                return;
            }
            if server.write_all(reply).await.is_err() {
                return;
            }
        }
    })
}

#[tokio::test]
async fn increment_without_return_value_yields_stored() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let _server = spawn_server(server_io, vec![(b"ma ctr M+ D3\r\n", b"HD\r\n")]);

    let conn = Arc::new(Connection::new(client_io));
    let run_conn = Arc::clone(&conn);
    let handle = tokio::spawn(async move {
        let _ = run_conn.run().await;
    });

    let outcome = conn
        .increment(b"ctr", 3, false)
        .await
        .expect("increment should succeed");
    assert_eq!(outcome, ArithmeticOutcome::Stored);

    conn.cancellation_token().cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn decrement_with_return_value_yields_the_new_value() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let _server = spawn_server(server_io, vec![(b"ma ctr M- D1 v\r\n", b"VA 1\r\n4\r\n")]);

    let conn = Arc::new(Connection::new(client_io));
    let run_conn = Arc::clone(&conn);
    let handle = tokio::spawn(async move {
        let _ = run_conn.run().await;
    });

    let outcome = conn
        .decrement(b"ctr", 1, true)
        .await
        .expect("decrement should succeed");
    assert_eq!(outcome, ArithmeticOutcome::Value(4));

    conn.cancellation_token().cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn arithmetic_on_a_missing_key_is_key_not_found() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let _server = spawn_server(server_io, vec![(b"ma missing M+ D1\r\n", b"NF\r\n")]);

    let conn = Arc::new(Connection::new(client_io));
    let run_conn = Arc::clone(&conn);
    let handle = tokio::spawn(async move {
        let _ = run_conn.run().await;
    });

    let err = conn
        .increment(b"missing", 1, false)
        .await
        .expect_err("increment on a missing key should fail");
    assert!(matches!(
        err,
        metacache_client_rs::ClientError::KeyNotFound { .. }
    ));

    conn.cancellation_token().cancel();
    let _ = handle.await;
}
