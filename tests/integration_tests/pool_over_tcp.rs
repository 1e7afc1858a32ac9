// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use metacache_client_rs::{Client, client::pool::PoolConfig};

use crate::integration_tests::common::{TcpConnector, spawn_echo_server};

#[tokio::test]
async fn client_round_trips_a_delete_over_a_real_tcp_socket() {
    let addr = spawn_echo_server().await;
    let connector = TcpConnector::new(addr);
    let client = Arc::new(Client::new(connector, PoolConfig {
        min_connections: 0,
        soft_limit: 2,
        hard_limit: 2,
        idle_timeout: Duration::from_secs(60),
        keep_alive_frequency: Duration::from_secs(30),
    }));

    let run_client = Arc::clone(&client);
    let handle = tokio::spawn(async move {
        let _ = run_client.run().await;
    });

    let result = client
        .with_connection(|conn| async move { conn.delete(b"some-key").await })
        .await;
    assert!(result.is_ok());

    handle.abort();
}

#[tokio::test]
async fn pool_admits_concurrent_leases_up_to_the_hard_limit() {
    let addr = spawn_echo_server().await;
    let connector = TcpConnector::new(addr);
    let client = Arc::new(Client::new(connector, PoolConfig {
        min_connections: 0,
        soft_limit: 1,
        hard_limit: 2,
        idle_timeout: Duration::from_secs(60),
        keep_alive_frequency: Duration::from_secs(30),
    }));

    let run_client = Arc::clone(&client);
    let handle = tokio::spawn(async move {
        let _ = run_client.run().await;
    });

    let a = Arc::clone(&client);
    let b = Arc::clone(&client);
    let (ra, rb) = tokio::join!(
        a.with_connection(|conn| async move { conn.delete(b"key-a").await }),
        b.with_connection(|conn| async move { conn.delete(b"key-b").await }),
    );
    assert!(ra.is_ok());
    assert!(rb.is_ok());

    handle.abort();
}
