// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{io, net::SocketAddr};

use metacache_client_rs::client::pool::{BoxFuture, Connector};
use tokio::net::{TcpListener, TcpStream};

/// A [`Connector`] dialing a real TCP socket, exercising the transport
/// boundary the same way a consuming application would: the library only
/// ever deals in byte-duplex streams, never `TcpStream` directly.
pub struct TcpConnector {
    addr: SocketAddr,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        TcpConnector { addr }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> BoxFuture<'static, io::Result<TcpStream>> {
        let addr = self.addr;
        Box::pin(async move { TcpStream::connect(addr).await })
    }
}

/// Spawns an in-process fake server accepting one connection at a time and
/// replying `HD\r\n` to anything it reads, enough to exercise the pool and
/// connection machinery end-to-end over a real socket without a live
/// memcache server.
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test setup: bind fake server");
    let addr = listener.local_addr().expect("test setup: local_addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = vec![0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {
                            if socket.write_all(b"HD\r\n").await.is_err() {
                                return;
                            }
                        },
                    }
                }
            });
        }
    });

    addr
}
