// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use metacache_client_rs::wire::{ResponseDecoder, ReturnCode};
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;

#[tokio::test]
async fn framed_read_yields_frames_as_they_arrive_in_chunks() {
    let (client_io, mut server_io) = tokio::io::duplex(64);
    tokio::spawn(async move {
        for chunk in [&b"HD\r\n"[..], &b"VA 2\r\n"[..], &b"hi\r\n"[..]] {
            let _ = server_io.write_all(chunk).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    });

    let mut framed = FramedRead::new(client_io, ResponseDecoder);
    let first = framed
        .next()
        .await
        .expect("stream should yield a frame")
        .expect("frame should decode");
    assert_eq!(first.return_code, ReturnCode::Hd);

    let second = framed
        .next()
        .await
        .expect("stream should yield a frame")
        .expect("frame should decode");
    assert_eq!(second.return_code, ReturnCode::Va);
    assert_eq!(second.value, Some(b"hi".to_vec()));
}

#[tokio::test]
async fn framed_read_surfaces_decoder_errors() {
    let (client_io, mut server_io) = tokio::io::duplex(64);
    tokio::spawn(async move {
        let _ = server_io.write_all(b"ZZ\r\n").await;
    });

    let mut framed = FramedRead::new(client_io, ResponseDecoder);
    let item = framed.next().await.expect("stream should yield an item");
    assert!(item.is_err());
}
