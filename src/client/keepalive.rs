//! Keep-alive probing for idle pooled connections.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{client::connection::Connection, error::ClientError};

/// Issues a single `mn` probe against `conn`, bounded by `timeout`
/// (suggested by §4.4 to equal the keep-alive frequency).
///
/// Returns `Ok(())` on a timely `MN` reply; any other outcome (timeout,
/// protocol error, connection shutdown) is returned as an error and the
/// caller (the pool) should treat the connection as no longer usable.
pub async fn probe<S>(conn: &Connection<S>, timeout: Duration) -> Result<(), ClientError>
where S: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    match tokio::time::timeout(timeout, conn.noop()).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::connection_shutdown(
            "keep-alive probe timed out",
        )),
    }
}
