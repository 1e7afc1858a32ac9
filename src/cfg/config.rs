//! Configuration file parsing and validation.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{cfg::logger::LoggerConfig, client::pool::PoolConfig};

/// Top-level configuration: how to reach the server, how the pool should be
/// sized, and how the logger should be wired up.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Transport-level settings.
    pub connection: ConnectionConfig,
    /// Pool sizing and timing knobs.
    pub pool: PoolConfig,
    /// Logger settings; optional because embedding applications may install
    /// their own `tracing` subscriber instead.
    #[serde(default)]
    pub logger: Option<LoggerConfig>,
}

/// Transport-level settings: where to dial and how long to wait.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// `host:port` of the server.
    pub address: String,
    /// Timeout for establishing the TCP connection.
    #[serde(rename = "connect_timeout_secs", with = "serde_secs")]
    pub connect_timeout: Duration,
    /// Timeout for an individual request/response round trip.
    #[serde(rename = "request_timeout_secs", with = "serde_secs")]
    pub request_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            address: "127.0.0.1:11211".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connection: ConnectionConfig::default(),
            pool: PoolConfig::default(),
            logger: None,
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: ClientConfig =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates cross-field invariants.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            self.pool.min_connections <= self.pool.soft_limit,
            "pool.min_connections must be <= pool.soft_limit"
        );
        ensure!(
            self.pool.soft_limit <= self.pool.hard_limit,
            "pool.soft_limit must be <= pool.hard_limit"
        );
        ensure!(self.pool.hard_limit >= 1, "pool.hard_limit must be >= 1");
        ensure!(
            !self.connection.address.is_empty(),
            "connection.address must not be empty"
        );
        ensure!(
            self.connection.connect_timeout > Duration::ZERO,
            "connection.connect_timeout_secs must be > 0"
        );
        ensure!(
            self.connection.request_timeout > Duration::ZERO,
            "connection.request_timeout_secs must be > 0"
        );
        Ok(())
    }
}

/// Serde helpers for representing a [`Duration`] as a number of seconds.
/// Shared with [`crate::client::pool::PoolConfig`].
pub mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
