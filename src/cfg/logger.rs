//! Logger initialization.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logger settings, deserialized from the `logger:` section of a
/// [`crate::cfg::config::ClientConfig`] file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggerConfig {
    /// `tracing` level/directive string, e.g. `"info"` or `"metacache_client_rs=debug"`.
    pub level: String,
    /// Where formatted log lines go.
    pub output: Output,
    #[serde(default)]
    pub is_show_line: bool,
    #[serde(default)]
    pub is_show_module_path: bool,
    #[serde(default = "default_show_target")]
    pub is_show_target: bool,
    /// Required when `output = file`.
    #[serde(default)]
    pub file: Option<LogFileConfig>,
}

fn default_show_target() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Output {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationFreq {
    Minutely,
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogFileConfig {
    pub path: String,
    #[serde(default)]
    pub rotation_frequency: Option<RotationFreq>,
}

/// Installs a global `tracing` subscriber from `config`.
///
/// Returns the [`WorkerGuard`] for the non-blocking writer; dropping it
/// flushes any buffered log lines, so the caller must hold it for the
/// lifetime of the process.
pub fn init_logger(config: &LoggerConfig) -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = make_writer(config)?;

    let env_filter = EnvFilter::try_new(&config.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log level from config or env")?;

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_timer(ChronoUtc::rfc_3339())
        .with_target(config.is_show_target)
        .with_line_number(config.is_show_line)
        .with_file(config.is_show_line)
        .with_module_path(config.is_show_module_path)
        .json();

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to set global default subscriber")?;

    Ok(guard)
}

fn make_writer(
    cfg: &LoggerConfig,
) -> anyhow::Result<(tracing_subscriber::fmt::writer::BoxMakeWriter, WorkerGuard)> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;

    Ok(match cfg.output {
        Output::Stdout => {
            let (w, g) = tracing_appender::non_blocking(std::io::stdout());
            (BoxMakeWriter::new(w), g)
        },
        Output::Stderr => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            (BoxMakeWriter::new(w), g)
        },
        Output::File => {
            let fcfg = cfg
                .file
                .as_ref()
                .context("logger.file is required when output = file")?;
            let path = PathBuf::from(&fcfg.path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));

            let rotation = match fcfg.rotation_frequency.unwrap_or(RotationFreq::Never) {
                RotationFreq::Minutely => Rotation::MINUTELY,
                RotationFreq::Hourly => Rotation::HOURLY,
                RotationFreq::Daily => Rotation::DAILY,
                RotationFreq::Never => Rotation::NEVER,
            };

            let file_appender = RollingFileAppender::new(
                rotation,
                dir,
                path.file_name().unwrap_or_default(),
            );
            let (w, g) = tracing_appender::non_blocking(file_appender);
            (BoxMakeWriter::new(w), g)
        },
    })
}
