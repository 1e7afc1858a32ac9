// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::io::Write;

use metacache_client_rs::cfg::{
    config::ClientConfig,
    logger::{LoggerConfig, Output, init_logger},
};
use serial_test::serial;
use tempfile::NamedTempFile;

const YAML: &str = r#"
connection:
  address: "127.0.0.1:11211"
  connect_timeout_secs: 5
  request_timeout_secs: 2
pool:
  min_connections: 1
  soft_limit: 8
  hard_limit: 16
  idle_timeout_secs: 60
  keep_alive_frequency_secs: 30
logger:
  level: "info"
  output: stdout
  is_show_line: false
  is_show_module_path: false
  is_show_target: true
"#;

#[test]
fn loads_a_config_with_an_embedded_logger_section() {
    let mut file = NamedTempFile::new().expect("test setup: create temp config file");
    file.write_all(YAML.as_bytes())
        .expect("test setup: write config file");

    let cfg = ClientConfig::load_from_file(file.path()).expect("config should load and validate");
    assert_eq!(cfg.pool.soft_limit, 8);
    assert_eq!(cfg.connection.address, "127.0.0.1:11211");
    let logger = cfg.logger.expect("logger section should be present");
    assert_eq!(logger.level, "info");
    assert!(matches!(logger.output, Output::Stdout));
}

#[test]
#[serial]
fn init_logger_installs_a_stdout_subscriber() {
    let cfg = LoggerConfig {
        level: "debug".to_string(),
        output: Output::Stdout,
        is_show_line: true,
        is_show_module_path: true,
        is_show_target: true,
        file: None,
    };
    // `try_init` is idempotent across the whole test binary: if an earlier
    // test already installed a subscriber this returns an error rather than
    // panicking, which is the behavior we're asserting doesn't crash.
    let _ = init_logger(&cfg);
}
