//! Config file tests: a complete file as an operator would write it, and
//! validation failures surfaced after a successful parse.

use numslot_common::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn full_config_file_loads_and_validates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("numslot.toml");
    fs::write(
        &path,
        r#"
[shared]
log_level = "warn"
service_name = "slot-lab"

[exchange]
shm_name = "lab-slot"
permissions = 0o640
producer_interval_ms = 250
consumer_interval_ms = 50
value_min = 100
value_max = 200
attach_timeout_ms = 0
"#,
    )
    .unwrap();

    let config = NumslotConfig::load(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Warn);
    assert_eq!(config.exchange.shm_name, "lab-slot");
    assert_eq!(config.exchange.permissions, 0o640);
    assert_eq!(config.exchange.attach_timeout_ms, 0);
    assert_eq!(config.exchange.forward_policy, ForwardPolicy::Always);
    assert_eq!(config.exchange.seed, None);
}

#[test]
fn parsed_but_invalid_range_is_a_validation_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("numslot.toml");
    fs::write(
        &path,
        r#"
[exchange]
value_min = 5
value_max = -5
"#,
    )
    .unwrap();

    let config = NumslotConfig::load(&path).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert!(err.to_string().contains("[5, -5]"));
}

#[test]
fn unknown_forward_policy_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("numslot.toml");
    fs::write(&path, "[exchange]\nforward_policy = \"sometimes\"\n").unwrap();

    assert!(matches!(
        NumslotConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}
