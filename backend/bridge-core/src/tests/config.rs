// Unit tests for bridge configuration loading, saving, and validation.

use crate::DEFAULT_BRIDGE_PORT;
use crate::config::BridgeConfig;
use crate::error::config::ConfigError;

use tempfile::tempdir;

/// Defaults match the documented constants the rest of the bridge assumes.
#[test]
fn given_default_config_then_documented_constants_hold() {
    let config = BridgeConfig::default();

    assert_eq!(config.channel.port, DEFAULT_BRIDGE_PORT);
    assert_eq!(config.orphan.poll_interval_ms, 100);
    assert_eq!(config.orphan.wait_timeout_ms, 5_000);
    assert_eq!(config.shutdown.grace_period_ms, 3_000);
    assert_eq!(config.liveness.heartbeat_interval_ms, 5_000);
    assert_eq!(config.liveness.stall_multiplier, 3);
    assert!(config.worker.command.is_none());
    assert!(config.validate().is_ok());
}

/// **VALUE**: Verifies a missing config file quietly falls back to defaults.
///
/// **WHY THIS MATTERS**: First launch has no config file. If that surfaced
/// as an error the bridge would be broken out of the box.
#[test]
fn given_missing_file_when_loaded_then_defaults_returned() {
    // GIVEN: An empty config directory
    let dir = tempdir().unwrap();

    // WHEN: Loading
    let loaded = BridgeConfig::load(dir.path()).unwrap();

    // THEN: Defaults, no error
    assert_eq!(loaded.channel.port, DEFAULT_BRIDGE_PORT);
}

/// **VALUE**: Verifies a corrupt config file degrades to defaults via
/// `load_or_default` instead of aborting startup.
///
/// **BUG THIS CATCHES**: Would catch `load_or_default` propagating parse
/// errors, which would make a hand-edited typo in the JSON take the whole
/// input bridge down.
#[test]
fn given_corrupt_file_when_load_or_default_then_defaults_returned() {
    // GIVEN: A directory with unparseable JSON in place
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("bridge-config.json"), "{not json").unwrap();

    // WHEN: Loading leniently
    let config = BridgeConfig::load_or_default(dir.path());

    // THEN: Defaults; strict load reports the parse error
    assert_eq!(config.channel.port, DEFAULT_BRIDGE_PORT);
    assert!(matches!(
        BridgeConfig::load(dir.path()),
        Err(ConfigError::Parse { .. })
    ));
}

/// Save-then-load round trips a modified config, and partial files pick up
/// defaults for absent sections.
#[test]
fn given_saved_config_when_reloaded_then_values_survive() {
    let dir = tempdir().unwrap();

    let mut config = BridgeConfig::default();
    config.channel.port = 50001;
    config.worker.command = Some(vec![String::from("sh"), String::from("-c")]);
    config.save(dir.path()).unwrap();

    let reloaded = BridgeConfig::load(dir.path()).unwrap();
    assert_eq!(reloaded.channel.port, 50001);
    assert_eq!(
        reloaded.worker.command,
        Some(vec![String::from("sh"), String::from("-c")])
    );

    // A file carrying only one section still loads; the rest defaults.
    std::fs::write(
        dir.path().join("bridge-config.json"),
        r#"{"channel":{"port":50002}}"#,
    )
    .unwrap();
    let partial = BridgeConfig::load(dir.path()).unwrap();
    assert_eq!(partial.channel.port, 50002);
    assert_eq!(partial.shutdown.grace_period_ms, 3_000);
}

/// Validation rejects values the supervisor cannot operate with.
#[test]
fn given_invalid_values_when_validated_then_rejected() {
    let mut zero_port = BridgeConfig::default();
    zero_port.channel.port = 0;
    assert!(matches!(
        zero_port.validate(),
        Err(ConfigError::Validation { .. })
    ));

    let mut zero_poll = BridgeConfig::default();
    zero_poll.orphan.poll_interval_ms = 0;
    assert!(zero_poll.validate().is_err());

    let mut short_wait = BridgeConfig::default();
    short_wait.orphan.wait_timeout_ms = 10;
    short_wait.orphan.poll_interval_ms = 100;
    assert!(short_wait.validate().is_err());

    let mut zero_multiplier = BridgeConfig::default();
    zero_multiplier.liveness.stall_multiplier = 0;
    assert!(zero_multiplier.validate().is_err());

    let mut empty_command = BridgeConfig::default();
    empty_command.worker.command = Some(Vec::new());
    assert!(empty_command.validate().is_err());
}
