use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_broker_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("BROKER__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = BrokerConfig::default();

    assert_eq!(config.server.listen_address, "127.0.0.1:7741");
    assert_eq!(config.server.max_frame_bytes, 8 * 1024 * 1024);
    assert_eq!(config.buffers.default.max_slots, 8);
    assert_eq!(config.ingest.reconnect_backoff_min_in_ms, 50);
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_broker_env_vars();
    with_vars(vec![("BROKER__SERVER__MAX_FRAME_BYTES", Some("1025"))], || {
        let config = BrokerConfig::new().unwrap();

        assert_eq!(config.server.max_frame_bytes, 1025);
    });
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_broker_env_vars();
    // Create temporary directory and configuration file
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [server]
        listen_address = "0.0.0.0:9900" # Override default value

        [buffers.default]
        max_slots = 16 # Override default value
        max_chunk_bytes = 1024 # Add new field
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = BrokerConfig::new().expect("success");
        let result = base_config.with_override_config(config_path.to_str().unwrap());

        assert!(result.is_ok());
        let config = result.unwrap();

        assert_eq!(config.server.listen_address, "0.0.0.0:9900");
        assert_eq!(config.buffers.default.max_slots, 16);
        assert_eq!(config.buffers.default.max_chunk_bytes, 1024);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_broker_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [server]
        listen_address = "10.0.0.1:7000"
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("BROKER__SERVER__LISTEN_ADDRESS", Some("10.0.0.2:7001")),
        ],
        || {
            let config = BrokerConfig::new().unwrap();

            assert_eq!(config.server.listen_address, "10.0.0.2:7001");
        },
    );
}

#[test]
#[serial]
fn per_type_buffer_bounds_should_fall_back_to_default() {
    cleanup_all_broker_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("buffers.toml");
    std::fs::write(
        &config_path,
        r#"
        [buffers.types.VisibilityChunk]
        max_slots = 32
        max_chunk_bytes = 2048
        "#,
    )
    .unwrap();

    with_vars(
        vec![("CONFIG_PATH", Some(config_path.to_str().unwrap()))],
        || {
            let config = BrokerConfig::new().unwrap();

            let vis = config.buffers.capacity_for("VisibilityChunk");
            assert_eq!(vis.max_slots, 32);
            assert_eq!(vis.max_chunk_bytes, 2048);

            let other = config.buffers.capacity_for("AntennaPositions");
            assert_eq!(other, config.buffers.default);
        },
    );
}

#[test]
fn validation_should_fail_with_invalid_listen_address() {
    let mut config = BrokerConfig::default();
    config.server.listen_address = "not-an-address".to_string();

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_zero_slot_buffers() {
    let mut config = BrokerConfig::default();
    config.buffers.default.max_slots = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_inverted_backoff_range() {
    let mut config = BrokerConfig::default();
    config.ingest.reconnect_backoff_min_in_ms = 500;
    config.ingest.reconnect_backoff_max_in_ms = 100;

    assert!(config.validate().is_err());
}
