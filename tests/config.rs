use std::time::Duration;

use tasksync::config::Config;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.client.debounce_ms, 2_000);
    assert_eq!(config.client.max_retries, 3);
    assert_eq!(config.rate_limit.max_requests, 30);
    assert_eq!(config.rate_limit.window_secs, 60);
    assert_eq!(config.retention.window_days, 90);
    assert_eq!(config.retention.warning_days, 7);
    assert!(!config.mail.enabled);
    assert!(config.logging.enabled);
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();

    // Valid config should pass
    assert!(config.validate().is_ok());

    // Non-http server URL should fail
    config.client.server_url = "ftp://example.com".to_string();
    assert!(config.validate().is_err());

    // Reset and test a warning window larger than the retention window
    config.client.server_url = "https://sync.example.com".to_string();
    config.retention.warning_days = 120;
    assert!(config.validate().is_err());

    config.retention.warning_days = 7;
    config.server.bind_address = "not an address".to_string();
    assert!(config.validate().is_err());

    config.server.bind_address = "0.0.0.0:8787".to_string();
    config.logging.level = "chatty".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_mail_requires_endpoint_when_enabled() {
    let mut config = Config::default();
    config.mail.enabled = true;
    assert!(config.validate().is_err());

    config.mail.api_url = "https://mail.example.com/send".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string_pretty(&config).unwrap();
    assert!(toml_str.contains("debounce_ms = 2000"));
    assert!(toml_str.contains("max_requests = 30"));
    assert!(toml_str.contains("[retention]"));
}

#[test]
fn test_partial_config_deserialization() {
    // Partial TOML configs merge with defaults
    let partial_toml = r#"
[client]
server_url = "https://sync.example.com"

[rate_limit]
max_requests = 5

[logging]
level = "debug"
"#;

    let config: Config = toml::from_str(partial_toml).unwrap();

    assert_eq!(config.client.server_url, "https://sync.example.com");
    assert_eq!(config.rate_limit.max_requests, 5);
    assert_eq!(config.logging.level, "debug");

    assert_eq!(config.client.debounce_ms, 2_000); // default value
    assert!(config.rate_limit.enabled); // default value
    assert_eq!(config.retention.window_days, 90); // default value
    assert!(config.validate().is_ok());
}

#[test]
fn test_derived_settings() {
    let mut config = Config::default();
    config.client.retry_base_delay_ms = 500;
    config.client.retry_max_delay_ms = 4_000;

    let settings = config.client.sync_settings();
    assert_eq!(settings.debounce, Duration::from_secs(2));
    assert_eq!(settings.retry.base_delay, Duration::from_millis(500));
    assert_eq!(settings.retry.max_delay, Duration::from_secs(4));

    config.client.storage_quota_bytes = 0;
    assert_eq!(config.client.storage_quota(), None);
    config.client.connectivity_probe_secs = 0;
    assert_eq!(config.client.connectivity_probe_interval(), None);

    let limits = config.server.payload_limits();
    assert_eq!(limits.max_tasks, 1000);
    assert_eq!(limits.max_buckets, 50);
}

#[test]
fn test_generate_and_load_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    Config::generate_default_config(&path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("# tasksync Configuration File"));

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.client.server_url, Config::default().client.server_url);
}

#[test]
fn test_load_from_file_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[retention]\nwindow_days = 0\n").unwrap();

    let err = Config::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("window_days"));
}
