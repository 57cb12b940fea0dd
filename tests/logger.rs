use tasksync::config::LoggingConfig;
use tasksync::logger;

#[test]
fn test_dispatch_builds_for_valid_levels() {
    for level in ["off", "error", "warn", "info", "debug", "trace"] {
        let config = LoggingConfig {
            level: level.to_string(),
            ..LoggingConfig::default()
        };
        assert!(logger::dispatch(&config).is_ok(), "level {level}");
    }
}

#[test]
fn test_dispatch_rejects_unknown_level() {
    let config = LoggingConfig {
        level: "loud".to_string(),
        ..LoggingConfig::default()
    };
    assert!(logger::dispatch(&config).is_err());
}

#[test]
fn test_disabled_logging_ignores_level() {
    let config = LoggingConfig {
        enabled: false,
        level: "loud".to_string(),
        file: None,
    };
    assert_eq!(config.level_filter().unwrap(), log::LevelFilter::Off);
}

#[test]
fn test_dispatch_opens_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasksync.log");
    let config = LoggingConfig {
        file: Some(path.clone()),
        ..LoggingConfig::default()
    };
    logger::dispatch(&config).unwrap();
    assert!(path.exists());
}
