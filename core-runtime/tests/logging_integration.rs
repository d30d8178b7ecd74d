//! Integration tests for the logging setup

use bridge_traits::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};

#[test]
fn test_logging_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[test]
fn test_format_selection() {
    let config = LoggingConfig::default();

    #[cfg(debug_assertions)]
    assert_eq!(config.format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(config.format, LogFormat::Json);
}

#[test]
fn test_init_twice_fails() {
    // Only one test in this binary installs the global subscriber
    let config = LoggingConfig::default().with_format(LogFormat::Compact);
    init_logging(config.clone()).expect("first init succeeds");

    let err = init_logging(config).unwrap_err();
    assert!(err.to_string().contains("Failed to initialize logging"));
}

#[test]
fn test_invalid_filter_is_rejected() {
    let config = LoggingConfig::default().with_filter("core_channel=[");
    let err = init_logging(config).unwrap_err();
    assert!(err.to_string().contains("Invalid log filter"));
}

#[test]
fn test_redaction_of_launch_headers() {
    assert_eq!(redact_if_sensitive("Authorization", "Bearer x"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Cookie", "sid=1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Accept", "text/html"), "text/html");

    let redacted = redact_if_sensitive("email", "user@example.com");
    assert!(redacted.starts_with('u'));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_path_stripping() {
    assert_eq!(
        strip_path("/home/user/.cache/plugin-bridge/clip.mp4"),
        "clip.mp4"
    );
    assert_eq!(strip_path("D:\\data\\prefs.db"), "prefs.db");
    assert_eq!(strip_path("prefs.db"), "prefs.db");
    assert_eq!(strip_path(""), "");
}
