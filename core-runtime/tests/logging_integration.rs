//! Integration tests for logging and redaction

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, redact_tokens, LogFormat, LoggingConfig, REDACTED,
};

#[test]
fn test_logging_initializes_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    assert!(init_logging(config.clone()).is_ok());

    // A global subscriber is already installed for this test binary.
    let second = init_logging(config);
    assert!(second.is_err());
}

#[test]
fn test_invalid_custom_filter_is_config_error() {
    let config = LoggingConfig::default().with_filter("core_auth=notalevel");
    let err = init_logging(config).unwrap_err();
    assert!(err.to_string().contains("Invalid log filter"));
}

#[test]
fn test_redaction_of_provider_error_body() {
    let body = r#"{"error":"invalid_request","error_description":"bad client_secret=s3cr3t","access_token":"at-9f8e7d"}"#;
    let cleaned = redact_tokens(body);

    assert!(!cleaned.contains("s3cr3t"));
    assert!(!cleaned.contains("at-9f8e7d"));
    assert!(cleaned.contains("invalid_request"));
}

#[test]
fn test_field_name_redaction() {
    assert_eq!(redact_if_sensitive("refresh_token", "rt"), REDACTED);
    assert_eq!(redact_if_sensitive("client_secret", "cs"), REDACTED);
    assert_eq!(redact_if_sensitive("method", "oauth"), "oauth");
}
