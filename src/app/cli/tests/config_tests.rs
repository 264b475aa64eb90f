//! Tests for settings loading and validation

use crate::app::cli::args::Args;
use crate::app::cli::config::*;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

fn table(source: &str) -> toml::Table {
    toml::from_str(source).expect("valid TOML")
}

fn ephemeral_settings() -> Settings {
    Settings {
        ephemeral: true,
        ..Settings::default()
    }
}

#[test]
fn test_defaults_are_valid() {
    let settings = ephemeral_settings();
    assert!(settings.validate().is_ok());
    assert_eq!(settings.requests_per_second, 10);
    assert_eq!(settings.probe_concurrency, 5);
    assert_eq!(settings.probe_timeout(), Duration::from_secs(10));
    assert_eq!(settings.marker_path, "sushi-config.yaml");
    assert_eq!(settings.required_identifier, "smart.who.int.base");
}

#[test]
fn test_apply_toml_values() {
    let mut settings = ephemeral_settings();
    settings
        .apply_toml_values(&table(
            r#"
            api-url = "https://github.example.org/api/v3"
            requests-per-second = 2
            probe-concurrency = 8
            probe-timeout-secs = 30
            scan-cache-ttl-secs = 60
            marker-path = "dak.json"
            data-dir = "/var/lib/dak"
            log-format = "ext"
            color = false
            "#,
        ))
        .unwrap();

    assert_eq!(settings.api_url, "https://github.example.org/api/v3");
    assert_eq!(settings.requests_per_second, 2);
    assert_eq!(settings.probe_concurrency, 8);
    assert_eq!(settings.probe_timeout_secs, 30);
    assert_eq!(settings.scan_cache_ttl_secs, 60);
    assert_eq!(settings.branch_cache_ttl_secs, 300);
    assert_eq!(settings.marker_path, "dak.json");
    assert_eq!(settings.data_dir, Some(PathBuf::from("/var/lib/dak")));
    assert_eq!(settings.log_format.as_deref(), Some("ext"));
    assert_eq!(settings.color, Some(false));
}

#[test]
fn test_log_file_none_disables_file_logging() {
    let mut settings = ephemeral_settings();
    settings.log_file = Some(PathBuf::from("/tmp/dak.log"));
    settings
        .apply_toml_values(&table(r#"log-file = "none""#))
        .unwrap();
    assert_eq!(settings.log_file, None);
}

#[test]
fn test_wrong_value_types_rejected() {
    let mut settings = ephemeral_settings();

    let err = settings
        .apply_toml_values(&table(r#"probe-concurrency = "lots""#))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "probe-concurrency"));

    let err = settings
        .apply_toml_values(&table("probe-timeout-secs = -1"))
        .unwrap_err();
    assert!(err.to_string().contains("must not be negative"));

    let err = settings.apply_toml_values(&table("color = 1")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "color"));
}

#[test]
fn test_validate_rejects_zero_limits() {
    let mut settings = ephemeral_settings();
    settings.requests_per_second = 0;
    assert!(settings.validate().is_err());

    let mut settings = ephemeral_settings();
    settings.probe_concurrency = 0;
    assert!(settings.validate().is_err());

    let mut settings = ephemeral_settings();
    settings.probe_timeout_secs = 0;
    assert!(settings.validate().is_err());
}

#[test]
fn test_validate_requires_data_dir_unless_ephemeral() {
    let mut settings = Settings::default();
    settings.data_dir = None;
    settings.ephemeral = false;
    assert!(settings.validate().is_err());

    settings.ephemeral = true;
    assert!(settings.validate().is_ok());
}

#[test]
fn test_validate_rejects_unknown_log_format() {
    let mut settings = ephemeral_settings();
    settings.log_format = Some("yaml".to_string());
    assert!(settings.validate().is_err());
}

#[test]
fn test_args_override_file_values() {
    let mut settings = ephemeral_settings();
    settings
        .apply_toml_values(&table(
            r#"
            log-level = "warn"
            color = true
            "#,
        ))
        .unwrap();

    let args = Args::try_parse_from([
        "dak-engine",
        "--log-level",
        "trace",
        "--no-color",
        "--log-file",
        "-",
        "cache",
        "stats",
    ])
    .unwrap();
    settings.apply_args(&args);

    assert_eq!(settings.log_level.as_deref(), Some("trace"));
    assert_eq!(settings.color, Some(false));
    assert_eq!(settings.log_file, None);
}

#[tokio::test]
async fn test_load_from_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "probe-concurrency = 3").unwrap();
    writeln!(file, "required-identifier = \"smart.who.int.anc\"").unwrap();

    let path = file.path().to_string_lossy().to_string();
    let args =
        Args::try_parse_from(["dak-engine", "-c", path.as_str(), "--ephemeral", "cache", "stats"])
            .unwrap();
    let settings = Settings::load(&args).await.unwrap();

    assert_eq!(settings.probe_concurrency, 3);
    assert_eq!(settings.required_identifier, "smart.who.int.anc");
    assert!(settings.ephemeral);
}

#[tokio::test]
async fn test_load_missing_explicit_file() {
    let args = Args::try_parse_from([
        "dak-engine",
        "-c",
        "/nonexistent/dak-engine.toml",
        "cache",
        "stats",
    ])
    .unwrap();
    let err = Settings::load(&args).await.unwrap_err();
    assert!(matches!(err, ConfigError::Missing(_)));
}

#[tokio::test]
async fn test_load_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "probe-concurrency = ").unwrap();

    let path = file.path().to_string_lossy().to_string();
    let args = Args::try_parse_from(["dak-engine", "-c", path.as_str(), "cache", "stats"]).unwrap();
    let err = Settings::load(&args).await.unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
#[serial_test::serial]
fn test_token_from_configured_env_var() {
    let mut settings = ephemeral_settings();
    settings.token_env = "DAK_ENGINE_TEST_TOKEN".to_string();

    std::env::set_var("DAK_ENGINE_TEST_TOKEN", "  ");
    assert_eq!(settings.token(), None);

    std::env::set_var("DAK_ENGINE_TEST_TOKEN", "ghp_example");
    assert_eq!(settings.token().as_deref(), Some("ghp_example"));

    std::env::remove_var("DAK_ENGINE_TEST_TOKEN");
    assert_eq!(settings.token(), None);
}
