//! Configuration loading tests

use acp_observer::config::{Config, ConfigError};
use acp_observer::execution::ErrorKind;
use acp_observer::models::TargetStatus;
use acp_observer::scheduler::TargetScheduleQueue;
use std::io::Write;
use std::time::Duration;

const SAMPLE: &str = include_str!("../observer.example.toml");

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_sample_config_loads() {
    let file = write_config(SAMPLE);
    let config = Config::from_file(file.path()).unwrap();

    assert!(config.validate().is_ok());
    assert_eq!(config.server.url, "http://observatory.local");
    assert_eq!(config.observatory.longitude, 116.4);
    assert_eq!(config.meridian_flip.safety_margin_minutes, 5);
    assert!(config.retry.is_retryable(ErrorKind::ObservatoryOffline));
    assert!(!config.retry.is_retryable(ErrorKind::AuthenticationFailed));
    assert_eq!(config.monitor.settings().poll_interval, Duration::from_secs(30));

    let targets = config.targets().unwrap();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].filters.len(), 2);
    assert_eq!(targets[0].filters[1].binning, 2);
    assert!(targets[0].imaging.is_none());
    assert_eq!(targets[1].imaging.as_ref().map(|i| i.dither), Some(3));
    assert!(targets[1].meridian_time.is_some());
    assert!(targets.iter().all(|t| t.status == TargetStatus::Waiting));

    let settings = config.run_settings().unwrap();
    assert!(settings.global_stop_time.is_some());

    let queue = TargetScheduleQueue::from_targets(targets);
    assert_eq!(queue.get(0).map(|t| t.name.as_str()), Some("M31"));
}

#[test]
fn test_minimal_config_uses_defaults() {
    let file = write_config(
        r#"
[server]
url = "acp.local"
username = "admin"
"#,
    );
    let config = Config::from_file(file.path()).unwrap();

    assert!(config.validate().is_ok());
    assert!(config.targets.is_empty());
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.imaging.periodic_af_interval, 120);
    assert_eq!(config.schedule.stop_time, None);
    assert_eq!(config.run_settings().unwrap().global_stop_time, None);
}

#[test]
fn test_legacy_field_names() {
    let file = write_config(
        r#"
[server]
username = "admin"

[meridian_flip]
safety_margin = 2

[imaging]
af_interval = 30

[retry]
max_retries = 5
retry_interval_seconds = 60
retry_on_errors = ["camera_error"]
"#,
    );
    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.meridian_flip.safety_margin_minutes, 2);
    assert_eq!(config.imaging.periodic_af_interval, 30);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.interval_seconds, 60);
    assert!(config.retry.is_retryable(ErrorKind::CameraError));
}

#[test]
fn test_load_rejects_invalid_targets() {
    let file = write_config(
        r#"
[server]
username = "admin"

[[targets]]
name = ""
ra = "not a coordinate"
dec = "+95:00:00"
start_time = "tonight"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    let ConfigError::Invalid(problems) = &err;
    // name, ra, dec, start_time, filters
    assert_eq!(problems.len(), 5);

    assert!(Config::load(file.path()).is_err());
}

#[test]
fn test_rejects_unbounded_exposures() {
    let file = write_config(
        r#"
[server]
username = "admin"

[[targets]]
name = "M31"
ra = "00:42:44"
dec = "+41:16:09"
start_time = "2025-01-15 19:00:00"

[[targets.filters]]
filter_id = 0
name = "L"
exposure = inf
count = 1

[[targets.filters]]
filter_id = 1
name = "R"
exposure = 1.0e20
count = 1

[[targets.filters]]
filter_id = 2
name = "G"
exposure = nan
count = 1
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    let ConfigError::Invalid(problems) = &err;
    assert_eq!(problems.len(), 3);
    assert!(problems.iter().all(|p| p.contains("exposure")));
}

#[test]
fn test_malformed_toml() {
    let file = write_config("[server\nurl = ");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML config file"));
}

#[test]
fn test_missing_file() {
    let err = Config::from_file(std::path::Path::new("/nonexistent/observer.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
