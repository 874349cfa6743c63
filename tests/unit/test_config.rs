//! Configuration loading and polling budgets

use lessonflow::config::{Config, PollingConfig};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_polling_defaults() {
    let polling = PollingConfig::default();
    assert_eq!(polling.interval(), Duration::from_secs(3));
    assert_eq!(polling.quiz_budget(), Duration::from_secs(120));
    assert_eq!(polling.lesson_budget(), Duration::from_secs(300));
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let toml_str = r#"
        endpoint = "https://learn.example.com/"
        student_id = "student-7"

        [polling]
        interval_ms = 500
    "#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.base_url(), "https://learn.example.com");
    assert_eq!(config.student_id.as_deref(), Some("student-7"));
    assert_eq!(config.polling.interval(), Duration::from_millis(500));
    assert_eq!(config.polling.quiz_timeout_ms, 120_000);
    assert_eq!(config.api.connect_timeout_secs, 30);
    assert!(config.token.is_none());
}

#[test]
fn test_storage_section() {
    let toml_str = r#"
        [storage]
        state_file = "/var/tmp/lessonflow-state.json"
    "#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(
        config.storage.resolved_state_file(),
        PathBuf::from("/var/tmp/lessonflow-state.json")
    );
}

#[test]
fn test_load_explicit_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[api]\nrequest_timeout_secs = 45\n\n[polling]\nlesson_timeout_ms = 60000"
    )
    .unwrap();

    let config = Config::load(file.path().to_str()).unwrap();
    assert_eq!(config.polling.lesson_budget(), Duration::from_secs(60));
    assert!(config.api.connect_timeout_secs > 0);
}

#[test]
fn test_load_invalid_toml_fails() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "this is = = not toml").unwrap();
    assert!(Config::load(file.path().to_str()).is_err());
}

#[test]
fn test_load_missing_explicit_file_fails() {
    assert!(Config::load(Some("/nonexistent/lessonflow.toml")).is_err());
}
