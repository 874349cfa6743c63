//! Configuration Management
//!
//! Loads lessonflow configuration from TOML files.
//! Configuration includes:
//! - Backend settings (base URL, bearer token, request timeouts)
//! - Polling budgets for lesson and quiz generation
//! - Location of the local state file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Student the lesson flow runs as
    pub student_id: Option<String>,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Poll cadence and wall-clock budgets for asynchronous generation jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_quiz_timeout")]
    pub quiz_timeout_ms: u64,
    #[serde(default = "default_lesson_timeout")]
    pub lesson_timeout_ms: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn quiz_budget(&self) -> Duration {
        Duration::from_millis(self.quiz_timeout_ms)
    }

    pub fn lesson_budget(&self) -> Duration {
        Duration::from_millis(self.lesson_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Explicit path of the local state file. Defaults to the user data dir.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_state_file(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lessonflow")
                .join("state.json")
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            student_id: None,
            api: ApiSettings::default(),
            polling: PollingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            quiz_timeout_ms: default_quiz_timeout(),
            lesson_timeout_ms: default_lesson_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8080".to_string()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    3_000
}
fn default_quiz_timeout() -> u64 {
    120_000
}
fn default_lesson_timeout() -> u64 {
    300_000
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config from {}", p))?;
                toml::from_str(&content).context("Failed to parse config")?
            }
            None => {
                let home_config = dirs::home_dir()
                    .map(|h| h.join(".config/lessonflow/config.toml"))
                    .and_then(|p| p.to_str().map(String::from));

                let mut default_paths: Vec<String> = vec!["lessonflow.toml".to_string()];
                if let Some(hc) = home_config {
                    default_paths.push(hc);
                }

                let mut loaded = None;
                for p in &default_paths {
                    if let Ok(content) = std::fs::read_to_string(p) {
                        loaded = Some(toml::from_str(&content).context("Failed to parse config")?);
                        break;
                    }
                }
                loaded.unwrap_or_else(|| {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                })
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("LESSONFLOW_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(token) = std::env::var("LESSONFLOW_TOKEN") {
            self.token = Some(token);
        }
        if let Ok(student) = std::env::var("LESSONFLOW_STUDENT_ID") {
            self.student_id = Some(student);
        }
        if let Ok(timeout) = std::env::var("LESSONFLOW_TIMEOUT") {
            if let Ok(t) = timeout.parse::<u64>() {
                self.api.request_timeout_secs = t;
            }
        }
    }

    /// Base URL without a trailing slash, so paths can be appended directly.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}
