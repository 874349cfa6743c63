//! Local client state
//!
//! A small key-value store injected into the lesson flow. It holds the
//! values a learner's client remembers between runs:
//! - Last active step per lesson
//! - Last visited lesson per course
//! - Answer snapshots per quiz attempt
//! - Theme preference

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::errors::StorageError;
use crate::lesson::answers::QuizAnswerSet;

mod file;

pub use file::FileStore;

/// String key-value storage with soft failure semantics on reads.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StorageError::Encode(format!("memory store lock poisoned: {}", e)))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StorageError::Encode(format!("memory store lock poisoned: {}", e)))?;
        entries.remove(key);
        Ok(())
    }
}

/// Key shapes shared with the browser client.
pub mod keys {
    pub const THEME_MODE: &str = "theme_mode";

    pub fn quiz_answers(student_id: &str, quiz_id: &str, attempt_id: &str) -> String {
        format!("quiz_answers_{}_{}_{}", student_id, quiz_id, attempt_id)
    }

    pub fn last_lesson(student_id: &str, course_id: &str) -> String {
        format!("last_lesson_{}_{}", student_id, course_id)
    }

    pub fn lesson_step(student_id: &str, course_id: &str, lesson_id: &str) -> String {
        format!("lesson_step_{}_{}_{}", student_id, course_id, lesson_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    #[default]
    Dark,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }
}

impl std::str::FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            other => Err(format!("unknown theme mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed access to the local keys. Write failures are logged and dropped.
#[derive(Clone)]
pub struct LocalState {
    store: Arc<dyn KeyValueStore>,
}

impl LocalState {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Saved step index (0 content, 1 quiz, 2 results). Out-of-range values read as absent.
    pub fn step_index(&self, student_id: &str, course_id: &str, lesson_id: &str) -> Option<u8> {
        self.store
            .get(&keys::lesson_step(student_id, course_id, lesson_id))
            .and_then(|raw| raw.trim().parse::<u8>().ok())
            .filter(|idx| *idx <= 2)
    }

    pub fn set_step_index(&self, student_id: &str, course_id: &str, lesson_id: &str, index: u8) {
        let key = keys::lesson_step(student_id, course_id, lesson_id);
        self.soft_set(&key, &index.to_string());
    }

    pub fn last_lesson(&self, student_id: &str, course_id: &str) -> Option<String> {
        self.store
            .get(&keys::last_lesson(student_id, course_id))
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set_last_lesson(&self, student_id: &str, course_id: &str, lesson_id: &str) {
        self.soft_set(&keys::last_lesson(student_id, course_id), lesson_id);
    }

    pub fn answers(&self, student_id: &str, quiz_id: &str, attempt_id: &str) -> Option<QuizAnswerSet> {
        self.get_json(&keys::quiz_answers(student_id, quiz_id, attempt_id))
    }

    pub fn save_answers(
        &self,
        student_id: &str,
        quiz_id: &str,
        attempt_id: &str,
        answers: &QuizAnswerSet,
    ) {
        self.set_json(&keys::quiz_answers(student_id, quiz_id, attempt_id), answers);
    }

    pub fn theme(&self) -> ThemeMode {
        self.store
            .get(keys::THEME_MODE)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_theme(&self, mode: ThemeMode) {
        self.soft_set(keys::THEME_MODE, mode.as_str());
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key, error = %e, "Ignoring unreadable local value");
                None
            }
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.soft_set(key, &raw),
            Err(e) => warn!(key = key, error = %e, "Failed to encode local value"),
        }
    }

    fn soft_set(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!(key = key, error = %e, "Failed to persist local value");
        }
    }
}

impl std::fmt::Debug for LocalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalState").finish_non_exhaustive()
    }
}
