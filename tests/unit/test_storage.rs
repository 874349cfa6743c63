//! Local state persistence

use lessonflow::lesson::{AnswerValue, QuizAnswerSet};
use lessonflow::storage::{keys, FileStore, KeyValueStore, LocalState, ThemeMode};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");

    let mut answers = QuizAnswerSet::default();
    answers.insert("q1", AnswerValue::Text("b".into()));
    answers.insert("q2", AnswerValue::Choices(vec!["a".into(), "c".into()]));

    {
        let local = LocalState::new(Arc::new(FileStore::open(&path).unwrap()));
        local.set_step_index("s1", "c1", "l1", 1);
        local.set_last_lesson("s1", "c1", "l1");
        local.save_answers("s1", "quiz-1", "att-1", &answers);
        local.set_theme(ThemeMode::Light);
    }

    let reopened = LocalState::new(Arc::new(FileStore::open(&path).unwrap()));
    assert_eq!(reopened.step_index("s1", "c1", "l1"), Some(1));
    assert_eq!(reopened.last_lesson("s1", "c1").as_deref(), Some("l1"));
    assert_eq!(reopened.answers("s1", "quiz-1", "att-1"), Some(answers));
    assert_eq!(reopened.theme(), ThemeMode::Light);
}

#[test]
fn test_keys_are_scoped_per_student() {
    let local = LocalState::in_memory();
    local.set_step_index("s1", "c1", "l1", 2);
    assert_eq!(local.step_index("s2", "c1", "l1"), None);
    assert_eq!(
        keys::lesson_step("s1", "c1", "l1"),
        "lesson_step_s1_c1_l1"
    );
}

#[test]
fn test_out_of_range_step_reads_as_absent() {
    let local = LocalState::in_memory();
    local
        .store()
        .set(&keys::lesson_step("s1", "c1", "l1"), "7")
        .unwrap();
    assert_eq!(local.step_index("s1", "c1", "l1"), None);
}

#[test]
fn test_corrupted_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(FileStore::open(&path).is_err());
}

#[test]
fn test_empty_file_starts_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "   ").unwrap();
    let store = FileStore::open(&path).unwrap();
    assert!(store.get(keys::THEME_MODE).is_none());
}

#[test]
fn test_theme_toggle() {
    let local = LocalState::in_memory();
    assert_eq!(local.theme(), ThemeMode::Dark);
    local.set_theme(local.theme().toggled());
    assert_eq!(local.theme(), ThemeMode::Light);
    assert_eq!("DARK".parse::<ThemeMode>().unwrap(), ThemeMode::Dark);
}
