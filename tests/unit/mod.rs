//! Unit tests for lessonflow modules
//!
//! These tests cover individual components without network I/O.

mod test_answers;
mod test_api;
mod test_config;
mod test_error_paths;
mod test_mastery;
mod test_storage;
