//! Lessonflow - lesson progression for an AI learning platform
//!
//! A lesson is generated for each student on demand. Lessonflow walks a
//! student through it in three steps:
//!
//! - **Content**: generated lesson material, started and polled on first visit
//! - **Quiz**: a generated quiz, answered locally and submitted for grading
//! - **Results**: graded attempts with per-question review
//!
//! The backend owns progress and mastery; the client keeps a step pointer
//! that follows it and a small local store for preferences and answer
//! snapshots.
//!
//! # Quick Start
//!
//! ```ignore
//! use lessonflow::{ApiClient, Config, LessonContext, LessonFlow, LocalState};
//! use std::sync::Arc;
//!
//! let config = Config::load(None)?;
//! let backend = Arc::new(ApiClient::new(&config)?);
//! let context = LessonContext::new("student-1", "course-1", "lesson-1");
//! let mut flow = LessonFlow::new(backend, LocalState::in_memory(), config.polling.clone(), context);
//! flow.open().await?;
//! flow.start_quiz().await?;
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod lesson;
pub mod observability;
pub mod storage;

pub use api::{ApiClient, LearningBackend};
pub use config::Config;
pub use errors::{LessonflowError, Result};
pub use lesson::{FlowStep, LessonContext, LessonFlow};
pub use storage::LocalState;
