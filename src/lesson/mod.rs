//! Lesson progression
//!
//! A lesson moves through three steps: reading generated content, answering
//! a generated quiz, and reviewing graded attempts. [`LessonFlow`] drives
//! the whole progression; the sibling modules hold the pieces it is built
//! from and can be used on their own.

pub mod answers;
pub mod attempts;
pub mod course;
pub mod flow;
pub mod mastery;
pub mod poller;
pub mod progress;
pub mod results;
pub mod view;

pub use answers::{AnswerValue, QuestionKind, QuizAnswerSet, QuizSheet};
pub use attempts::{AnswerSource, AttemptHistory};
pub use flow::{LessonContext, LessonFlow};
pub use mastery::{MasteryGate, ScoreBand, SidebarAction};
pub use poller::{CancelToken, PollOutcome, PollSettings};
pub use progress::FlowStep;
pub use results::ReviewFilter;
pub use view::{LessonView, QuizView, ResultsView, SidebarView, StepHeaderItem};
