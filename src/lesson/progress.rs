//! Lesson progress synchronization
//!
//! The backend owns the lesson progress record. The client keeps a step
//! pointer that follows it: remote wins on load, a locally chosen step wins
//! until its commit succeeds.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::types::{LessonProgress, LessonStep};
use crate::api::{ApiResult, LearningBackend};
use crate::observability::telemetry::sanitize_for_log;

/// Steps the lesson view moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStep {
    #[default]
    Content,
    Quiz,
    Results,
}

impl FlowStep {
    pub const ALL: [FlowStep; 3] = [FlowStep::Content, FlowStep::Quiz, FlowStep::Results];

    pub fn index(&self) -> u8 {
        match self {
            FlowStep::Content => 0,
            FlowStep::Quiz => 1,
            FlowStep::Results => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(FlowStep::Content),
            1 => Some(FlowStep::Quiz),
            2 => Some(FlowStep::Results),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStep::Content => "content",
            FlowStep::Quiz => "quiz",
            FlowStep::Results => "results",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlowStep::Content => "Lesson Content",
            FlowStep::Quiz => "Quiz",
            FlowStep::Results => "Results",
        }
    }
}

impl std::fmt::Display for FlowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "content" | "lesson" => Ok(FlowStep::Content),
            "quiz" => Ok(FlowStep::Quiz),
            "results" => Ok(FlowStep::Results),
            other => Err(format!("unknown step '{}'", other)),
        }
    }
}

impl From<LessonStep> for FlowStep {
    /// Reserved backend steps have no view of their own and show the content.
    fn from(step: LessonStep) -> Self {
        match step {
            LessonStep::Quiz => FlowStep::Quiz,
            LessonStep::Results => FlowStep::Results,
            LessonStep::Lesson | LessonStep::Practice | LessonStep::Code => FlowStep::Content,
        }
    }
}

impl From<FlowStep> for LessonStep {
    fn from(step: FlowStep) -> Self {
        match step {
            FlowStep::Content => LessonStep::Lesson,
            FlowStep::Quiz => LessonStep::Quiz,
            FlowStep::Results => LessonStep::Results,
        }
    }
}

/// Inputs to step reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSources {
    /// Step on the server's progress record
    pub remote: Option<FlowStep>,
    /// Step chosen locally whose commit has not succeeded yet
    pub pending: Option<FlowStep>,
    /// Step index remembered in local storage
    pub saved: Option<FlowStep>,
}

/// Effective step.
///
/// A pending local step wins. Otherwise the remote step wins, then the saved
/// one. When graded attempts exist, re-entry lands on Results.
pub fn reconcile(sources: StepSources, has_attempts: bool) -> FlowStep {
    if let Some(pending) = sources.pending {
        return pending;
    }
    let base = sources
        .remote
        .or(sources.saved)
        .unwrap_or_default();
    if has_attempts && base != FlowStep::Results {
        return FlowStep::Results;
    }
    base
}

/// Previous-lesson hint sent when starting progress.
///
/// Order: explicit hint, last lesson remembered for the course, the lesson
/// before this one in course order, then the lesson itself.
pub fn resolve_previous_lesson(
    explicit: Option<&str>,
    remembered: Option<&str>,
    course_previous: Option<&str>,
    lesson_id: &str,
) -> String {
    let non_empty = |s: &&str| !s.trim().is_empty();
    explicit
        .filter(non_empty)
        .or_else(|| remembered.filter(non_empty).filter(|s| *s != lesson_id))
        .or_else(|| course_previous.filter(non_empty))
        .unwrap_or(lesson_id)
        .to_string()
}

/// Server progress record plus the locally pending step.
#[derive(Debug, Clone, Default)]
pub struct ProgressSync {
    lesson_id: String,
    progress: Option<LessonProgress>,
    pending: Option<FlowStep>,
}

impl ProgressSync {
    pub fn new(lesson_id: impl Into<String>) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            progress: None,
            pending: None,
        }
    }

    pub fn lesson_id(&self) -> &str {
        &self.lesson_id
    }

    pub fn progress(&self) -> Option<&LessonProgress> {
        self.progress.as_ref()
    }

    pub fn remote_step(&self) -> Option<FlowStep> {
        self.progress.as_ref().map(|p| FlowStep::from(p.step))
    }

    pub fn pending_step(&self) -> Option<FlowStep> {
        self.pending
    }

    pub fn mastery(&self) -> Option<f64> {
        self.progress.as_ref().and_then(|p| p.mastery)
    }

    /// Fetch the progress record, creating it on 404.
    pub async fn ensure(
        &mut self,
        backend: &dyn LearningBackend,
        previous_lesson_id: &str,
    ) -> ApiResult<&LessonProgress> {
        let progress = match backend.get_lesson_progress(&self.lesson_id).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                debug!(
                    "No progress for lesson {}, starting it",
                    sanitize_for_log(&self.lesson_id)
                );
                backend
                    .start_lesson_progress(&self.lesson_id, Some(previous_lesson_id))
                    .await?
            }
            Err(e) => return Err(e),
        };
        // A fresh fetch ends the window in which a local step overrides.
        self.pending = None;
        let progress = self.progress.insert(progress);
        Ok(&*progress)
    }

    /// Commit `step` to the server. Best effort: a failure is logged and the
    /// step stays pending locally.
    pub async fn commit_step(&mut self, backend: &dyn LearningBackend, step: FlowStep) -> bool {
        self.pending = Some(step);
        let Some(progress_id) = self.progress.as_ref().map(|p| p.id.clone()) else {
            warn!(step = %step, "No progress record yet; step kept locally");
            return false;
        };

        match backend.change_lesson_step(&progress_id, step.into()).await {
            Ok(updated) => {
                self.progress = Some(updated);
                self.pending = None;
                true
            }
            Err(e) => {
                warn!(step = %step, error = %e, "Failed to sync lesson step; continuing locally");
                false
            }
        }
    }

    /// Replace the record after a mastery-changing event such as an evaluation.
    pub async fn refresh(&mut self, backend: &dyn LearningBackend) -> bool {
        match backend.get_lesson_progress(&self.lesson_id).await {
            Ok(p) => {
                self.progress = Some(p);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh lesson progress");
                false
            }
        }
    }
}
