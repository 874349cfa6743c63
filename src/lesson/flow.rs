//! Lesson flow controller
//!
//! Drives one lesson through Content, Quiz and Results. The controller owns
//! every piece of per-lesson state and is the only place that talks to the
//! backend; renderers read the view structs it produces.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::answers::{is_answer_invalid, AnswerValue, QuestionKind, QuizAnswerSet, QuizSheet};
use super::attempts::{answers_for_display, AttemptHistory};
use super::course::{lesson_meta, LessonMeta};
use super::mastery::{to_percent, MasteryGate, ScoreBand, SidebarAction};
use super::poller::{poll_generation, CancelToken, PollOutcome, PollSettings, StartGuard};
use super::progress::{reconcile, resolve_previous_lesson, FlowStep, ProgressSync, StepSources};
use super::results::{build_reviews, filter_reviews, summarize, ReviewFilter};
use super::view::{
    ContentStatus, LessonView, QuestionView, QuizView, ResultsView, SidebarView, StepHeaderItem,
};
use crate::api::types::{
    GenerationStatus, Generated, LessonProgress, Materialization, MaterializationQuiz, QuizAttempt,
    StartMaterializationRequest,
};
use crate::api::LearningBackend;
use crate::config::PollingConfig;
use crate::errors::{ApiError, FlowError, LessonflowError, Result};
use crate::observability::telemetry::{record_step_transition, sanitize_for_log};
use crate::storage::LocalState;

pub const LESSON_LOAD_FAILED: &str = "Failed to load lesson content";
pub const LESSON_START_FAILED: &str = "Failed to start lesson preparation";
pub const LESSON_GENERATION_FAILED: &str = "Lesson generation failed";
pub const LESSON_RETRY_FAILED: &str = "Failed to retry lesson generation";
pub const QUIZ_LOAD_FAILED: &str = "Failed to load quiz";
pub const QUIZ_NOT_AVAILABLE: &str = "Quiz is not available yet";
pub const QUIZ_GENERATION_FAILED: &str = "Quiz generation failed";
pub const QUIZ_RETRY_FAILED: &str = "Failed to retry quiz generation";
pub const SUBMIT_FAILED: &str = "Failed to evaluate quiz. Please try again.";

const DEFAULT_TITLE: &str = "Lesson";

/// Who is studying what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonContext {
    pub student_id: String,
    pub course_id: String,
    pub lesson_id: String,
    /// Lesson the student navigated from, when the caller knows it
    pub previous_lesson_id: Option<String>,
}

impl LessonContext {
    pub fn new(
        student_id: impl Into<String>,
        course_id: impl Into<String>,
        lesson_id: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            course_id: course_id.into(),
            lesson_id: lesson_id.into(),
            previous_lesson_id: None,
        }
    }

    pub fn with_previous_lesson(mut self, lesson_id: impl Into<String>) -> Self {
        self.previous_lesson_id = Some(lesson_id.into());
        self
    }
}

/// Map a backend failure to what the caller sees. An expired session keeps
/// its identity so the caller can send the student back to sign-in.
fn surface(message: &str, error: ApiError) -> LessonflowError {
    match error {
        ApiError::Unauthorized => LessonflowError::Api(error),
        other => {
            debug!(error = %other, "{}", message);
            FlowError::Unavailable(message.to_string()).into()
        }
    }
}

pub struct LessonFlow {
    backend: Arc<dyn LearningBackend>,
    local: LocalState,
    polling: PollingConfig,
    context: LessonContext,

    step: FlowStep,
    progress: ProgressSync,
    meta: Option<LessonMeta>,

    materialization: Option<Materialization>,
    lesson_error: Option<String>,
    lesson_start: StartGuard,

    quiz: Option<MaterializationQuiz>,
    sheet: Option<QuizSheet>,
    quiz_error: Option<String>,
    answers: QuizAnswerSet,
    submitting: bool,
    submit_error: Option<String>,

    /// Attempt returned by this session's evaluate call
    evaluation: Option<QuizAttempt>,
    history: AttemptHistory,

    cancel: CancelToken,
}

impl LessonFlow {
    pub fn new(
        backend: Arc<dyn LearningBackend>,
        local: LocalState,
        polling: PollingConfig,
        context: LessonContext,
    ) -> Self {
        let progress = ProgressSync::new(context.lesson_id.clone());
        Self {
            backend,
            local,
            polling,
            context,
            step: FlowStep::Content,
            progress,
            meta: None,
            materialization: None,
            lesson_error: None,
            lesson_start: StartGuard::new(),
            quiz: None,
            sheet: None,
            quiz_error: None,
            answers: QuizAnswerSet::default(),
            submitting: false,
            submit_error: None,
            evaluation: None,
            history: AttemptHistory::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn context(&self) -> &LessonContext {
        &self.context
    }

    pub fn step(&self) -> FlowStep {
        self.step
    }

    pub fn progress(&self) -> Option<&LessonProgress> {
        self.progress.progress()
    }

    pub fn meta(&self) -> Option<&LessonMeta> {
        self.meta.as_ref()
    }

    pub fn materialization(&self) -> Option<&Materialization> {
        self.materialization.as_ref()
    }

    pub fn quiz(&self) -> Option<&MaterializationQuiz> {
        self.quiz.as_ref()
    }

    pub fn sheet(&self) -> Option<&QuizSheet> {
        self.sheet.as_ref()
    }

    pub fn answers(&self) -> &QuizAnswerSet {
        &self.answers
    }

    pub fn evaluation(&self) -> Option<&QuizAttempt> {
        self.evaluation.as_ref()
    }

    pub fn history(&self) -> &AttemptHistory {
        &self.history
    }

    pub fn lesson_error(&self) -> Option<&str> {
        self.lesson_error.as_deref()
    }

    pub fn quiz_error(&self) -> Option<&str> {
        self.quiz_error.as_deref()
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Token that stops any running poll when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn gate(&self) -> MasteryGate {
        MasteryGate::new(
            self.progress.mastery(),
            self.meta.as_ref().and_then(|m| m.min_mastery),
        )
    }

    pub fn title(&self) -> &str {
        self.meta
            .as_ref()
            .and_then(|m| m.title.as_deref())
            .unwrap_or(DEFAULT_TITLE)
    }

    fn lesson_material_id(&self) -> Option<String> {
        self.materialization
            .as_ref()
            .map(|m| m.lesson_material_id.clone())
            .filter(|id| !id.is_empty())
    }

    fn lesson_ready(&self) -> bool {
        self.materialization.as_ref().is_some_and(|m| {
            matches!(
                m.generation_status(),
                GenerationStatus::Finished | GenerationStatus::Unknown
            )
        })
    }

    fn attempt_count(&self) -> usize {
        self.history.len().max(usize::from(self.evaluation.is_some()))
    }

    pub fn has_attempts(&self) -> bool {
        self.attempt_count() > 0
    }

    /// Quiz id used for attempt lookups and answer snapshots.
    fn attempts_quiz_id(&self) -> Option<String> {
        self.sheet
            .as_ref()
            .and_then(|s| s.quiz_id.clone())
            .or_else(|| {
                self.evaluation
                    .as_ref()
                    .map(|e| e.quiz_id.clone())
                    .filter(|id| !id.is_empty())
            })
    }

    // --- Loading ----------------------------------------------------------

    /// Enter the lesson: course metadata, progress, content, quiz and
    /// attempts, then settle on the step to show.
    pub async fn open(&mut self) -> Result<()> {
        info!(
            lesson = %sanitize_for_log(&self.context.lesson_id),
            course = %sanitize_for_log(&self.context.course_id),
            "Opening lesson"
        );
        self.load_course_meta().await?;
        self.sync_progress().await?;
        self.local.set_last_lesson(
            &self.context.student_id,
            &self.context.course_id,
            &self.context.lesson_id,
        );

        self.load_lesson().await?;
        if self.lesson_ready() {
            self.prefetch_quiz().await?;
        }

        let saved = self
            .local
            .step_index(
                &self.context.student_id,
                &self.context.course_id,
                &self.context.lesson_id,
            )
            .and_then(FlowStep::from_index);
        let resolved = reconcile(
            StepSources {
                remote: self.progress.remote_step(),
                pending: self.progress.pending_step(),
                saved,
            },
            self.has_attempts(),
        );
        self.settle_on(resolved).await
    }

    /// Show `step`, or the closest step the current state allows.
    async fn settle_on(&mut self, step: FlowStep) -> Result<()> {
        let step = match step {
            FlowStep::Quiz if self.gate().quiz_hidden() => FlowStep::Content,
            FlowStep::Results if !self.has_attempts() => FlowStep::Content,
            other => other,
        };
        self.set_step(step);

        if step == FlowStep::Quiz && self.quiz_needs_load() && self.lesson_ready() {
            match self.load_quiz().await {
                Ok(()) => {}
                Err(LessonflowError::Api(ApiError::Unauthorized)) => {
                    return Err(ApiError::Unauthorized.into())
                }
                // Already recorded for the quiz view.
                Err(e) => debug!(error = %e, "Quiz not loaded on re-entry"),
            }
        }
        Ok(())
    }

    async fn load_course_meta(&mut self) -> Result<()> {
        match self.backend.get_course(&self.context.course_id).await {
            Ok(course) => {
                self.meta = lesson_meta(&course, &self.context.lesson_id);
                if self.meta.is_none() {
                    warn!(
                        lesson = %sanitize_for_log(&self.context.lesson_id),
                        "Lesson not found in course structure"
                    );
                }
                Ok(())
            }
            Err(ApiError::Unauthorized) => Err(ApiError::Unauthorized.into()),
            Err(e) => {
                warn!(error = %e, "Failed to load course; continuing without lesson metadata");
                Ok(())
            }
        }
    }

    async fn sync_progress(&mut self) -> Result<()> {
        let remembered = self
            .local
            .last_lesson(&self.context.student_id, &self.context.course_id);
        let previous = resolve_previous_lesson(
            self.context.previous_lesson_id.as_deref(),
            remembered.as_deref(),
            self.meta.as_ref().and_then(|m| m.previous_lesson_id.as_deref()),
            &self.context.lesson_id,
        );

        match self.progress.ensure(self.backend.as_ref(), &previous).await {
            Ok(progress) => {
                debug!(step = %progress.step, mastery = ?progress.mastery, "Lesson progress loaded");
                Ok(())
            }
            Err(ApiError::Unauthorized) => Err(ApiError::Unauthorized.into()),
            Err(e) => {
                warn!(error = %e, "Failed to load lesson progress; continuing without it");
                Ok(())
            }
        }
    }

    /// Load lesson content, starting generation on first visit and polling
    /// while it is being generated.
    pub async fn load_lesson(&mut self) -> Result<()> {
        self.lesson_error = None;
        let backend = Arc::clone(&self.backend);
        let student = self.context.student_id.clone();
        let lesson = self.context.lesson_id.clone();

        let first = match backend.get_materialization(&student, &lesson).await {
            Ok(materialization) => Some(materialization),
            Err(e) if e.is_not_found() => {
                if self.lesson_start.try_acquire(&lesson) {
                    let request = StartMaterializationRequest {
                        course_id: self.context.course_id.clone(),
                        lesson_id: lesson.clone(),
                    };
                    if let Err(e) = backend.start_materialization(&request).await {
                        self.lesson_start.release(&lesson);
                        self.lesson_error = Some(LESSON_START_FAILED.to_string());
                        return Err(surface(LESSON_START_FAILED, e));
                    }
                    info!(lesson = %sanitize_for_log(&lesson), "Lesson preparation started");
                } else {
                    debug!("Lesson preparation already requested");
                }
                None
            }
            Err(e) => {
                self.lesson_error = Some(LESSON_LOAD_FAILED.to_string());
                return Err(surface(LESSON_LOAD_FAILED, e));
            }
        };

        let mut settings = PollSettings::lesson(&self.polling);
        if first.is_none() {
            settings = settings.with_initial_delay();
        }
        let cancel = self.cancel.clone();
        let outcome = poll_generation(first, settings, &cancel, || {
            backend.get_materialization(&student, &lesson)
        })
        .await;
        self.apply_lesson_outcome(outcome)
    }

    fn apply_lesson_outcome(&mut self, outcome: PollOutcome<Materialization, ApiError>) -> Result<()> {
        match outcome {
            PollOutcome::Finished(materialization) => {
                self.materialization = Some(materialization);
                Ok(())
            }
            PollOutcome::Failed(materialization) => {
                self.materialization = Some(materialization);
                self.lesson_error = Some(LESSON_GENERATION_FAILED.to_string());
                Err(FlowError::GenerationFailed {
                    resource: "Lesson".into(),
                }
                .into())
            }
            PollOutcome::TimedOut(latest) | PollOutcome::Cancelled(latest) => {
                if let Some(materialization) = latest {
                    self.materialization = Some(materialization);
                }
                Ok(())
            }
            PollOutcome::Errored {
                last: Some(materialization),
                error,
            } => {
                warn!(error = %error, "Stopped polling lesson content");
                self.materialization = Some(materialization);
                Ok(())
            }
            PollOutcome::Errored { last: None, error } => {
                self.lesson_error = Some(LESSON_LOAD_FAILED.to_string());
                Err(surface(LESSON_LOAD_FAILED, error))
            }
        }
    }

    /// Ask the backend to regenerate the lesson content and poll again.
    pub async fn retry_lesson_generation(&mut self) -> Result<()> {
        let Some(lesson_material_id) = self.lesson_material_id() else {
            // Nothing was ever materialized: start over.
            self.lesson_start.reset();
            return self.load_lesson().await;
        };
        self.lesson_error = None;
        let backend = Arc::clone(&self.backend);
        if let Err(e) = backend
            .retry_materialization_lesson(&lesson_material_id, &self.context.course_id)
            .await
        {
            self.lesson_error = Some(LESSON_RETRY_FAILED.to_string());
            return Err(surface(LESSON_RETRY_FAILED, e));
        }
        info!("Lesson generation restarted");

        let student = self.context.student_id.clone();
        let lesson = self.context.lesson_id.clone();
        let settings = PollSettings::lesson(&self.polling).with_initial_delay();
        let cancel = self.cancel.clone();
        let outcome = poll_generation(None, settings, &cancel, || {
            backend.get_materialization(&student, &lesson)
        })
        .await;
        self.apply_lesson_outcome(outcome)?;
        if self.lesson_ready() {
            self.prefetch_quiz().await?;
        }
        Ok(())
    }

    /// One quiz fetch without polling, used while entering the lesson.
    async fn prefetch_quiz(&mut self) -> Result<()> {
        let Some(lesson_material_id) = self.lesson_material_id() else {
            return Ok(());
        };
        match self.backend.get_materialization_quiz(&lesson_material_id).await {
            Ok(quiz) => {
                if quiz.generation_status() == GenerationStatus::Failed {
                    self.quiz_error = Some(QUIZ_GENERATION_FAILED.to_string());
                }
                self.install_quiz(quiz);
                self.refresh_attempts(None).await;
            }
            Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized.into()),
            Err(e) if e.is_not_found() => debug!("Quiz not generated yet"),
            Err(e) => warn!(error = %e, "Failed to prefetch quiz"),
        }
        Ok(())
    }

    /// Fetch the quiz, polling while it is generated, then its attempts.
    pub async fn load_quiz(&mut self) -> Result<()> {
        let lesson_material_id = self.lesson_material_id().ok_or(FlowError::LessonNotReady)?;
        self.quiz_error = None;

        let backend = Arc::clone(&self.backend);
        let cancel = self.cancel.clone();
        let outcome = poll_generation(None, PollSettings::quiz(&self.polling), &cancel, || {
            backend.get_materialization_quiz(&lesson_material_id)
        })
        .await;

        let result = match outcome {
            PollOutcome::Finished(quiz) => {
                self.install_quiz(quiz);
                Ok(())
            }
            PollOutcome::Failed(quiz) => {
                self.install_quiz(quiz);
                self.quiz_error = Some(QUIZ_GENERATION_FAILED.to_string());
                Err(FlowError::GenerationFailed {
                    resource: "Quiz".into(),
                }
                .into())
            }
            PollOutcome::TimedOut(latest) | PollOutcome::Cancelled(latest) => {
                if let Some(quiz) = latest {
                    self.install_quiz(quiz);
                }
                Ok(())
            }
            PollOutcome::Errored {
                last: Some(quiz),
                error,
            } => {
                warn!(error = %error, "Stopped polling quiz");
                self.install_quiz(quiz);
                Ok(())
            }
            PollOutcome::Errored { last: None, error } => {
                let message = if error.is_not_found() {
                    QUIZ_NOT_AVAILABLE
                } else {
                    QUIZ_LOAD_FAILED
                };
                self.quiz_error = Some(message.to_string());
                return Err(surface(message, error));
            }
        };

        self.refresh_attempts(None).await;
        result
    }

    /// Ask the backend to regenerate the quiz and poll again.
    pub async fn retry_quiz_generation(&mut self) -> Result<()> {
        let lesson_material_id = self.lesson_material_id().ok_or(FlowError::LessonNotReady)?;
        self.quiz_error = None;
        if let Err(e) = self
            .backend
            .retry_materialization_quiz(&lesson_material_id, Some(self.context.course_id.as_str()))
            .await
        {
            self.quiz_error = Some(QUIZ_RETRY_FAILED.to_string());
            return Err(surface(QUIZ_RETRY_FAILED, e));
        }
        info!("Quiz generation restarted");
        self.load_quiz().await
    }

    /// Install a fetched quiz. A different quiz identity resets everything
    /// answered or graded against the old one.
    fn install_quiz(&mut self, quiz: MaterializationQuiz) {
        let previous = self.quiz.as_ref().and_then(|q| q.identity()).map(String::from);
        let incoming = quiz.identity().map(String::from);
        if previous.is_some() && previous != incoming {
            debug!(from = ?previous, to = ?incoming, "Quiz changed; clearing answers and results");
            self.answers.clear();
            self.evaluation = None;
            self.submit_error = None;
            self.history.clear();
        }
        self.sheet = Some(QuizSheet::from_quiz(&quiz));
        self.quiz = Some(quiz);
    }

    /// Re-read the attempt list. Failures keep the current history.
    async fn refresh_attempts(&mut self, prefer: Option<&str>) -> bool {
        let Some(quiz_id) = self.attempts_quiz_id() else {
            return false;
        };
        match self.backend.get_quiz_attempts(&quiz_id).await {
            Ok(fetched) => {
                debug!(count = fetched.len(), "Quiz attempts loaded");
                self.history.replace(fetched, self.evaluation.as_ref(), prefer);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to load quiz attempts");
                if let Some(evaluation) = &self.evaluation {
                    self.history.record(evaluation.clone());
                }
                false
            }
        }
    }

    // --- Steps ------------------------------------------------------------

    fn set_step(&mut self, step: FlowStep) {
        if self.step != step {
            record_step_transition(&self.context.lesson_id, self.step.as_str(), step.as_str());
        }
        self.step = step;
        self.local.set_step_index(
            &self.context.student_id,
            &self.context.course_id,
            &self.context.lesson_id,
            step.index(),
        );
    }

    /// Commit to the backend (best effort) and show `step`.
    async fn move_to(&mut self, step: FlowStep) {
        self.progress.commit_step(self.backend.as_ref(), step).await;
        self.set_step(step);
    }

    pub fn can_navigate_to(&self, step: FlowStep) -> bool {
        match step {
            FlowStep::Content => true,
            FlowStep::Quiz => !self.gate().quiz_hidden() && self.quiz.is_some(),
            FlowStep::Results => self.has_attempts(),
        }
    }

    pub async fn navigate_to(&mut self, step: FlowStep) -> Result<()> {
        if !self.can_navigate_to(step) {
            return Err(FlowError::StepUnavailable {
                step: step.as_str().to_string(),
            }
            .into());
        }
        if step == self.step {
            return Ok(());
        }
        match step {
            FlowStep::Quiz => self.start_quiz().await,
            other => {
                self.move_to(other).await;
                Ok(())
            }
        }
    }

    /// Content -> Quiz.
    pub async fn start_quiz(&mut self) -> Result<()> {
        if self.gate().quiz_hidden() {
            return Err(FlowError::StepUnavailable {
                step: FlowStep::Quiz.as_str().to_string(),
            }
            .into());
        }
        self.move_to(FlowStep::Quiz).await;

        if self.quiz_needs_load() {
            self.load_quiz().await?;
        }
        Ok(())
    }

    /// True while there is no usable quiz: none fetched yet, still generating or failed.
    pub fn quiz_needs_load(&self) -> bool {
        self.quiz.as_ref().map_or(true, |q| {
            matches!(
                q.generation_status(),
                GenerationStatus::Generating | GenerationStatus::Failed
            )
        })
    }

    /// Quiz -> Content. Drops the shown evaluation.
    pub async fn back_to_lesson(&mut self) {
        self.evaluation = None;
        self.submit_error = None;
        self.move_to(FlowStep::Content).await;
    }

    /// Results -> Content.
    pub async fn review_lesson(&mut self) {
        self.move_to(FlowStep::Content).await;
    }

    /// Results -> Quiz with a freshly generated quiz.
    pub async fn retake(&mut self) -> Result<()> {
        if self.gate().quiz_hidden() {
            return Err(FlowError::StepUnavailable {
                step: FlowStep::Quiz.as_str().to_string(),
            }
            .into());
        }
        let lesson_material_id = self.lesson_material_id().ok_or(FlowError::LessonNotReady)?;

        self.answers.clear();
        self.evaluation = None;
        self.submit_error = None;
        self.quiz_error = None;
        self.move_to(FlowStep::Quiz).await;

        if let Err(e) = self
            .backend
            .retry_materialization_quiz(&lesson_material_id, Some(self.context.course_id.as_str()))
            .await
        {
            self.quiz_error = Some(QUIZ_RETRY_FAILED.to_string());
            return Err(surface(QUIZ_RETRY_FAILED, e));
        }
        info!("Retake requested; regenerating quiz");
        self.load_quiz().await
    }

    // --- Answers and submission ---------------------------------------------

    /// Record an answer typed or picked for question `key`.
    ///
    /// Multi-select questions take a comma-separated list of choices.
    pub fn set_answer(&mut self, key: &str, raw: &str) -> Result<QuestionKind> {
        let sheet = self.sheet.as_ref().ok_or(FlowError::QuizNotReady)?;
        let question = sheet
            .find(key)
            .ok_or_else(|| FlowError::Unavailable(format!("Unknown question '{}'", key)))?;
        let kind = question.kind;
        if kind == QuestionKind::Multi {
            let values = raw
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .collect();
            self.answers.insert(key, AnswerValue::Choices(values));
        } else {
            sheet.capture(&mut self.answers, key, raw);
        }
        Ok(kind)
    }

    /// Flip one choice of a multi-select question.
    pub fn toggle_choice(&mut self, key: &str, value: &str) -> Result<()> {
        let sheet = self.sheet.as_ref().ok_or(FlowError::QuizNotReady)?;
        match sheet.find(key).map(|q| q.kind) {
            Some(QuestionKind::Multi) => {
                self.answers.toggle_choice(key, value);
                Ok(())
            }
            Some(_) => Err(FlowError::Unavailable(format!(
                "Question '{}' is not multiple choice",
                key
            ))
            .into()),
            None => Err(FlowError::Unavailable(format!("Unknown question '{}'", key)).into()),
        }
    }

    pub fn clear_answer(&mut self, key: &str) {
        self.answers.remove(key);
    }

    /// (unanswered, invalid) for the loaded quiz.
    pub fn validation(&self) -> (usize, usize) {
        self.sheet
            .as_ref()
            .map(|s| (s.unanswered_count(&self.answers), s.invalid_count(&self.answers)))
            .unwrap_or((0, 0))
    }

    pub fn can_submit(&self) -> bool {
        let quiz_usable = self.quiz.as_ref().is_some_and(|q| {
            !matches!(
                q.generation_status(),
                GenerationStatus::Generating | GenerationStatus::Failed
            )
        });
        quiz_usable
            && self.quiz_error.is_none()
            && self
                .sheet
                .as_ref()
                .is_some_and(|s| s.can_submit(&self.answers, self.submitting))
    }

    /// Submit the answers for grading.
    ///
    /// On failure the answers stay untouched and the step stays on Quiz.
    pub async fn submit(&mut self) -> Result<QuizAttempt> {
        if self.submitting {
            return Err(FlowError::SubmissionInFlight.into());
        }
        let sheet = self.sheet.as_ref().ok_or(FlowError::QuizNotReady)?;
        let (unanswered, invalid) = self.validation();
        if unanswered > 0 || invalid > 0 {
            return Err(FlowError::ValidationBlocked {
                unanswered,
                invalid,
            }
            .into());
        }
        if !self.can_submit() {
            return Err(FlowError::QuizNotReady.into());
        }
        let request = sheet.build_request(&self.answers)?;

        self.submitting = true;
        self.submit_error = None;
        let result = self
            .backend
            .evaluate_quiz(&self.context.lesson_id, &request)
            .await;
        self.submitting = false;

        let attempt = match result {
            Ok(attempt) => attempt,
            Err(ApiError::Unauthorized) => {
                self.submit_error = Some(SUBMIT_FAILED.to_string());
                return Err(ApiError::Unauthorized.into());
            }
            Err(e) => {
                warn!(error = %e, "Quiz evaluation failed");
                self.submit_error = Some(SUBMIT_FAILED.to_string());
                return Err(FlowError::SubmissionFailed(e.to_string()).into());
            }
        };
        info!(
            attempt = %sanitize_for_log(&attempt.id),
            score = ?attempt.score_percent,
            "Quiz evaluated"
        );

        let attempt_id = attempt.id.clone();
        let quiz_id = Some(attempt.quiz_id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or(request.quiz_id);
        self.local
            .save_answers(&self.context.student_id, &quiz_id, &attempt_id, &self.answers);
        self.evaluation = Some(attempt.clone());

        self.move_to(FlowStep::Results).await;
        if !self.refresh_attempts(Some(attempt_id.as_str())).await {
            self.history.select(&attempt_id);
        }
        self.progress.refresh(self.backend.as_ref()).await;
        Ok(attempt)
    }

    /// Show a different attempt on the Results step.
    pub fn select_attempt(&mut self, attempt_id: &str) -> Result<()> {
        if self.history.select(attempt_id) {
            Ok(())
        } else {
            Err(FlowError::Unavailable(format!("Unknown attempt '{}'", attempt_id)).into())
        }
    }

    // --- Views ------------------------------------------------------------

    pub fn sidebar_action(&self) -> Option<SidebarAction> {
        self.gate().sidebar_action(
            self.attempt_count(),
            self.meta.as_ref().and_then(|m| m.next_lesson_id.as_deref()),
        )
    }

    pub fn step_header(&self) -> Vec<StepHeaderItem> {
        let hidden = self.gate().quiz_hidden();
        let completed = self.has_attempts();
        FlowStep::ALL
            .into_iter()
            .filter(|step| !(hidden && *step == FlowStep::Quiz))
            .map(|step| StepHeaderItem {
                step,
                label: step.label(),
                completed,
                active: step == self.step,
                enabled: self.can_navigate_to(step),
            })
            .collect()
    }

    pub fn lesson_view(&self) -> LessonView {
        let status = self
            .materialization
            .as_ref()
            .map(|m| ContentStatus::from(m.generation_status()))
            .unwrap_or(ContentStatus::Missing);
        LessonView {
            lesson_id: self.context.lesson_id.clone(),
            title: self.title().to_string(),
            step: self.step,
            status,
            sections: self
                .materialization
                .as_ref()
                .map(|m| m.sections.clone())
                .unwrap_or_default(),
            error: self.lesson_error.clone(),
            show_start_quiz: status == ContentStatus::Ready && !self.gate().quiz_hidden(),
        }
    }

    pub fn quiz_view(&self) -> QuizView {
        let (unanswered, invalid) = self.validation();
        let questions = self
            .sheet
            .as_ref()
            .map(|sheet| {
                sheet
                    .questions
                    .iter()
                    .map(|q| {
                        let answer = self.answers.get(&q.key);
                        QuestionView::new(q, answer, is_answer_invalid(q.kind, answer))
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        QuizView {
            quiz_id: self.sheet.as_ref().and_then(|s| s.quiz_id.clone()),
            status: self
                .quiz
                .as_ref()
                .map(|q| ContentStatus::from(q.generation_status()))
                .unwrap_or(ContentStatus::Missing),
            total: questions.len(),
            questions,
            unanswered,
            invalid,
            can_submit: self.can_submit(),
            submitting: self.submitting,
            error: self.quiz_error.clone(),
            submit_error: self.submit_error.clone(),
        }
    }

    /// Results for the selected attempt. `None` until something was graded.
    pub fn results_view(&self, filter: ReviewFilter) -> Option<ResultsView> {
        let displayed = self.history.selected().or(self.evaluation.as_ref())?;
        let session_attempt = self.evaluation.as_ref().map(|e| e.id.as_str());
        let fallback_quiz = self.sheet.as_ref().and_then(|s| s.quiz_id.as_deref());
        let (answers, answer_source) = answers_for_display(
            displayed,
            session_attempt,
            &self.answers,
            &self.local,
            &self.context.student_id,
            fallback_quiz,
        );
        let reviews = build_reviews(displayed, self.sheet.as_ref(), &answers);
        let score = to_percent(displayed.score_percent);

        Some(ResultsView {
            attempt_id: displayed.id.clone(),
            score_percent: score,
            band: score.map(ScoreBand::from_percent),
            created_at: Some(displayed.created_at.clone()).filter(|c| !c.is_empty()),
            latest_score_percent: self.history.latest_score_percent().or(score),
            attempts: self.history.entries(),
            answer_source,
            summary: summarize(&reviews),
            reviews: filter_reviews(&reviews, filter),
        })
    }

    pub fn sidebar(&self) -> SidebarView {
        let gate = self.gate();
        let attempts = self.attempt_count();
        SidebarView {
            title: self.title().to_string(),
            mastery_percent: gate.mastery_percent.map(f64::round),
            mastery_band: gate.mastery_percent.map(ScoreBand::from_percent),
            min_percent: gate.min_percent,
            attempts,
            latest_score_percent: self
                .history
                .latest_score_percent()
                .or_else(|| self.evaluation.as_ref().and_then(|e| to_percent(e.score_percent))),
            retake_warning: gate.show_retake_warning(attempts),
            action: self.sidebar_action(),
        }
    }

    // --- Teardown ---------------------------------------------------------

    /// Point the flow at another lesson. Running polls stop and all
    /// per-lesson state is dropped.
    pub fn switch_lesson(&mut self, context: LessonContext) {
        self.cancel.cancel();
        self.cancel = CancelToken::new();
        self.lesson_start.reset();
        self.progress = ProgressSync::new(context.lesson_id.clone());
        self.context = context;
        self.step = FlowStep::Content;
        self.meta = None;
        self.materialization = None;
        self.lesson_error = None;
        self.quiz = None;
        self.sheet = None;
        self.quiz_error = None;
        self.answers.clear();
        self.submitting = false;
        self.submit_error = None;
        self.evaluation = None;
        self.history.clear();
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LessonFlow {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for LessonFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LessonFlow")
            .field("context", &self.context)
            .field("step", &self.step)
            .field("has_quiz", &self.quiz.is_some())
            .field("attempts", &self.history.len())
            .finish()
    }
}
