//! Read-only view state
//!
//! Everything a renderer needs to draw the lesson, produced by `LessonFlow`.
//! Renderers never call the backend; they only read these structs.

use serde::Serialize;

use super::answers::{option_letter, AnswerValue, PreparedQuestion, QuestionKind};
use super::attempts::{AnswerSource, AttemptEntry};
use super::mastery::{ScoreBand, SidebarAction};
use super::progress::FlowStep;
use super::results::{QuestionReview, ReviewSummary};
use crate::api::types::{GenerationStatus, MaterializationSection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    /// Nothing loaded yet (or loading failed)
    Missing,
    Generating,
    Ready,
    Failed,
}

impl From<GenerationStatus> for ContentStatus {
    fn from(status: GenerationStatus) -> Self {
        match status {
            GenerationStatus::Generating => ContentStatus::Generating,
            GenerationStatus::Failed => ContentStatus::Failed,
            GenerationStatus::Finished | GenerationStatus::Unknown => ContentStatus::Ready,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonView {
    pub lesson_id: String,
    pub title: String,
    pub step: FlowStep,
    pub status: ContentStatus,
    pub sections: Vec<MaterializationSection>,
    pub error: Option<String>,
    /// "Start Quiz" is offered under the content
    pub show_start_quiz: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionView {
    pub letter: String,
    pub label: String,
    /// Value stored when the option is chosen
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub key: String,
    pub number: usize,
    pub kind: QuestionKind,
    pub text: String,
    pub options: Vec<OptionView>,
    pub answer: Option<AnswerValue>,
    pub invalid: bool,
}

impl QuestionView {
    pub fn new(question: &PreparedQuestion, answer: Option<&AnswerValue>, invalid: bool) -> Self {
        let options = question
            .options()
            .iter()
            .enumerate()
            .map(|(idx, opt)| {
                let letter = option_letter(idx);
                let value = [opt.id.as_str(), opt.option_ref.as_str()]
                    .into_iter()
                    .find(|v| !v.is_empty())
                    .map(String::from)
                    .unwrap_or_else(|| letter.clone());
                OptionView {
                    label: opt.label().unwrap_or(&letter).to_string(),
                    letter,
                    value,
                }
            })
            .collect();
        Self {
            key: question.key.clone(),
            number: question.index + 1,
            kind: question.kind,
            text: question.text.clone(),
            options,
            answer: answer.cloned(),
            invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizView {
    pub quiz_id: Option<String>,
    pub status: ContentStatus,
    pub questions: Vec<QuestionView>,
    pub total: usize,
    pub unanswered: usize,
    pub invalid: usize,
    pub can_submit: bool,
    pub submitting: bool,
    pub error: Option<String>,
    pub submit_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsView {
    pub attempt_id: String,
    pub score_percent: Option<f64>,
    pub band: Option<ScoreBand>,
    pub created_at: Option<String>,
    pub latest_score_percent: Option<f64>,
    pub attempts: Vec<AttemptEntry>,
    pub answer_source: AnswerSource,
    pub summary: ReviewSummary,
    pub reviews: Vec<QuestionReview>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidebarView {
    pub title: String,
    pub mastery_percent: Option<f64>,
    pub mastery_band: Option<ScoreBand>,
    pub min_percent: Option<f64>,
    pub attempts: usize,
    pub latest_score_percent: Option<f64>,
    pub retake_warning: bool,
    pub action: Option<SidebarAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepHeaderItem {
    pub step: FlowStep,
    pub label: &'static str,
    pub completed: bool,
    pub active: bool,
    pub enabled: bool,
}
