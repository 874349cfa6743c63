use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side lesson step. `Practice` and `Code` are reserved by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LessonStep {
    #[default]
    Lesson,
    Quiz,
    Results,
    Practice,
    Code,
}

impl std::fmt::Display for LessonStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LessonStep::Lesson => write!(f, "LESSON"),
            LessonStep::Quiz => write!(f, "QUIZ"),
            LessonStep::Results => write!(f, "RESULTS"),
            LessonStep::Practice => write!(f, "PRACTICE"),
            LessonStep::Code => write!(f, "CODE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    Started,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub id: String,
    pub lesson_id: String,
    #[serde(default)]
    pub lesson_position: Option<i64>,
    #[serde(default)]
    pub student_id: String,
    /// Fraction in 0..1
    #[serde(default)]
    pub mastery: Option<f64>,
    #[serde(default)]
    pub step: LessonStep,
    #[serde(default)]
    pub status: ProgressStatus,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Status of an asynchronous generation job (lesson content or quiz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GenerationStatus {
    Generating,
    Finished,
    Failed,
    /// Anything the backend sends that we do not model, or a missing field
    #[default]
    #[serde(other)]
    Unknown,
}

/// Resources produced by a backend generation job.
pub trait Generated {
    fn generation_status(&self) -> GenerationStatus;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializationSection {
    #[serde(default)]
    pub lesson_material_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Materialization {
    pub lesson_id: String,
    #[serde(default)]
    pub lesson_material_id: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub sections: Vec<MaterializationSection>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub generated_from_chunks: Vec<String>,
    #[serde(default)]
    pub generation_status: GenerationStatus,
}

impl Generated for Materialization {
    fn generation_status(&self) -> GenerationStatus {
        self.generation_status
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOption {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub option_ref: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub question: String,
}

impl QuizOption {
    /// Text shown for the option: text, then optionRef.
    pub fn label(&self) -> Option<&str> {
        [self.text.as_str(), self.option_ref.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub question_id: String,
    /// Raw question type as sent by the backend (`mcq_single`, `open`, ...)
    #[serde(default, rename = "type")]
    pub question_type: String,
    #[serde(default)]
    pub prompt: String,
    /// Legacy prompt field
    #[serde(default)]
    pub quiz: String,
    #[serde(default)]
    pub options: Vec<QuizOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializationQuiz {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub quiz_id: Option<String>,
    #[serde(default)]
    pub lesson_material_id: String,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    #[serde(default)]
    pub status: GenerationStatus,
}

impl MaterializationQuiz {
    /// Identity used for evaluation and attempt lookups: `quizId`, then `id`.
    pub fn identity(&self) -> Option<&str> {
        self.quiz_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.id.as_str()).filter(|s| !s.is_empty()))
    }
}

impl Generated for MaterializationQuiz {
    fn generation_status(&self) -> GenerationStatus {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMaterializationRequest {
    pub course_id: String,
    pub lesson_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStepRequest {
    pub lesson_progress_id: String,
    pub step: LessonStep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateItem {
    pub question: String,
    pub answer: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub quiz_id: String,
    pub items: Vec<EvaluateItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluateContentItem {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateDetail {
    #[serde(default)]
    pub question_id: String,
    #[serde(default)]
    pub verdict: String,
    /// Fraction in 0..1
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
}

/// One graded submission. The evaluate endpoint and the attempts list share this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: String,
    #[serde(default)]
    pub quiz_id: String,
    #[serde(default)]
    pub student_id: String,
    /// Either 0..1 or 0..100 depending on the endpoint
    #[serde(default)]
    pub score_percent: Option<f64>,
    #[serde(default)]
    pub content: Vec<EvaluateContentItem>,
    #[serde(default)]
    pub details: Vec<EvaluateDetail>,
    #[serde(default)]
    pub created_at: String,
}

impl QuizAttempt {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

/// Parse RFC 3339 timestamps, falling back to zone-less ISO timestamps read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseLesson {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub min_mastery: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub lessons: Vec<CourseLesson>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
}
