use std::path::PathBuf;
use thiserror::Error;

/// The central error type for lessonflow.
///
/// Splits failures by the layer that raised them so callers can decide
/// whether a failure is user-visible (submission, generation) or a
/// best-effort sync that should only be logged.
#[derive(Error, Debug)]
pub enum LessonflowError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Lesson flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures talking to the learning backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("API request timed out")]
    Timeout,

    #[error("Session is no longer authorized")]
    Unauthorized,

    #[error("Resource not found: {path}")]
    NotFound { path: String },

    #[error("API returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// A 404 on a lazily-created resource is a signal to create it, not a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Failures of the lesson progression itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("{resource} generation failed")]
    GenerationFailed { resource: String },

    #[error("Answer the remaining {unanswered} question(s) and fix {invalid} invalid answer(s) to submit")]
    ValidationBlocked { unanswered: usize, invalid: usize },

    #[error("Quiz submission is already in progress")]
    SubmissionInFlight,

    #[error("Failed to evaluate quiz: {0}")]
    SubmissionFailed(String),

    #[error("Lesson content is not ready yet")]
    LessonNotReady,

    #[error("Quiz is not ready yet")]
    QuizNotReady,

    #[error("Step '{step}' is not available")]
    StepUnavailable { step: String },

    #[error("{0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Stored state at {path} is corrupted: {message}")]
    Corrupted { path: PathBuf, message: String },

    #[error("Failed to encode stored value: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, LessonflowError>;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_VALIDATION_ERROR: u8 = 3;
pub const EXIT_API_ERROR: u8 = 4;
pub const EXIT_UNAUTHORIZED: u8 = 5;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<LessonflowError>() {
        return match err {
            LessonflowError::Config(_) => EXIT_CONFIG_ERROR,
            LessonflowError::Api(api) => api_exit_code(api),
            LessonflowError::Flow(FlowError::ValidationBlocked { .. }) => EXIT_VALIDATION_ERROR,
            _ => EXIT_ERROR,
        };
    }

    if let Some(api) = e.downcast_ref::<ApiError>() {
        return api_exit_code(api);
    }

    if let Some(FlowError::ValidationBlocked { .. }) = e.downcast_ref::<FlowError>() {
        return EXIT_VALIDATION_ERROR;
    }

    EXIT_ERROR
}

fn api_exit_code(e: &ApiError) -> u8 {
    match e {
        ApiError::Unauthorized => EXIT_UNAUTHORIZED,
        _ => EXIT_API_ERROR,
    }
}
