use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::errors::ApiError;
use crate::observability::telemetry::{redact_secrets, sanitize_for_log, track_request};

pub mod types;

#[cfg(test)]
pub mod mock;

use types::*;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Lesson regeneration. Modelled on the quiz `try-again` route; not confirmed
/// against the backend.
pub const LESSON_RETRY_PATH: &str = "/materialization/try-again";
/// Attempt history for one quiz. Same caveat as [`LESSON_RETRY_PATH`].
pub const QUIZ_ATTEMPTS_PATH: &str = "/materialization/quiz/attempts";

/// Trait abstraction over the learning backend, enabling test mocking.
#[async_trait]
pub trait LearningBackend: Send + Sync {
    /// GET /student/lesson-progress
    async fn get_lesson_progress(&self, lesson_id: &str) -> ApiResult<LessonProgress>;

    /// POST /student/lesson-progress/start
    async fn start_lesson_progress(
        &self,
        lesson_id: &str,
        prev_lesson_id: Option<&str>,
    ) -> ApiResult<LessonProgress>;

    /// PUT /student/lesson-progress/change-step
    async fn change_lesson_step(
        &self,
        lesson_progress_id: &str,
        step: LessonStep,
    ) -> ApiResult<LessonProgress>;

    /// GET /materialization (never served from cache)
    async fn get_materialization(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> ApiResult<Materialization>;

    /// POST /materialization/start
    async fn start_materialization(&self, request: &StartMaterializationRequest) -> ApiResult<()>;

    /// POST /materialization/try-again
    async fn retry_materialization_lesson(
        &self,
        lesson_material_id: &str,
        course_id: &str,
    ) -> ApiResult<()>;

    /// GET /materialization/quiz
    async fn get_materialization_quiz(
        &self,
        lesson_material_id: &str,
    ) -> ApiResult<MaterializationQuiz>;

    /// POST /materialization/quiz/try-again
    async fn retry_materialization_quiz(
        &self,
        lesson_material_id: &str,
        course_id: Option<&str>,
    ) -> ApiResult<()>;

    /// POST /materialization/evaluate
    async fn evaluate_quiz(
        &self,
        lesson_id: &str,
        request: &EvaluateRequest,
    ) -> ApiResult<QuizAttempt>;

    /// GET /materialization/quiz/attempts
    async fn get_quiz_attempts(&self, quiz_id: &str) -> ApiResult<Vec<QuizAttempt>>;

    /// GET /api/course/get
    async fn get_course(&self, course_id: &str) -> ApiResult<Course>;
}

/// HTTP client for the learning backend.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &crate::config::Config) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.api.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.api.connect_timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            token: RwLock::new(config.token.clone()),
        })
    }

    pub fn has_session(&self) -> bool {
        self.token.read().map(|t| t.is_some()).unwrap_or(false)
    }

    /// Drop the session credentials. Every 401 funnels through here so the
    /// teardown happens in one place rather than per call site.
    pub fn clear_session(&self) {
        if let Ok(mut token) = self.token.write() {
            if token.take().is_some() {
                warn!("Backend rejected the session; credentials cleared, sign in again");
            }
        }
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<Url> {
        build_url(&self.base_url, path, query)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header("Content-Type", "application/json");
        if let Ok(token) = self.token.read() {
            if let Some(ref t) = *token {
                builder = builder.bearer_auth(t);
            }
        }
        builder
    }

    async fn execute(&self, builder: RequestBuilder, path: &str) -> ApiResult<String> {
        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if status.is_success() {
            debug!("{} -> {} ({} bytes)", path, status, body.len());
            return Ok(body);
        }

        let err = map_status(status, path, &body);
        if matches!(err, ApiError::Unauthorized) {
            self.clear_session();
        }
        Err(err)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        no_cache: bool,
    ) -> ApiResult<T> {
        let url = self.url(path, query)?;
        let mut builder = self.request(Method::GET, url);
        if no_cache {
            builder = builder
                .header("Cache-Control", "no-cache")
                .header("Pragma", "no-cache");
        }
        let body = self.execute(builder, path).await?;
        parse_body(&body)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> ApiResult<T> {
        let url = self.url(path, query)?;
        let builder = self.request(method, url).json(body);
        let text = self.execute(builder, path).await?;
        parse_body(&text)
    }

    async fn post_no_content<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> ApiResult<()> {
        let url = self.url(path, query)?;
        let mut builder = self.request(Method::POST, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder, path).await.map(|_| ())
    }
}

#[async_trait]
impl LearningBackend for ApiClient {
    async fn get_lesson_progress(&self, lesson_id: &str) -> ApiResult<LessonProgress> {
        let query = [("lessonId", lesson_id)];
        track_request("get_lesson_progress", || {
            self.get_json("/student/lesson-progress", &query, false)
        })
        .await
    }

    async fn start_lesson_progress(
        &self,
        lesson_id: &str,
        prev_lesson_id: Option<&str>,
    ) -> ApiResult<LessonProgress> {
        let mut query = vec![("lessonId", lesson_id)];
        if let Some(prev) = prev_lesson_id {
            query.push(("prevLessonId", prev));
        }
        let empty = serde_json::json!({});
        track_request("start_lesson_progress", || {
            self.send_json(Method::POST, "/student/lesson-progress/start", &query, &empty)
        })
        .await
    }

    async fn change_lesson_step(
        &self,
        lesson_progress_id: &str,
        step: LessonStep,
    ) -> ApiResult<LessonProgress> {
        let body = ChangeStepRequest {
            lesson_progress_id: lesson_progress_id.to_string(),
            step,
        };
        track_request("change_lesson_step", || {
            self.send_json(Method::PUT, "/student/lesson-progress/change-step", &[], &body)
        })
        .await
    }

    async fn get_materialization(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> ApiResult<Materialization> {
        let query = [("studentId", student_id), ("lessonId", lesson_id)];
        track_request("get_materialization", || {
            self.get_json("/materialization", &query, true)
        })
        .await
    }

    async fn start_materialization(&self, request: &StartMaterializationRequest) -> ApiResult<()> {
        track_request("start_materialization", || {
            self.post_no_content("/materialization/start", &[], Some(request))
        })
        .await
    }

    async fn retry_materialization_lesson(
        &self,
        lesson_material_id: &str,
        course_id: &str,
    ) -> ApiResult<()> {
        let query = [("lessonMaterialId", lesson_material_id), ("courseId", course_id)];
        track_request("retry_materialization_lesson", || {
            self.post_no_content::<()>(LESSON_RETRY_PATH, &query, None)
        })
        .await
    }

    async fn get_materialization_quiz(
        &self,
        lesson_material_id: &str,
    ) -> ApiResult<MaterializationQuiz> {
        let query = [("lessonMaterialId", lesson_material_id)];
        track_request("get_materialization_quiz", || {
            self.get_json("/materialization/quiz", &query, false)
        })
        .await
    }

    async fn retry_materialization_quiz(
        &self,
        lesson_material_id: &str,
        course_id: Option<&str>,
    ) -> ApiResult<()> {
        let mut query = vec![("lessonMaterialId", lesson_material_id)];
        if let Some(course) = course_id {
            query.push(("courseId", course));
        }
        track_request("retry_materialization_quiz", || {
            self.post_no_content::<()>("/materialization/quiz/try-again", &query, None)
        })
        .await
    }

    async fn evaluate_quiz(
        &self,
        lesson_id: &str,
        request: &EvaluateRequest,
    ) -> ApiResult<QuizAttempt> {
        let query = [("lessonId", lesson_id)];
        track_request("evaluate_quiz", || {
            self.send_json(Method::POST, "/materialization/evaluate", &query, request)
        })
        .await
    }

    async fn get_quiz_attempts(&self, quiz_id: &str) -> ApiResult<Vec<QuizAttempt>> {
        let query = [("quizId", quiz_id)];
        track_request("get_quiz_attempts", || {
            self.get_json(QUIZ_ATTEMPTS_PATH, &query, false)
        })
        .await
    }

    async fn get_course(&self, course_id: &str) -> ApiResult<Course> {
        let query = [("courseId", course_id)];
        track_request("get_course", || {
            self.get_json("/api/course/get", &query, false)
        })
        .await
    }
}

/// Join `path` onto `base` and append URL-encoded query parameters.
pub fn build_url(base: &str, path: &str, query: &[(&str, &str)]) -> ApiResult<Url> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    let mut url = Url::parse(&joined).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", joined, e)))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter());
    }
    Ok(url)
}

/// Map a non-success HTTP status to the error taxonomy.
pub fn map_status(status: StatusCode, path: &str, body: &str) -> ApiError {
    match status {
        StatusCode::NOT_FOUND => ApiError::NotFound {
            path: path.to_string(),
        },
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiError::Timeout,
        _ => ApiError::HttpStatus {
            status: status.as_u16(),
            message: redact_secrets(&sanitize_for_log(truncate(body, 512))),
        },
    }
}

fn map_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    // Endpoints that return nothing still need to deserialize into `()`.
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
