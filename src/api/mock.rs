//! Mock learning backend for unit testing.
//!
//! Each endpoint has its own response queue. A call pops the front of the
//! queue; the last queued response is sticky so a poller can keep reading a
//! steady state. An empty queue answers with a network error.

use super::*;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
struct Queues {
    progress: VecDeque<ApiResult<LessonProgress>>,
    start_progress: VecDeque<ApiResult<LessonProgress>>,
    change_step: VecDeque<ApiResult<LessonProgress>>,
    materialization: VecDeque<ApiResult<Materialization>>,
    start_materialization: VecDeque<ApiResult<()>>,
    retry_lesson: VecDeque<ApiResult<()>>,
    quiz: VecDeque<ApiResult<MaterializationQuiz>>,
    retry_quiz: VecDeque<ApiResult<()>>,
    evaluate: VecDeque<ApiResult<QuizAttempt>>,
    attempts: VecDeque<ApiResult<Vec<QuizAttempt>>>,
    course: VecDeque<ApiResult<Course>>,
}

#[derive(Default)]
pub struct MockBackend {
    queues: Mutex<Queues>,
    calls: Mutex<Vec<String>>,
    evaluate_requests: Mutex<Vec<EvaluateRequest>>,
}

fn next<T: Clone>(queue: &mut VecDeque<ApiResult<T>>, name: &str) -> ApiResult<T> {
    if queue.len() > 1 {
        if let Some(item) = queue.pop_front() {
            return item;
        }
    }
    queue
        .front()
        .cloned()
        .unwrap_or_else(|| Err(ApiError::Network(format!("mock: nothing queued for {}", name))))
}

macro_rules! queue_setter {
    ($fn_name:ident, $field:ident, $ty:ty) => {
        pub fn $fn_name(&self, response: ApiResult<$ty>) -> &Self {
            if let Ok(mut q) = self.queues.lock() {
                q.$field.push_back(response);
            }
            self
        }
    };
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    queue_setter!(push_progress, progress, LessonProgress);
    queue_setter!(push_start_progress, start_progress, LessonProgress);
    queue_setter!(push_change_step, change_step, LessonProgress);
    queue_setter!(push_materialization, materialization, Materialization);
    queue_setter!(push_start_materialization, start_materialization, ());
    queue_setter!(push_retry_lesson, retry_lesson, ());
    queue_setter!(push_quiz, quiz, MaterializationQuiz);
    queue_setter!(push_retry_quiz, retry_quiz, ());
    queue_setter!(push_evaluate, evaluate, QuizAttempt);
    queue_setter!(push_attempts, attempts, Vec<QuizAttempt>);
    queue_setter!(push_course, course, Course);

    /// Replace whatever is queued for the attempts endpoint.
    pub fn set_attempts(&self, response: ApiResult<Vec<QuizAttempt>>) {
        if let Ok(mut q) = self.queues.lock() {
            q.attempts.clear();
            q.attempts.push_back(response);
        }
    }

    /// Replace whatever is queued for the quiz endpoint.
    pub fn set_quiz(&self, response: ApiResult<MaterializationQuiz>) {
        if let Ok(mut q) = self.queues.lock() {
            q.quiz.clear();
            q.quiz.push_back(response);
        }
    }

    /// Every call made so far, as `endpoint:argument`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls whose label starts with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn evaluate_requests(&self) -> Vec<EvaluateRequest> {
        self.evaluate_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn take<T: Clone>(
        &self,
        name: &str,
        pick: impl FnOnce(&mut Queues) -> &mut VecDeque<ApiResult<T>>,
    ) -> ApiResult<T> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| ApiError::Network(format!("mock lock poisoned: {}", e)))?;
        next(pick(&mut queues), name)
    }
}

#[async_trait]
impl LearningBackend for MockBackend {
    async fn get_lesson_progress(&self, lesson_id: &str) -> ApiResult<LessonProgress> {
        self.record(format!("get_lesson_progress:{}", lesson_id));
        self.take("get_lesson_progress", |q| &mut q.progress)
    }

    async fn start_lesson_progress(
        &self,
        lesson_id: &str,
        prev_lesson_id: Option<&str>,
    ) -> ApiResult<LessonProgress> {
        self.record(format!(
            "start_lesson_progress:{}:{}",
            lesson_id,
            prev_lesson_id.unwrap_or("-")
        ));
        self.take("start_lesson_progress", |q| &mut q.start_progress)
    }

    async fn change_lesson_step(
        &self,
        lesson_progress_id: &str,
        step: LessonStep,
    ) -> ApiResult<LessonProgress> {
        self.record(format!("change_lesson_step:{}:{}", lesson_progress_id, step));
        self.take("change_lesson_step", |q| &mut q.change_step)
    }

    async fn get_materialization(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> ApiResult<Materialization> {
        self.record(format!("get_materialization:{}:{}", student_id, lesson_id));
        self.take("get_materialization", |q| &mut q.materialization)
    }

    async fn start_materialization(&self, request: &StartMaterializationRequest) -> ApiResult<()> {
        self.record(format!(
            "start_materialization:{}:{}",
            request.course_id, request.lesson_id
        ));
        self.take("start_materialization", |q| &mut q.start_materialization)
    }

    async fn retry_materialization_lesson(
        &self,
        lesson_material_id: &str,
        course_id: &str,
    ) -> ApiResult<()> {
        self.record(format!(
            "retry_materialization_lesson:{}:{}",
            lesson_material_id, course_id
        ));
        self.take("retry_materialization_lesson", |q| &mut q.retry_lesson)
    }

    async fn get_materialization_quiz(
        &self,
        lesson_material_id: &str,
    ) -> ApiResult<MaterializationQuiz> {
        self.record(format!("get_materialization_quiz:{}", lesson_material_id));
        self.take("get_materialization_quiz", |q| &mut q.quiz)
    }

    async fn retry_materialization_quiz(
        &self,
        lesson_material_id: &str,
        course_id: Option<&str>,
    ) -> ApiResult<()> {
        self.record(format!(
            "retry_materialization_quiz:{}:{}",
            lesson_material_id,
            course_id.unwrap_or("-")
        ));
        self.take("retry_materialization_quiz", |q| &mut q.retry_quiz)
    }

    async fn evaluate_quiz(
        &self,
        lesson_id: &str,
        request: &EvaluateRequest,
    ) -> ApiResult<QuizAttempt> {
        self.record(format!("evaluate_quiz:{}:{}", lesson_id, request.quiz_id));
        if let Ok(mut reqs) = self.evaluate_requests.lock() {
            reqs.push(request.clone());
        }
        self.take("evaluate_quiz", |q| &mut q.evaluate)
    }

    async fn get_quiz_attempts(&self, quiz_id: &str) -> ApiResult<Vec<QuizAttempt>> {
        self.record(format!("get_quiz_attempts:{}", quiz_id));
        self.take("get_quiz_attempts", |q| &mut q.attempts)
    }

    async fn get_course(&self, course_id: &str) -> ApiResult<Course> {
        self.record(format!("get_course:{}", course_id));
        self.take("get_course", |q| &mut q.course)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(step: LessonStep) -> LessonProgress {
        LessonProgress {
            id: "lp-1".into(),
            lesson_id: "l-1".into(),
            lesson_position: None,
            student_id: "s-1".into(),
            mastery: None,
            step,
            status: ProgressStatus::Started,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_queue_pops_then_sticks_on_last() {
        let mock = MockBackend::new();
        mock.push_progress(Ok(progress(LessonStep::Lesson)))
            .push_progress(Ok(progress(LessonStep::Quiz)));

        let first = mock.get_lesson_progress("l-1").await.unwrap();
        let second = mock.get_lesson_progress("l-1").await.unwrap();
        let third = mock.get_lesson_progress("l-1").await.unwrap();
        assert_eq!(first.step, LessonStep::Lesson);
        assert_eq!(second.step, LessonStep::Quiz);
        assert_eq!(third.step, LessonStep::Quiz);
        assert_eq!(mock.call_count("get_lesson_progress"), 3);
    }

    #[tokio::test]
    async fn test_empty_queue_errors() {
        let mock = MockBackend::new();
        let err = mock.get_course("c-1").await.unwrap_err();
        assert!(err.to_string().contains("nothing queued"));
    }
}
