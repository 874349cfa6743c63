//! Backend wire types and request helpers

use lessonflow::api::types::{
    parse_timestamp, ChangeStepRequest, Course, GenerationStatus, LessonStep, Materialization,
    MaterializationQuiz, ProgressStatus, QuizAttempt,
};
use lessonflow::api::{build_url, map_status};
use lessonflow::errors::ApiError;
use reqwest::StatusCode;

// ============================================================================
// Payload Parsing Tests
// ============================================================================

mod payload_tests {
    use super::*;

    #[test]
    fn test_materialization_with_sections() {
        let json = r#"{
            "lessonId": "l1",
            "lessonMaterialId": "lm-1",
            "studentId": "s1",
            "sections": [
                {"title": "Ownership", "content": "Every value has one owner.", "examples": ["let a = b;"]}
            ],
            "generationStatus": "FINISHED"
        }"#;
        let m: Materialization = serde_json::from_str(json).unwrap();
        assert_eq!(m.lesson_material_id, "lm-1");
        assert_eq!(m.sections.len(), 1);
        assert_eq!(m.sections[0].examples, vec!["let a = b;".to_string()]);
        assert_eq!(m.generation_status, GenerationStatus::Finished);
    }

    #[test]
    fn test_generation_status_missing_or_unknown() {
        let missing: Materialization = serde_json::from_str(r#"{"lessonId": "l1"}"#).unwrap();
        assert_eq!(missing.generation_status, GenerationStatus::Unknown);

        let odd: MaterializationQuiz =
            serde_json::from_str(r#"{"id": "q", "status": "QUEUED"}"#).unwrap();
        assert_eq!(odd.status, GenerationStatus::Unknown);
    }

    #[test]
    fn test_quiz_identity_falls_back_to_id() {
        let quiz: MaterializationQuiz =
            serde_json::from_str(r#"{"id": "mq-1", "quizId": "", "status": "GENERATING"}"#).unwrap();
        assert_eq!(quiz.identity(), Some("mq-1"));

        let anonymous: MaterializationQuiz = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(anonymous.identity(), None);
    }

    #[test]
    fn test_quiz_questions_parse_type_and_options() {
        let json = r#"{
            "quizId": "quiz-9",
            "status": "FINISHED",
            "questions": [
                {"questionId": "q1", "type": "mcq_multi", "prompt": "Pick two",
                 "options": [{"id": "o1", "text": "A"}, {"optionRef": "r2"}]}
            ]
        }"#;
        let quiz: MaterializationQuiz = serde_json::from_str(json).unwrap();
        let q = &quiz.questions[0];
        assert_eq!(q.question_type, "mcq_multi");
        assert_eq!(q.options[0].label(), Some("A"));
        assert_eq!(q.options[1].label(), Some("r2"));
    }

    #[test]
    fn test_attempt_score_and_details() {
        let json = r#"{
            "id": "att-1",
            "quizId": "quiz-9",
            "scorePercent": 0.75,
            "details": [{"questionId": "q1", "score": 0.5, "explanation": "Half right"}],
            "content": [{"question": "Pick two", "options": ["A"]}],
            "createdAt": "2024-05-01T10:00:00Z"
        }"#;
        let attempt: QuizAttempt = serde_json::from_str(json).unwrap();
        assert_eq!(attempt.score_percent, Some(0.75));
        assert_eq!(attempt.details[0].score, 0.5);
        assert_eq!(attempt.content[0].options, vec!["A".to_string()]);
        assert!(attempt.created_at_utc().is_some());
    }

    #[test]
    fn test_progress_defaults() {
        let json = r#"{"id": "lp-1", "lessonId": "l1"}"#;
        let progress: lessonflow::api::types::LessonProgress = serde_json::from_str(json).unwrap();
        assert_eq!(progress.step, LessonStep::Lesson);
        assert_eq!(progress.status, ProgressStatus::NotStarted);
        assert!(progress.mastery.is_none());
    }

    #[test]
    fn test_course_outline() {
        let json = r#"{
            "id": "c1",
            "title": "Rust",
            "modules": [
                {"id": "m1", "position": 1, "lessons": [
                    {"id": "l1", "title": "Basics", "position": 1, "minMastery": 0.7}
                ]}
            ]
        }"#;
        let course: Course = serde_json::from_str(json).unwrap();
        assert_eq!(course.modules[0].lessons[0].min_mastery, Some(0.7));
    }

    #[test]
    fn test_change_step_serializes_uppercase() {
        let body = serde_json::to_value(ChangeStepRequest {
            lesson_progress_id: "lp-1".into(),
            step: LessonStep::Results,
        })
        .unwrap();
        assert_eq!(body["lessonProgressId"], "lp-1");
        assert_eq!(body["step"], "RESULTS");
    }
}

// ============================================================================
// Timestamp Tests
// ============================================================================

mod timestamp_tests {
    use super::*;

    #[test]
    fn test_rfc3339_with_offset() {
        let ts = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_zoneless_timestamp_reads_as_utc() {
        let ts = parse_timestamp("2024-05-01T10:00:00.123").unwrap();
        assert_eq!(ts.timestamp(), 1_714_557_600);
    }

    #[test]
    fn test_garbage_timestamp() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }
}

// ============================================================================
// Request Helper Tests
// ============================================================================

mod request_tests {
    use super::*;

    #[test]
    fn test_build_url_encodes_query() {
        let url = build_url(
            "http://localhost:8080/",
            "/api/lesson-progress/start",
            &[("lessonId", "l 1"), ("previousLessonId", "a&b")],
        )
        .unwrap();
        assert_eq!(url.path(), "/api/lesson-progress/start");
        assert_eq!(url.query(), Some("lessonId=l+1&previousLessonId=a%26b"));
    }

    #[test]
    fn test_build_url_without_query() {
        let url = build_url("https://learn.example.com", "/api/course/get", &[]).unwrap();
        assert_eq!(url.as_str(), "https://learn.example.com/api/course/get");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_build_url_rejects_bad_base() {
        let err = build_url("not a url", "/x", &[]).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[test]
    fn test_map_status_variants() {
        assert!(map_status(StatusCode::NOT_FOUND, "/api/x", "").is_not_found());
        assert_eq!(
            map_status(StatusCode::UNAUTHORIZED, "/api/x", ""),
            ApiError::Unauthorized
        );
        assert_eq!(
            map_status(StatusCode::GATEWAY_TIMEOUT, "/api/x", ""),
            ApiError::Timeout
        );
        match map_status(StatusCode::INTERNAL_SERVER_ERROR, "/api/x", "boom") {
            ApiError::HttpStatus { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
