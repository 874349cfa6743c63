//! Error path and exit code tests
//!
//! These tests check how failures surface to the command line:
//! - Exit codes per error layer
//! - User-facing messages
//! - Not-found detection used to trigger lazy generation

use lessonflow::errors::{
    get_exit_code, ApiError, FlowError, LessonflowError, StorageError, EXIT_API_ERROR,
    EXIT_CONFIG_ERROR, EXIT_ERROR, EXIT_UNAUTHORIZED, EXIT_VALIDATION_ERROR,
};
use std::path::PathBuf;

// ============================================================================
// Exit Code Tests
// ============================================================================

mod exit_code_tests {
    use super::*;

    #[test]
    fn test_wrapped_errors() {
        let cases = [
            (LessonflowError::Config("missing student".into()), EXIT_CONFIG_ERROR),
            (LessonflowError::Api(ApiError::Unauthorized), EXIT_UNAUTHORIZED),
            (LessonflowError::Api(ApiError::Timeout), EXIT_API_ERROR),
            (
                LessonflowError::Flow(FlowError::ValidationBlocked {
                    unanswered: 1,
                    invalid: 0,
                }),
                EXIT_VALIDATION_ERROR,
            ),
            (LessonflowError::Flow(FlowError::SubmissionInFlight), EXIT_ERROR),
        ];
        for (err, code) in cases {
            let label = err.to_string();
            assert_eq!(get_exit_code(&anyhow::Error::new(err)), code, "{}", label);
        }
    }

    #[test]
    fn test_bare_layer_errors() {
        let api = anyhow::Error::new(ApiError::NotFound {
            path: "/api/x".into(),
        });
        assert_eq!(get_exit_code(&api), EXIT_API_ERROR);

        let flow = anyhow::Error::new(FlowError::ValidationBlocked {
            unanswered: 0,
            invalid: 2,
        });
        assert_eq!(get_exit_code(&flow), EXIT_VALIDATION_ERROR);
    }

    #[test]
    fn test_context_does_not_hide_code() {
        let err = anyhow::Error::new(LessonflowError::Api(ApiError::Unauthorized))
            .context("Failed to open lesson");
        assert_eq!(get_exit_code(&err), EXIT_UNAUTHORIZED);
    }

    #[test]
    fn test_plain_error_fallback() {
        assert_eq!(get_exit_code(&anyhow::anyhow!("something else")), EXIT_ERROR);
    }
}

// ============================================================================
// Message Tests
// ============================================================================

mod message_tests {
    use super::*;

    #[test]
    fn test_generation_failure_names_resource() {
        let err = FlowError::GenerationFailed {
            resource: "Quiz".into(),
        };
        assert_eq!(err.to_string(), "Quiz generation failed");
    }

    #[test]
    fn test_storage_error_names_path() {
        let err = StorageError::Corrupted {
            path: PathBuf::from("/tmp/state.json"),
            message: "expected value".into(),
        };
        let text = LessonflowError::from(err).to_string();
        assert!(text.contains("/tmp/state.json"));
        assert!(text.contains("corrupted"));
    }

    #[test]
    fn test_only_not_found_triggers_generation() {
        assert!(ApiError::NotFound { path: "/m".into() }.is_not_found());
        assert!(!ApiError::Timeout.is_not_found());
        assert!(!ApiError::HttpStatus {
            status: 500,
            message: String::new()
        }
        .is_not_found());
    }
}
