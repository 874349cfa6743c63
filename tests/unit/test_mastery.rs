//! Mastery gate, score bands and step reconciliation

use lessonflow::api::types::LessonStep;
use lessonflow::lesson::mastery::{threshold_percent, to_percent};
use lessonflow::lesson::progress::{reconcile, resolve_previous_lesson, StepSources};
use lessonflow::lesson::{FlowStep, MasteryGate, ScoreBand, SidebarAction};

// ============================================================================
// Mastery Gate Tests
// ============================================================================

mod gate_tests {
    use super::*;

    #[test]
    fn test_threshold_is_rounded() {
        assert_eq!(threshold_percent(Some(0.656)), Some(66.0));
        assert_eq!(threshold_percent(Some(70.4)), Some(70.0));
        assert_eq!(threshold_percent(None), None);
    }

    #[test]
    fn test_mixed_scales_compare_as_percentages() {
        let gate = MasteryGate::new(Some(0.75), Some(70.0));
        assert_eq!(to_percent(Some(0.75)), Some(75.0));
        assert!(gate.quiz_hidden());
        assert!(!gate.needs_retake());
    }

    #[test]
    fn test_rounded_minimum_equal_to_mastery() {
        let gate = MasteryGate::new(Some(66.0), Some(0.656));
        assert!(!gate.quiz_hidden());
        assert!(!gate.needs_retake());
    }

    #[test]
    fn test_below_minimum_offers_retake_over_next_lesson() {
        let gate = MasteryGate::new(Some(0.4), Some(0.6));
        assert_eq!(
            gate.sidebar_action(3, Some("lesson-2")),
            Some(SidebarAction::Retake { enabled: true })
        );
        assert!(gate.show_retake_warning(3));
    }

    #[test]
    fn test_first_visit_starts_quiz() {
        let gate = MasteryGate::new(Some(0.1), Some(0.6));
        assert_eq!(gate.sidebar_action(0, None), Some(SidebarAction::StartQuiz));
        assert!(!gate.show_retake_warning(0));
    }

    #[test]
    fn test_bands() {
        assert_eq!(ScoreBand::from_percent(100.0), ScoreBand::High);
        assert_eq!(ScoreBand::from_percent(79.99), ScoreBand::Medium);
        assert_eq!(ScoreBand::from_percent(0.0), ScoreBand::Low);
    }
}

// ============================================================================
// Step Tests
// ============================================================================

mod step_tests {
    use super::*;

    #[test]
    fn test_step_indices() {
        for step in FlowStep::ALL {
            assert_eq!(FlowStep::from_index(step.index()), Some(step));
        }
        assert_eq!(FlowStep::from_index(3), None);
    }

    #[test]
    fn test_step_parsing() {
        assert_eq!("lesson".parse::<FlowStep>().unwrap(), FlowStep::Content);
        assert_eq!(" QUIZ ".parse::<FlowStep>().unwrap(), FlowStep::Quiz);
        assert!("practice".parse::<FlowStep>().is_err());
    }

    #[test]
    fn test_reserved_backend_steps_show_content() {
        assert_eq!(FlowStep::from(LessonStep::Practice), FlowStep::Content);
        assert_eq!(FlowStep::from(LessonStep::Code), FlowStep::Content);
        assert_eq!(LessonStep::from(FlowStep::Results), LessonStep::Results);
    }

    #[test]
    fn test_pending_step_wins() {
        let sources = StepSources {
            remote: Some(FlowStep::Content),
            pending: Some(FlowStep::Quiz),
            saved: Some(FlowStep::Results),
        };
        assert_eq!(reconcile(sources, true), FlowStep::Quiz);
    }

    #[test]
    fn test_remote_beats_saved() {
        let sources = StepSources {
            remote: Some(FlowStep::Quiz),
            pending: None,
            saved: Some(FlowStep::Content),
        };
        assert_eq!(reconcile(sources, false), FlowStep::Quiz);
    }

    #[test]
    fn test_attempts_land_on_results() {
        let sources = StepSources {
            saved: Some(FlowStep::Content),
            ..Default::default()
        };
        assert_eq!(reconcile(sources, true), FlowStep::Results);
        assert_eq!(reconcile(StepSources::default(), false), FlowStep::Content);
    }

    #[test]
    fn test_previous_lesson_hint_order() {
        assert_eq!(
            resolve_previous_lesson(Some("explicit"), Some("remembered"), Some("prior"), "l3"),
            "explicit"
        );
        assert_eq!(
            resolve_previous_lesson(None, Some("remembered"), Some("prior"), "l3"),
            "remembered"
        );
        assert_eq!(
            resolve_previous_lesson(Some(" "), Some("l3"), Some("prior"), "l3"),
            "prior"
        );
        assert_eq!(resolve_previous_lesson(None, None, None, "l3"), "l3");
    }
}
