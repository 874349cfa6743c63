//! Answer capture and submission payloads

use lessonflow::api::types::{MaterializationQuiz, QuizOption, QuizQuestion};
use lessonflow::lesson::answers::{
    capture_text, format_answer_text, normalize_answer, resolve_option_letter, NO_ANSWER,
    OPEN_ANSWER_MAX_CHARS,
};
use lessonflow::lesson::{AnswerValue, QuestionKind, QuizAnswerSet, QuizSheet};

fn options() -> Vec<QuizOption> {
    vec![
        QuizOption {
            id: "opt-red".into(),
            text: "Red".into(),
            ..Default::default()
        },
        QuizOption {
            option_ref: "ref-green".into(),
            text: "Green".into(),
            ..Default::default()
        },
        QuizOption {
            id: "opt-blue".into(),
            text: "Blue".into(),
            ..Default::default()
        },
    ]
}

fn quiz() -> MaterializationQuiz {
    MaterializationQuiz {
        id: "mq-1".into(),
        quiz_id: Some("quiz-1".into()),
        lesson_material_id: "lm-1".into(),
        questions: vec![
            QuizQuestion {
                question_id: "colour".into(),
                question_type: "MCQ_SINGLE".into(),
                prompt: "Sky colour?".into(),
                options: options(),
                ..Default::default()
            },
            QuizQuestion {
                id: "primaries".into(),
                question_type: "mcq_multi".into(),
                prompt: "Pick primaries".into(),
                options: options(),
                ..Default::default()
            },
            QuizQuestion {
                question_type: "short_answer".into(),
                quiz: "One word for water".into(),
                ..Default::default()
            },
            QuizQuestion {
                question_id: "essay".into(),
                question_type: "open".into(),
                ..Default::default()
            },
        ],
        status: Default::default(),
    }
}

// ============================================================================
// Option Resolution Tests
// ============================================================================

mod resolution_tests {
    use super::*;

    #[test]
    fn test_every_identity_form_resolves() {
        let opts = options();
        assert_eq!(resolve_option_letter(&opts, "opt-blue").as_deref(), Some("c"));
        assert_eq!(resolve_option_letter(&opts, "REF-GREEN").as_deref(), Some("b"));
        assert_eq!(resolve_option_letter(&opts, "0").as_deref(), Some("a"));
        assert_eq!(resolve_option_letter(&opts, "B").as_deref(), Some("b"));
        assert_eq!(resolve_option_letter(&opts, " green ").as_deref(), Some("b"));
        assert_eq!(resolve_option_letter(&opts, "   "), None);
    }

    #[test]
    fn test_unknown_value_passes_through_lowercased() {
        assert_eq!(
            resolve_option_letter(&options(), "Purple").as_deref(),
            Some("purple")
        );
    }

    #[test]
    fn test_multi_answer_keeps_first_seen_order() {
        let value = AnswerValue::Choices(vec![
            "opt-blue".into(),
            "a".into(),
            "Blue".into(),
            "".into(),
        ]);
        assert_eq!(
            normalize_answer(QuestionKind::Multi, &options(), Some(&value)),
            vec!["c".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_text_answers_are_trimmed_not_resolved() {
        let value = AnswerValue::Text("  b  ".into());
        assert_eq!(
            normalize_answer(QuestionKind::Open, &options(), Some(&value)),
            vec!["b".to_string()]
        );
        assert!(normalize_answer(QuestionKind::Short, &[], None).is_empty());
    }
}

// ============================================================================
// Sheet Tests
// ============================================================================

mod sheet_tests {
    use super::*;

    #[test]
    fn test_sheet_resolves_keys_and_kinds() {
        let sheet = QuizSheet::from_quiz(&quiz());
        assert_eq!(sheet.quiz_id.as_deref(), Some("quiz-1"));
        let keys: Vec<&str> = sheet.questions.iter().map(|q| q.key.as_str()).collect();
        assert_eq!(keys, vec!["colour", "primaries", "2", "essay"]);
        assert_eq!(sheet.questions[0].kind, QuestionKind::Single);
        assert_eq!(sheet.questions[2].text, "One word for water");
        assert_eq!(sheet.questions[3].text, "Question 4");
    }

    #[test]
    fn test_validation_counts() {
        let sheet = QuizSheet::from_quiz(&quiz());
        let mut answers = QuizAnswerSet::default();
        assert_eq!(sheet.unanswered_count(&answers), 4);

        answers.insert("colour", AnswerValue::Text("opt-blue".into()));
        answers.toggle_choice("primaries", "a");
        answers.insert("2", AnswerValue::Text("two words".into()));
        answers.insert("essay", AnswerValue::Text("Because".into()));

        assert_eq!(sheet.unanswered_count(&answers), 0);
        assert_eq!(sheet.invalid_count(&answers), 1);
        assert!(!sheet.can_submit(&answers, false));

        sheet.capture(&mut answers, "2", "  water  is wet");
        assert_eq!(answers.get("2"), Some(&AnswerValue::Text("water".into())));
        assert!(sheet.can_submit(&answers, false));
        assert!(!sheet.can_submit(&answers, true));
    }

    #[test]
    fn test_capture_unknown_key_is_ignored() {
        let sheet = QuizSheet::from_quiz(&quiz());
        let mut answers = QuizAnswerSet::default();
        assert!(sheet.capture(&mut answers, "missing", "x").is_none());
        assert!(answers.is_empty());
    }

    #[test]
    fn test_request_carries_question_text_and_letters() {
        let sheet = QuizSheet::from_quiz(&quiz());
        let mut answers = QuizAnswerSet::default();
        answers.insert("colour", AnswerValue::Text("Blue".into()));
        answers.insert(
            "primaries",
            AnswerValue::Choices(vec!["ref-green".into(), "opt-red".into()]),
        );

        let request = sheet.build_request(&answers).unwrap();
        assert_eq!(request.quiz_id, "quiz-1");
        assert_eq!(request.items.len(), 4);
        assert_eq!(request.items[0].question, "Sky colour?");
        assert_eq!(request.items[0].answer, vec!["c".to_string()]);
        assert_eq!(request.items[1].answer, vec!["b".to_string(), "a".to_string()]);
        assert!(request.items[3].answer.is_empty());
    }

    #[test]
    fn test_request_without_identity_fails() {
        let mut anonymous = quiz();
        anonymous.id.clear();
        anonymous.quiz_id = None;
        let sheet = QuizSheet::from_quiz(&anonymous);
        assert!(sheet.build_request(&QuizAnswerSet::default()).is_err());
    }
}

// ============================================================================
// Input Rule And Display Tests
// ============================================================================

mod display_tests {
    use super::*;

    #[test]
    fn test_open_answer_is_capped() {
        let long = "é".repeat(OPEN_ANSWER_MAX_CHARS + 10);
        let captured = capture_text(QuestionKind::Open, &long);
        assert_eq!(captured.chars().count(), OPEN_ANSWER_MAX_CHARS);
    }

    #[test]
    fn test_choice_text_is_kept_verbatim() {
        assert_eq!(capture_text(QuestionKind::Single, " B "), " B ");
    }

    #[test]
    fn test_answer_labels() {
        let opts = options();
        let multi = AnswerValue::Choices(vec!["a".into(), "ref-green".into()]);
        assert_eq!(format_answer_text(&opts, Some(&multi)), "Red, Green");
        assert_eq!(
            format_answer_text(&opts, Some(&AnswerValue::Text("2".into()))),
            "Blue"
        );
        assert_eq!(
            format_answer_text(&opts, Some(&AnswerValue::Text("mauve".into()))),
            "mauve"
        );
        assert_eq!(format_answer_text(&opts, None), NO_ANSWER);
    }
}
