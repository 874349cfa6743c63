//! Answer capture, validation and normalization
//!
//! Learners answer in whatever form the question offers: an option id, a
//! letter, a positional index, the option text, or free text. Before
//! submission every multiple-choice answer is resolved to one letter per
//! option index (`a` for the first option, `b` for the second, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::types::{EvaluateItem, EvaluateRequest, MaterializationQuiz, QuizOption, QuizQuestion};
use crate::errors::FlowError;

/// Longest accepted open answer, in characters.
pub const OPEN_ANSWER_MAX_CHARS: usize = 256;

/// Placeholder shown where no answer is available.
pub const NO_ANSWER: &str = "—";

/// How a question is answered, resolved once when the quiz loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Single,
    Multi,
    Short,
    Open,
}

impl QuestionKind {
    pub fn resolve(question: &QuizQuestion) -> Self {
        let has_options = !question.options.is_empty();
        match question.question_type.trim().to_lowercase().as_str() {
            "mcq_single" => QuestionKind::Single,
            "mcq_multi" => QuestionKind::Multi,
            "short_answer" => QuestionKind::Short,
            "open" => QuestionKind::Open,
            _ if has_options => QuestionKind::Single,
            _ => QuestionKind::Open,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionKind::Single | QuestionKind::Multi)
    }
}

/// A stored answer: free text / single selection, or a multi-select list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    pub fn is_unanswered(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s.trim().is_empty(),
            AnswerValue::Choices(v) => v.is_empty(),
        }
    }

    /// Raw values in entry order, without normalization.
    pub fn values(&self) -> Vec<&str> {
        match self {
            AnswerValue::Text(s) => vec![s.as_str()],
            AnswerValue::Choices(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// Identity of a question within one quiz: questionId, then id, then position.
pub fn question_key(question: &QuizQuestion, index: usize) -> String {
    [question.question_id.trim(), question.id.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| index.to_string())
}

/// Letter code for the option at `index`.
pub fn option_letter(index: usize) -> String {
    u32::try_from(index)
        .ok()
        .and_then(|i| char::from_u32(97 + i))
        .map(String::from)
        .unwrap_or_default()
}

fn parse_index(raw: &str, len: usize) -> Option<usize> {
    let n: f64 = raw.trim().parse().ok()?;
    if n.fract() != 0.0 || n < 0.0 || n >= len as f64 {
        return None;
    }
    Some(n as usize)
}

/// Resolve one raw value to an option letter. Returns `None` for blank input.
///
/// Matching order: option id, optionRef, index, letter or text (case-insensitive),
/// then an in-range numeric index, then the lower-cased value itself.
pub fn resolve_option_letter(options: &[QuizOption], raw: &str) -> Option<String> {
    let normalized = raw.trim();
    if normalized.is_empty() {
        return None;
    }
    let needle = normalized.to_lowercase();

    let matched = options.iter().enumerate().find_map(|(idx, opt)| {
        let letter = option_letter(idx);
        let index = idx.to_string();
        let hit = [
            opt.id.as_str(),
            opt.option_ref.as_str(),
            index.as_str(),
            letter.as_str(),
            opt.text.as_str(),
        ]
        .into_iter()
        .filter(|c| !c.is_empty())
        .any(|c| c.trim().to_lowercase() == needle);
        hit.then_some(letter)
    });

    matched
        .or_else(|| parse_index(normalized, options.len()).map(option_letter))
        .or(Some(needle))
}

/// Resolve raw choices to letters, keeping first-seen order and dropping duplicates.
pub fn normalize_choices<S: AsRef<str>>(options: &[QuizOption], values: &[S]) -> Vec<String> {
    let mut letters: Vec<String> = Vec::new();
    for value in values {
        if let Some(letter) = resolve_option_letter(options, value.as_ref()) {
            if !letters.contains(&letter) {
                letters.push(letter);
            }
        }
    }
    letters
}

/// Submission form of one answer.
pub fn normalize_answer(
    kind: QuestionKind,
    options: &[QuizOption],
    value: Option<&AnswerValue>,
) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    if kind.is_choice() {
        return normalize_choices(options, value.values().as_slice());
    }
    value
        .values()
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Collapse whitespace and keep only the first token.
pub fn squeeze_short_answer(raw: &str) -> String {
    raw.split_whitespace().next().unwrap_or_default().to_string()
}

/// Truncate to the open-answer limit on a character boundary.
pub fn cap_open_answer(raw: &str) -> String {
    raw.chars().take(OPEN_ANSWER_MAX_CHARS).collect()
}

/// Apply the per-kind input rule to typed text.
pub fn capture_text(kind: QuestionKind, raw: &str) -> String {
    match kind {
        QuestionKind::Short => squeeze_short_answer(raw),
        QuestionKind::Open => cap_open_answer(raw),
        QuestionKind::Single | QuestionKind::Multi => raw.to_string(),
    }
}

/// Soft validation. Blank answers are unanswered, not invalid.
pub fn is_answer_invalid(kind: QuestionKind, value: Option<&AnswerValue>) -> bool {
    let Some(AnswerValue::Text(text)) = value else {
        return false;
    };
    match kind {
        QuestionKind::Short => !text.is_empty() && text.chars().any(char::is_whitespace),
        QuestionKind::Open => text.chars().count() > OPEN_ANSWER_MAX_CHARS,
        QuestionKind::Single | QuestionKind::Multi => false,
    }
}

pub fn is_unanswered(value: Option<&AnswerValue>) -> bool {
    value.map_or(true, AnswerValue::is_unanswered)
}

/// Answers keyed by question key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuizAnswerSet {
    entries: BTreeMap<String, AnswerValue>,
}

impl QuizAnswerSet {
    pub fn get(&self, key: &str) -> Option<&AnswerValue> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: AnswerValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<AnswerValue> {
        self.entries.remove(key)
    }

    /// Add `value` to a multi-select answer, or take it out if already chosen.
    pub fn toggle_choice(&mut self, key: &str, value: &str) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| AnswerValue::Choices(Vec::new()));
        let mut choices = match std::mem::replace(entry, AnswerValue::Choices(Vec::new())) {
            AnswerValue::Choices(v) => v,
            AnswerValue::Text(t) if t.trim().is_empty() => Vec::new(),
            AnswerValue::Text(t) => vec![t],
        };
        if let Some(pos) = choices.iter().position(|c| c == value) {
            choices.remove(pos);
        } else {
            choices.push(value.to_string());
        }
        *entry = AnswerValue::Choices(choices);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnswerValue)> {
        self.entries.iter()
    }
}

/// A question with its identity, kind and display text resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuestion {
    pub key: String,
    pub index: usize,
    pub kind: QuestionKind,
    pub text: String,
    pub question: QuizQuestion,
}

impl PreparedQuestion {
    pub fn options(&self) -> &[QuizOption] {
        &self.question.options
    }
}

/// Display text for a question: prompt, then the legacy quiz field, then "Question N".
pub fn question_text(question: &QuizQuestion, index: usize) -> String {
    [question.prompt.trim(), question.quiz.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("Question {}", index + 1))
}

/// A loaded quiz, prepared for answering.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSheet {
    pub quiz_id: Option<String>,
    pub questions: Vec<PreparedQuestion>,
}

impl QuizSheet {
    pub fn from_quiz(quiz: &MaterializationQuiz) -> Self {
        let questions = quiz
            .questions
            .iter()
            .enumerate()
            .map(|(index, q)| PreparedQuestion {
                key: question_key(q, index),
                index,
                kind: QuestionKind::resolve(q),
                text: question_text(q, index),
                question: q.clone(),
            })
            .collect();
        Self {
            quiz_id: quiz.identity().map(String::from),
            questions,
        }
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn find(&self, key: &str) -> Option<&PreparedQuestion> {
        self.questions.iter().find(|q| q.key == key)
    }

    /// Look up by a grading detail's question id, falling back to position.
    pub fn find_for_detail(&self, question_id: &str, index: usize) -> Option<&PreparedQuestion> {
        let id = question_id.trim();
        if !id.is_empty() {
            if let Some(q) = self.find(id) {
                return Some(q);
            }
        }
        self.questions.get(index)
    }

    pub fn unanswered_count(&self, answers: &QuizAnswerSet) -> usize {
        self.questions
            .iter()
            .filter(|q| is_unanswered(answers.get(&q.key)))
            .count()
    }

    pub fn invalid_count(&self, answers: &QuizAnswerSet) -> usize {
        self.questions
            .iter()
            .filter(|q| is_answer_invalid(q.kind, answers.get(&q.key)))
            .count()
    }

    pub fn can_submit(&self, answers: &QuizAnswerSet, submitting: bool) -> bool {
        !submitting
            && self.total() > 0
            && self.unanswered_count(answers) == 0
            && self.invalid_count(answers) == 0
    }

    /// Record typed text for `key`, applying the question's input rule.
    pub fn capture(&self, answers: &mut QuizAnswerSet, key: &str, raw: &str) -> Option<QuestionKind> {
        let question = self.find(key)?;
        answers.insert(key, AnswerValue::Text(capture_text(question.kind, raw)));
        Some(question.kind)
    }

    /// Build the evaluate payload. Fails only when the quiz has no identity.
    pub fn build_request(&self, answers: &QuizAnswerSet) -> Result<EvaluateRequest, FlowError> {
        let quiz_id = self.quiz_id.clone().ok_or(FlowError::QuizNotReady)?;
        let items = self
            .questions
            .iter()
            .map(|q| EvaluateItem {
                question: q.text.clone(),
                answer: normalize_answer(q.kind, q.options(), answers.get(&q.key)),
            })
            .collect();
        Ok(EvaluateRequest { quiz_id, items })
    }
}

fn option_display(opt: &QuizOption, fallback: &str) -> String {
    opt.label().unwrap_or(fallback).to_string()
}

fn answer_label(options: &[QuizOption], raw: &str) -> String {
    let val = raw.trim();
    if options.is_empty() {
        return val.to_string();
    }
    if let Some(opt) = options.iter().find(|o| {
        let id = if o.id.is_empty() { &o.option_ref } else { &o.id };
        !id.is_empty() && id == val
    }) {
        return option_display(opt, val);
    }
    let lower = val.to_lowercase();
    let mut chars = lower.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() {
            if let Some(opt) = options.get((c as u8 - b'a') as usize) {
                return option_display(opt, val);
            }
        }
    }
    if let Some(opt) = parse_index(val, options.len()).and_then(|i| options.get(i)) {
        return option_display(opt, val);
    }
    val.to_string()
}

/// Human label for a stored answer. Unresolvable values display verbatim.
pub fn format_answer_text(options: &[QuizOption], value: Option<&AnswerValue>) -> String {
    let labels: Vec<String> = match value {
        None => Vec::new(),
        Some(v) => v
            .values()
            .into_iter()
            .map(|raw| answer_label(options, raw))
            .filter(|l| !l.trim().is_empty())
            .collect(),
    };
    if labels.is_empty() {
        NO_ANSWER.to_string()
    } else {
        labels.join(", ")
    }
}
