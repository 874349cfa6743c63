//! Question review for a graded attempt
//!
//! Builds one row per grading detail, pairing it with the question it
//! grades and the learner's answer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::answers::{format_answer_text, QuizAnswerSet, QuizSheet, NO_ANSWER};
use crate::api::types::QuizAttempt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Correct,
    Partial,
    Incorrect,
}

impl Verdict {
    /// Classify a 0..1 score.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Verdict::Correct
        } else if score >= 0.5 {
            Verdict::Partial
        } else {
            Verdict::Incorrect
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewFilter {
    #[default]
    All,
    Correct,
    Partial,
    Incorrect,
}

impl ReviewFilter {
    pub fn matches(&self, verdict: Verdict) -> bool {
        match self {
            ReviewFilter::All => true,
            ReviewFilter::Correct => verdict == Verdict::Correct,
            ReviewFilter::Partial => verdict == Verdict::Partial,
            ReviewFilter::Incorrect => verdict == Verdict::Incorrect,
        }
    }
}

impl std::str::FromStr for ReviewFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ReviewFilter::All),
            "correct" => Ok(ReviewFilter::Correct),
            "partial" => Ok(ReviewFilter::Partial),
            "incorrect" => Ok(ReviewFilter::Incorrect),
            other => Err(format!("unknown review filter '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionReview {
    pub key: String,
    pub index: usize,
    pub question: String,
    pub answer: String,
    pub verdict: Verdict,
    pub verdict_label: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub total: usize,
    pub correct: usize,
    pub partial: usize,
    pub incorrect: usize,
}

static METRIC_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn metric_pattern() -> Option<&'static Regex> {
    METRIC_PATTERN
        .get_or_init(|| {
            Regex::new(r"\b(emb|literal|tokens|keywords|context)\s*=\s*[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?")
                .ok()
        })
        .as_ref()
}

/// Remove grader scoring noise such as `emb=0.82` or `tokens=12` from text.
pub fn strip_metrics(input: &str) -> String {
    let stripped = match metric_pattern() {
        Some(re) => re.replace_all(input, "").into_owned(),
        None => input.to_string(),
    };
    let mut out = collapse_spaces(&remove_empty_parens(&collapse_spaces(&stripped)))
        .trim()
        .to_string();
    while out.contains(",,") || out.contains(", ,") {
        out = out.replace(", ,", ",").replace(",,", ",");
    }
    let out = out.trim();
    let out = out.strip_suffix(',').unwrap_or(out).trim_end();
    let out = out.strip_prefix(',').unwrap_or(out).trim_start();
    out.trim().to_string()
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut run = 0usize;
    for c in s.chars() {
        if c.is_whitespace() {
            run += 1;
            continue;
        }
        if run > 0 {
            out.push(' ');
        }
        run = 0;
        out.push(c);
    }
    if run > 0 {
        out.push(' ');
    }
    out
}

fn remove_empty_parens(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '(' {
            let mut j = i + 1;
            // Parentheses left holding only separators count as empty.
            while j < chars.len() && (chars[j].is_whitespace() || chars[j] == ',') {
                j += 1;
            }
            if j < chars.len() && chars[j] == ')' {
                i = j + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Review rows for `attempt`.
///
/// Details are matched to questions by `questionId`, then by position.
/// The grader's echoed options win over the locally known answer.
pub fn build_reviews(
    attempt: &QuizAttempt,
    sheet: Option<&QuizSheet>,
    answers: &QuizAnswerSet,
) -> Vec<QuestionReview> {
    attempt
        .details
        .iter()
        .enumerate()
        .map(|(index, detail)| {
            let question = sheet.and_then(|s| s.find_for_detail(&detail.question_id, index));
            let echoed = attempt.content.get(index);

            let question_text = question
                .map(|q| q.question.prompt.trim())
                .filter(|t| !t.is_empty())
                .or_else(|| question.map(|q| q.question.quiz.trim()).filter(|t| !t.is_empty()))
                .or_else(|| echoed.map(|c| c.question.trim()).filter(|t| !t.is_empty()))
                .map(String::from)
                .unwrap_or_else(|| format!("Question {}", index + 1));

            let echoed_options: Vec<&str> = echoed
                .map(|c| c.options.iter().map(String::as_str).collect())
                .unwrap_or_default();
            let raw_answer = if !echoed_options.is_empty() {
                echoed_options.join(", ")
            } else if let Some(q) = question {
                format_answer_text(q.options(), answers.get(&q.key))
            } else {
                NO_ANSWER.to_string()
            };
            let answer = strip_metrics(&raw_answer);

            let key = Some(detail.question_id.trim())
                .filter(|k| !k.is_empty())
                .map(String::from)
                .unwrap_or_else(|| index.to_string());

            QuestionReview {
                key,
                index,
                question: question_text,
                answer: if answer.is_empty() {
                    NO_ANSWER.to_string()
                } else {
                    answer
                },
                verdict: Verdict::from_score(detail.score),
                verdict_label: format!("{}%", (detail.score * 100.0).round()),
                explanation: strip_metrics(&detail.explanation),
            }
        })
        .collect()
}

pub fn summarize(reviews: &[QuestionReview]) -> ReviewSummary {
    let count = |v: Verdict| reviews.iter().filter(|r| r.verdict == v).count();
    ReviewSummary {
        total: reviews.len(),
        correct: count(Verdict::Correct),
        partial: count(Verdict::Partial),
        incorrect: count(Verdict::Incorrect),
    }
}

pub fn filter_reviews(reviews: &[QuestionReview], filter: ReviewFilter) -> Vec<QuestionReview> {
    reviews
        .iter()
        .filter(|r| filter.matches(r.verdict))
        .cloned()
        .collect()
}
