//! Attempt history
//!
//! Graded attempts are immutable on the backend. The history keeps them
//! newest first, merges in the attempt produced during this session if the
//! attempts endpoint has not caught up yet, and tracks which one is shown.

use serde::Serialize;

use super::answers::QuizAnswerSet;
use super::mastery::{to_percent, ScoreBand};
use crate::api::types::QuizAttempt;
use crate::storage::LocalState;

/// One row of the attempt picker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptEntry {
    pub id: String,
    pub label: String,
    pub score_percent: Option<f64>,
    pub band: Option<ScoreBand>,
    pub created_at: String,
    pub selected: bool,
}

/// Where the answers shown for an attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// In-memory answers of the attempt submitted in this session
    Session,
    /// Local snapshot saved after an earlier submission
    Snapshot,
    /// Nothing stored locally; only the grader's echo is available
    Unavailable,
}

#[derive(Debug, Clone, Default)]
pub struct AttemptHistory {
    attempts: Vec<QuizAttempt>,
    selected: Option<String>,
}

/// Sort newest first. Attempts without a parseable timestamp sort last.
pub fn sort_newest_first(attempts: &mut [QuizAttempt]) {
    attempts.sort_by(|a, b| b.created_at_utc().cmp(&a.created_at_utc()));
}

impl AttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the history with a fresh fetch.
    ///
    /// `session` is the attempt returned by this session's evaluate call; it
    /// is kept even if the list does not contain it yet. `prefer` selects an
    /// attempt explicitly; otherwise the newest one is selected.
    pub fn replace(
        &mut self,
        fetched: Vec<QuizAttempt>,
        session: Option<&QuizAttempt>,
        prefer: Option<&str>,
    ) {
        let mut attempts = fetched;
        if let Some(session) = session {
            if !attempts.iter().any(|a| a.id == session.id) {
                attempts.push(session.clone());
            }
        }
        sort_newest_first(&mut attempts);
        self.attempts = attempts;

        self.selected = prefer
            .filter(|id| self.contains(id))
            .map(String::from)
            .or_else(|| self.latest().map(|a| a.id.clone()));
    }

    /// Add one attempt without a round trip.
    pub fn record(&mut self, attempt: QuizAttempt) {
        let id = attempt.id.clone();
        self.attempts.retain(|a| a.id != id);
        self.attempts.push(attempt);
        sort_newest_first(&mut self.attempts);
        self.selected = Some(id);
    }

    /// Select an attempt by id. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, attempt_id: &str) -> bool {
        if self.contains(attempt_id) {
            self.selected = Some(attempt_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.attempts.clear();
        self.selected = None;
    }

    pub fn contains(&self, attempt_id: &str) -> bool {
        self.attempts.iter().any(|a| a.id == attempt_id)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn attempts(&self) -> &[QuizAttempt] {
        &self.attempts
    }

    pub fn latest(&self) -> Option<&QuizAttempt> {
        self.attempts.first()
    }

    /// The attempt being displayed.
    pub fn selected(&self) -> Option<&QuizAttempt> {
        self.selected
            .as_deref()
            .and_then(|id| self.attempts.iter().find(|a| a.id == id))
            .or_else(|| self.latest())
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected().map(|a| a.id.as_str())
    }

    /// "Attempt N", counting from the oldest as 1, with " (Latest)" on the newest.
    pub fn label(&self, position: usize) -> String {
        let total = self.attempts.len();
        let number = total.saturating_sub(position);
        if position == 0 {
            format!("Attempt {} (Latest)", number)
        } else {
            format!("Attempt {}", number)
        }
    }

    pub fn entries(&self) -> Vec<AttemptEntry> {
        let selected = self.selected_id().map(String::from);
        self.attempts
            .iter()
            .enumerate()
            .map(|(position, attempt)| {
                let score = to_percent(attempt.score_percent);
                AttemptEntry {
                    id: attempt.id.clone(),
                    label: self.label(position),
                    score_percent: score,
                    band: score.map(ScoreBand::from_percent),
                    created_at: attempt.created_at.clone(),
                    selected: selected.as_deref() == Some(attempt.id.as_str()),
                }
            })
            .collect()
    }

    pub fn latest_score_percent(&self) -> Option<f64> {
        self.latest().and_then(|a| to_percent(a.score_percent))
    }
}

/// Answers to show next to the displayed attempt.
///
/// The attempt produced by this session shows the live answer set; any other
/// attempt shows its local snapshot when one was saved.
pub fn answers_for_display(
    displayed: &QuizAttempt,
    session_attempt_id: Option<&str>,
    session_answers: &QuizAnswerSet,
    local: &LocalState,
    student_id: &str,
    fallback_quiz_id: Option<&str>,
) -> (QuizAnswerSet, AnswerSource) {
    if session_attempt_id == Some(displayed.id.as_str()) {
        return (session_answers.clone(), AnswerSource::Session);
    }

    let quiz_id = Some(displayed.quiz_id.as_str())
        .filter(|q| !q.is_empty())
        .or(fallback_quiz_id);
    match quiz_id.and_then(|quiz| local.answers(student_id, quiz, &displayed.id)) {
        Some(snapshot) => (snapshot, AnswerSource::Snapshot),
        None => (QuizAnswerSet::default(), AnswerSource::Unavailable),
    }
}
