//! Mastery gate
//!
//! Decides whether the quiz is still required for a lesson and whether a
//! retake is offered, from the learner's mastery and the lesson's minimum.

use serde::{Deserialize, Serialize};

/// Normalize a score to 0..100.
///
/// Backend payloads mix conventions: values above 1 are taken as already
/// being percentages, anything else is a 0..1 fraction. A score of exactly
/// 1.0 therefore reads as 100%.
pub fn to_percent(value: Option<f64>) -> Option<f64> {
    let value = value.filter(|v| v.is_finite())?;
    let raw = if value > 1.0 { value } else { value * 100.0 };
    Some(raw.clamp(0.0, 100.0))
}

/// Lesson minimum as a whole percentage.
pub fn threshold_percent(min_mastery: Option<f64>) -> Option<f64> {
    to_percent(min_mastery).map(f64::round)
}

/// Colour band used for mastery chips and attempt scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBand {
    High,
    Medium,
    Low,
}

impl ScoreBand {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 80.0 {
            ScoreBand::High
        } else if percent >= 50.0 {
            ScoreBand::Medium
        } else {
            ScoreBand::Low
        }
    }
}

/// Primary action offered next to the lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SidebarAction {
    StartQuiz,
    NextLesson { lesson_id: String },
    Retake { enabled: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MasteryGate {
    pub mastery_percent: Option<f64>,
    pub min_percent: Option<f64>,
}

impl MasteryGate {
    /// Build from raw backend values (fractions or percentages).
    pub fn new(mastery: Option<f64>, min_mastery: Option<f64>) -> Self {
        Self {
            mastery_percent: to_percent(mastery),
            min_percent: threshold_percent(min_mastery),
        }
    }

    fn compare(&self) -> Option<std::cmp::Ordering> {
        let mastery = self.mastery_percent?;
        let min = self.min_percent?;
        mastery.partial_cmp(&min)
    }

    /// Mastery already exceeds the minimum, so the quiz step is not shown.
    pub fn quiz_hidden(&self) -> bool {
        self.compare() == Some(std::cmp::Ordering::Greater)
    }

    pub fn needs_retake(&self) -> bool {
        self.compare() == Some(std::cmp::Ordering::Less)
    }

    pub fn can_retake(&self) -> bool {
        self.needs_retake()
    }

    /// Pick the sidebar action. `None` when the quiz is hidden and there is
    /// no lesson to move on to.
    pub fn sidebar_action(&self, attempts: usize, next_lesson: Option<&str>) -> Option<SidebarAction> {
        let next = next_lesson.map(|id| SidebarAction::NextLesson {
            lesson_id: id.to_string(),
        });
        if self.quiz_hidden() {
            return next;
        }
        if attempts == 0 {
            return Some(SidebarAction::StartQuiz);
        }
        if !self.needs_retake() {
            if let Some(next) = next {
                return Some(next);
            }
        }
        Some(SidebarAction::Retake {
            enabled: self.can_retake(),
        })
    }

    /// Whether the below-threshold warning should be shown.
    pub fn show_retake_warning(&self, attempts: usize) -> bool {
        self.needs_retake() && attempts > 0
    }
}
