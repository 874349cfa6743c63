use serde::Serialize;

use crate::api::types::{Course, CourseLesson};

/// What the course structure says about one lesson.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LessonMeta {
    pub title: Option<String>,
    /// Raw minimum mastery as stored on the course (usually 0..1)
    pub min_mastery: Option<f64>,
    pub next_lesson_id: Option<String>,
    pub previous_lesson_id: Option<String>,
}

/// Lessons in reading order: modules by position, then lessons by position.
pub fn flatten_lessons(course: &Course) -> Vec<&CourseLesson> {
    let mut modules: Vec<_> = course.modules.iter().collect();
    modules.sort_by_key(|m| m.position);
    modules
        .into_iter()
        .flat_map(|m| {
            let mut lessons: Vec<_> = m.lessons.iter().collect();
            lessons.sort_by_key(|l| l.position);
            lessons
        })
        .collect()
}

/// Resolve title, minimum mastery and neighbours. Unknown lessons yield `None`.
pub fn lesson_meta(course: &Course, lesson_id: &str) -> Option<LessonMeta> {
    let ordered = flatten_lessons(course);
    let idx = ordered.iter().position(|l| l.id == lesson_id)?;
    let lesson = ordered[idx];

    Some(LessonMeta {
        title: Some(lesson.title.clone()).filter(|t| !t.trim().is_empty()),
        min_mastery: lesson.min_mastery,
        next_lesson_id: ordered.get(idx + 1).map(|l| l.id.clone()),
        previous_lesson_id: idx
            .checked_sub(1)
            .and_then(|prev| ordered.get(prev))
            .map(|l| l.id.clone()),
    })
}
