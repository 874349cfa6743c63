//! Generation polling
//!
//! Lesson content and quizzes are generated asynchronously by the backend.
//! The poller re-fetches a resource at a fixed interval until its status
//! leaves GENERATING or the wall-clock budget runs out. Running out of
//! budget is not an error: the caller keeps the last observed state.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::api::types::{GenerationStatus, Generated};
use crate::config::PollingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub budget: Duration,
    /// Wait one interval before the first fetch (used right after a start request).
    pub initial_delay: bool,
}

impl PollSettings {
    pub fn quiz(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            budget: config.quiz_budget(),
            initial_delay: false,
        }
    }

    pub fn lesson(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            budget: config.lesson_budget(),
            initial_delay: false,
        }
    }

    pub fn with_initial_delay(mut self) -> Self {
        self.initial_delay = true;
        self
    }
}

/// How a poll run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T, E> {
    /// Reached a terminal, non-failed status.
    Finished(T),
    /// Reached FAILED.
    Failed(T),
    /// Still generating when the budget ran out.
    TimedOut(Option<T>),
    /// The owning view went away.
    Cancelled(Option<T>),
    /// A fetch failed; polling stops.
    Errored { last: Option<T>, error: E },
}

impl<T, E> PollOutcome<T, E> {
    /// The most recent payload observed, if any.
    pub fn latest(&self) -> Option<&T> {
        match self {
            PollOutcome::Finished(v) | PollOutcome::Failed(v) => Some(v),
            PollOutcome::TimedOut(v) | PollOutcome::Cancelled(v) => v.as_ref(),
            PollOutcome::Errored { last, .. } => last.as_ref(),
        }
    }

    pub fn into_latest(self) -> Option<T> {
        match self {
            PollOutcome::Finished(v) | PollOutcome::Failed(v) => Some(v),
            PollOutcome::TimedOut(v) | PollOutcome::Cancelled(v) => v,
            PollOutcome::Errored { last, .. } => last,
        }
    }
}

/// Cloneable cancellation signal shared between a view and its pollers.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// One-shot marker per resource key. A second acquire for the same key fails
/// until the key changes or the holder releases it after a failed start.
#[derive(Debug, Default)]
pub struct StartGuard {
    state: Mutex<Option<(String, bool)>>,
}

impl StartGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: &str) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        match state.as_mut() {
            Some((current, fired)) if current == key => {
                if *fired {
                    false
                } else {
                    *fired = true;
                    true
                }
            }
            _ => {
                *state = Some((key.to_string(), true));
                true
            }
        }
    }

    pub fn release(&self, key: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some((current, fired)) = state.as_mut() {
                if current == key {
                    *fired = false;
                }
            }
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.state
            .lock()
            .map(|s| matches!(s.as_ref(), Some((k, true)) if k == key))
            .unwrap_or(false)
    }

    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = None;
        }
    }
}

/// Poll `fetch` until the resource leaves GENERATING.
///
/// `first` is an already fetched payload; when absent the first fetch
/// happens immediately (or after one interval with `initial_delay`).
pub async fn poll_generation<T, E, F, Fut>(
    first: Option<T>,
    settings: PollSettings,
    cancel: &CancelToken,
    mut fetch: F,
) -> PollOutcome<T, E>
where
    T: Generated,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let mut polls = 0u32;

    let mut current = match first {
        Some(value) => value,
        None => {
            if settings.initial_delay {
                tokio::select! {
                    _ = cancel.cancelled() => return PollOutcome::Cancelled(None),
                    _ = tokio::time::sleep(settings.interval) => {}
                }
            }
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled(None),
                result = fetch() => result,
            };
            polls += 1;
            match fetched {
                Ok(value) => value,
                Err(error) => return PollOutcome::Errored { last: None, error },
            }
        }
    };

    loop {
        match current.generation_status() {
            GenerationStatus::Generating => {}
            GenerationStatus::Failed => {
                debug!(polls, "Generation failed");
                return PollOutcome::Failed(current);
            }
            GenerationStatus::Finished | GenerationStatus::Unknown => {
                debug!(polls, "Generation finished");
                return PollOutcome::Finished(current);
            }
        }

        if cancel.is_cancelled() {
            return PollOutcome::Cancelled(Some(current));
        }
        if started.elapsed() >= settings.budget {
            debug!(polls, "Generation still running after poll budget");
            return PollOutcome::TimedOut(Some(current));
        }

        tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled(Some(current)),
            _ = tokio::time::sleep(settings.interval) => {}
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled(Some(current)),
            result = fetch() => result,
        };
        polls += 1;
        match fetched {
            Ok(value) => current = value,
            Err(error) => {
                return PollOutcome::Errored {
                    last: Some(current),
                    error,
                }
            }
        }
    }
}
