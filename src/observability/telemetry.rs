//! Telemetry & Observability
//!
//! Structured logging for the lesson flow:
//! - Step transition events
//! - Request spans with timing and outcome
//! - Configurable log levels via RUST_LOG
//! - Log sanitization and credential redaction

use regex::Regex;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing from RUST_LOG. Without RUST_LOG nothing is installed,
/// which keeps CLI output clean.
pub fn init_tracing() {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        init_tracing_with_filter(&filter);
    }
}

/// Initialize tracing for verbose mode
pub fn init_tracing_verbose() {
    init_tracing_with_filter("lessonflow=debug,info")
}

/// Initialize with custom filter string
pub fn init_tracing_with_filter(filter: &str) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_level(true)
            .compact()
            .with_writer(std::io::stderr);

        let filter_layer = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// Escape control characters so backend-provided text cannot forge log lines.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"(?i)Bearer\s+[A-Za-z0-9_\-\.=]{8,}",
            r"(?i)(access_token|refresh_token|token)\s*[=:]\s*[A-Za-z0-9_\-\.]{8,}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Redact bearer tokens and token assignments before logging.
pub fn redact_secrets(input: &str) -> String {
    let mut result = input.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}

/// Record a lesson step transition
pub fn record_step_transition(lesson_id: &str, from: &str, to: &str) {
    info!(
        lesson_id = sanitize_for_log(lesson_id).as_str(),
        from = from,
        to = to,
        "Lesson step transition"
    );
}

/// Run one backend request inside a span that records its duration and outcome.
pub async fn track_request<F, Fut, T, E>(operation: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let span = info_span!(
        "backend.request",
        operation = operation,
        duration_ms = tracing::field::Empty,
        success = tracing::field::Empty,
    );

    let result = f().await;
    let duration = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration);
    match &result {
        Ok(_) => {
            span.record("success", true);
            tracing::debug!(parent: &span, duration_ms = duration, "Request completed");
        }
        Err(e) => {
            span.record("success", false);
            let safe_err = redact_secrets(&sanitize_for_log(&e.to_string()));
            warn!(parent: &span, duration_ms = duration, error = safe_err.as_str(), "Request failed");
        }
    }
    result
}

#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
