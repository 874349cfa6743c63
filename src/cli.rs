//! Lessonflow command line
//!
//! Each invocation opens one lesson, performs one action and prints the
//! resulting view as text or JSON.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::api::{ApiClient, LearningBackend};
use crate::config::Config;
use crate::errors::{ApiError, FlowError, LessonflowError};
use crate::lesson::answers::NO_ANSWER;
use crate::lesson::results::Verdict;
use crate::lesson::view::ContentStatus;
use crate::lesson::{
    AnswerValue, FlowStep, LessonContext, LessonFlow, QuestionKind, ReviewFilter, ScoreBand,
    SidebarAction,
};
use crate::observability::telemetry::{init_tracing, init_tracing_verbose};
use crate::storage::{FileStore, LocalState, ThemeMode};

#[derive(Parser)]
#[command(name = "lessonflow")]
#[command(about = "Work through generated lessons, quizzes and results")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Student to act as (overrides config and LESSONFLOW_STUDENT_ID)
    #[arg(long, global = true)]
    student: Option<String>,

    /// Local state file (theme, saved steps, answer snapshots)
    #[arg(long, value_name = "FILE", global = true)]
    state_file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Args, Debug, Clone)]
struct LessonArgs {
    /// Course id
    #[arg(long)]
    course: String,

    /// Lesson id
    #[arg(long)]
    lesson: String,

    /// Lesson the student came from
    #[arg(long)]
    previous: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum RetryTarget {
    Lesson,
    Quiz,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ThemeAction {
    Light,
    Dark,
    Toggle,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a lesson and show its content
    #[command(alias = "o")]
    Open {
        #[command(flatten)]
        lesson: LessonArgs,
    },

    /// Start or resume the quiz and show its questions
    #[command(alias = "q")]
    Quiz {
        #[command(flatten)]
        lesson: LessonArgs,
    },

    /// Answer the quiz and submit it for grading
    Submit {
        #[command(flatten)]
        lesson: LessonArgs,

        /// Answers as KEY=VALUE; multi-select values are comma separated
        #[arg(short, long = "answer", value_name = "KEY=VALUE")]
        answers: Vec<String>,
    },

    /// Show graded attempts
    #[command(alias = "r")]
    Results {
        #[command(flatten)]
        lesson: LessonArgs,

        /// Attempt to show (defaults to the newest)
        #[arg(long)]
        attempt: Option<String>,

        /// Only show questions with this verdict: all, correct, partial, incorrect
        #[arg(long, default_value = "all")]
        filter: ReviewFilter,
    },

    /// Regenerate the quiz and start another attempt
    Retake {
        #[command(flatten)]
        lesson: LessonArgs,
    },

    /// Ask the backend to generate lesson content or the quiz again
    Retry {
        #[command(flatten)]
        lesson: LessonArgs,

        #[arg(value_enum)]
        target: RetryTarget,
    },

    /// Move to a step: content, quiz or results
    Step {
        #[command(flatten)]
        lesson: LessonArgs,

        step: FlowStep,
    },

    /// Show or change the color theme preference
    Theme {
        #[arg(value_enum)]
        action: Option<ThemeAction>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        init_tracing_verbose();
    } else {
        init_tracing();
    }
    if cli.no_color || std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;
    let state_path = cli
        .state_file
        .clone()
        .unwrap_or_else(|| config.storage.resolved_state_file());
    let store = FileStore::open(&state_path)
        .with_context(|| format!("Failed to open local state at {}", state_path.display()))?;
    let local = LocalState::new(Arc::new(store));

    if let Commands::Theme { action } = &cli.command {
        return theme_command(&local, *action, cli.format);
    }

    let student_id = cli
        .student
        .clone()
        .or_else(|| config.student_id.clone())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            LessonflowError::Config(
                "No student id; pass --student or set LESSONFLOW_STUDENT_ID".into(),
            )
        })?;
    let backend: Arc<dyn LearningBackend> = Arc::new(ApiClient::new(&config)?);
    let session = Session {
        backend,
        local,
        config,
        student_id,
        format: cli.format,
    };

    match cli.command {
        Commands::Open { lesson } => {
            let flow = session.open(&lesson).await?;
            session.show_current(&flow, ReviewFilter::All)
        }
        Commands::Quiz { lesson } => {
            let mut flow = session.open(&lesson).await?;
            if flow.lesson_view().status != ContentStatus::Ready {
                return session.show_lesson(&flow);
            }
            keep_failed_generation(flow.start_quiz().await)?;
            session.show_quiz(&flow)
        }
        Commands::Submit { lesson, answers } => {
            let parsed = parse_answers(&answers)?;
            let mut flow = session.open(&lesson).await?;
            if flow.lesson_view().status != ContentStatus::Ready {
                session.show_lesson(&flow)?;
                return Err(LessonflowError::from(FlowError::LessonNotReady).into());
            }
            if flow.step() != FlowStep::Quiz || flow.quiz_needs_load() {
                if let Err(e) = flow.start_quiz().await {
                    if is_generation_failure(&e) {
                        session.show_quiz(&flow)?;
                    }
                    return Err(e.into());
                }
            }
            for (key, value) in &parsed {
                flow.set_answer(key, value)?;
            }
            let submitted = flow.submit().await;
            if let Err(e) = submitted {
                session.show_quiz(&flow)?;
                return Err(e.into());
            }
            session.show_results(&flow, ReviewFilter::All)
        }
        Commands::Results {
            lesson,
            attempt,
            filter,
        } => {
            let mut flow = session.open(&lesson).await?;
            if !flow.has_attempts() {
                bail!("No graded attempts for this lesson yet");
            }
            flow.navigate_to(FlowStep::Results).await?;
            if let Some(id) = attempt {
                flow.select_attempt(&id)?;
            }
            session.show_results(&flow, filter)
        }
        Commands::Retake { lesson } => {
            let mut flow = session.open(&lesson).await?;
            flow.retake().await?;
            session.show_quiz(&flow)
        }
        Commands::Retry { lesson, target } => {
            let mut flow = session.new_flow(&lesson);
            // A failed generation is exactly what retry is for.
            if let Err(e) = flow.open().await {
                if matches!(e, LessonflowError::Api(ApiError::Unauthorized)) {
                    return Err(e.into());
                }
                debug!(error = %e, "Lesson opened with errors; retrying generation");
            }
            match target {
                RetryTarget::Lesson => {
                    flow.retry_lesson_generation().await?;
                    session.show_lesson(&flow)
                }
                RetryTarget::Quiz => {
                    flow.retry_quiz_generation().await?;
                    session.show_quiz(&flow)
                }
            }
        }
        Commands::Step { lesson, step } => {
            let mut flow = session.open(&lesson).await?;
            flow.navigate_to(step).await?;
            session.show_current(&flow, ReviewFilter::All)
        }
        Commands::Theme { .. } => Ok(()),
    }
}

fn is_generation_failure(e: &LessonflowError) -> bool {
    matches!(e, LessonflowError::Flow(FlowError::GenerationFailed { .. }))
}

/// Swallow a failed generation; the failed state is left on the flow for rendering.
fn keep_failed_generation(result: crate::Result<()>) -> crate::Result<()> {
    match result {
        Err(e) if is_generation_failure(&e) => {
            debug!(error = %e, "Showing failed generation");
            Ok(())
        }
        other => other,
    }
}

/// Split `KEY=VALUE` answer arguments.
fn parse_answers(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("Answer '{}' is not in KEY=VALUE form", entry))?;
            let key = key.trim();
            if key.is_empty() {
                bail!("Answer '{}' has an empty question key", entry);
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn theme_command(local: &LocalState, action: Option<ThemeAction>, format: OutputFormat) -> Result<()> {
    let mode = match action {
        None => local.theme(),
        Some(ThemeAction::Light) => ThemeMode::Light,
        Some(ThemeAction::Dark) => ThemeMode::Dark,
        Some(ThemeAction::Toggle) => local.theme().toggled(),
    };
    if action.is_some() {
        local.set_theme(mode);
    }
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "theme": mode.as_str() })),
        OutputFormat::Text => {
            println!("Theme: {}", mode.as_str().bold());
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct Session {
    backend: Arc<dyn LearningBackend>,
    local: LocalState,
    config: Config,
    student_id: String,
    format: OutputFormat,
}

impl Session {
    fn new_flow(&self, lesson: &LessonArgs) -> LessonFlow {
        let mut context = LessonContext::new(&self.student_id, &lesson.course, &lesson.lesson);
        if let Some(previous) = &lesson.previous {
            context = context.with_previous_lesson(previous);
        }
        let flow = LessonFlow::new(
            Arc::clone(&self.backend),
            self.local.clone(),
            self.config.polling.clone(),
            context,
        );

        // Ctrl-C stops any generation poll; the last observed state is shown.
        let cancel = flow.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
        flow
    }

    /// Open the lesson. A failed generation still yields the flow so its
    /// view can offer a retry.
    async fn open(&self, lesson: &LessonArgs) -> Result<LessonFlow> {
        let mut flow = self.new_flow(lesson);
        keep_failed_generation(flow.open().await)?;
        Ok(flow)
    }

    fn show_current(&self, flow: &LessonFlow, filter: ReviewFilter) -> Result<()> {
        match flow.step() {
            FlowStep::Content => self.show_lesson(flow),
            FlowStep::Quiz => self.show_quiz(flow),
            FlowStep::Results => self.show_results(flow, filter),
        }
    }

    fn show_lesson(&self, flow: &LessonFlow) -> Result<()> {
        let view = flow.lesson_view();
        if self.format == OutputFormat::Json {
            return print_json(&serde_json::json!({
                "steps": flow.step_header(),
                "lesson": view,
                "sidebar": flow.sidebar(),
            }));
        }

        print_header(flow);
        println!("{}\n", view.title.bold());
        match view.status {
            ContentStatus::Ready => {
                for section in &view.sections {
                    if !section.title.trim().is_empty() {
                        println!("{}", section.title.bold().underline());
                    }
                    println!("{}\n", section.content.trim());
                    for example in &section.examples {
                        println!("  {} {}", "example:".dimmed(), example.trim());
                    }
                }
            }
            ContentStatus::Generating => {
                println!("{}", "Preparing this lesson. Run the command again shortly.".yellow());
            }
            ContentStatus::Failed => {
                println!(
                    "{}",
                    "Lesson generation failed. Run `lessonflow retry lesson` to try again.".red()
                );
            }
            ContentStatus::Missing => {}
        }
        if let Some(error) = &view.error {
            println!("{}", error.red());
        }
        print_sidebar(flow);
        Ok(())
    }

    fn show_quiz(&self, flow: &LessonFlow) -> Result<()> {
        let view = flow.quiz_view();
        if self.format == OutputFormat::Json {
            return print_json(&serde_json::json!({
                "steps": flow.step_header(),
                "quiz": view,
                "sidebar": flow.sidebar(),
            }));
        }

        print_header(flow);
        match view.status {
            ContentStatus::Generating => {
                println!("{}", "The quiz is still being generated.".yellow());
            }
            ContentStatus::Failed => {
                println!(
                    "{}",
                    "Quiz generation failed. Run `lessonflow retry quiz` to try again.".red()
                );
            }
            ContentStatus::Ready | ContentStatus::Missing => {}
        }
        for question in &view.questions {
            println!("{} {}", format!("{}.", question.number).bold(), question.text);
            println!("   {}", format!("key: {}", question.key).dimmed());
            for option in &question.options {
                let chosen = question.answer.as_ref().is_some_and(|a| {
                    a.values()
                        .iter()
                        .any(|v| v.eq_ignore_ascii_case(&option.value) || v.eq_ignore_ascii_case(&option.letter))
                });
                let marker = if chosen { "●" } else { "○" };
                println!("   {} {}) {}", marker, option.letter, option.label);
            }
            match (&question.answer, question.kind) {
                (Some(AnswerValue::Text(text)), QuestionKind::Short | QuestionKind::Open) => {
                    println!("   {} {}", "answer:".dimmed(), text);
                }
                _ => {}
            }
            if question.invalid {
                let hint = match question.kind {
                    QuestionKind::Short => "Short answers must be a single word",
                    _ => "Answer is too long",
                };
                println!("   {}", hint.red());
            }
            println!();
        }
        if view.total > 0 {
            println!(
                "{} answered, {} remaining{}",
                view.total - view.unanswered,
                view.unanswered,
                if view.invalid > 0 {
                    format!(", {} invalid", view.invalid)
                } else {
                    String::new()
                }
            );
        }
        if let Some(error) = view.error.as_ref().or(view.submit_error.as_ref()) {
            println!("{}", error.red());
        }
        Ok(())
    }

    fn show_results(&self, flow: &LessonFlow, filter: ReviewFilter) -> Result<()> {
        let Some(view) = flow.results_view(filter) else {
            bail!("No graded attempts for this lesson yet");
        };
        if self.format == OutputFormat::Json {
            return print_json(&serde_json::json!({
                "steps": flow.step_header(),
                "results": view,
                "sidebar": flow.sidebar(),
            }));
        }

        print_header(flow);
        let score = view
            .score_percent
            .map(|s| paint_band(&format!("{:.0}%", s), view.band))
            .unwrap_or_else(|| NO_ANSWER.to_string());
        println!("{} {}", "Score:".bold(), score);
        println!(
            "{} correct, {} partial, {} incorrect\n",
            view.summary.correct, view.summary.partial, view.summary.incorrect
        );

        for review in &view.reviews {
            let verdict = match review.verdict {
                Verdict::Correct => review.verdict_label.green(),
                Verdict::Partial => review.verdict_label.yellow(),
                Verdict::Incorrect => review.verdict_label.red(),
            };
            println!("{} {} [{}]", format!("{}.", review.index + 1).bold(), review.question, verdict);
            println!("   {} {}", "answer:".dimmed(), review.answer);
            if !review.explanation.is_empty() {
                println!("   {}", review.explanation.italic());
            }
        }

        if view.attempts.len() > 1 {
            println!("\n{}", "Attempts".bold());
            for entry in &view.attempts {
                let marker = if entry.selected { "▸" } else { " " };
                let score = entry
                    .score_percent
                    .map(|s| paint_band(&format!("{:.0}%", s), entry.band))
                    .unwrap_or_else(|| NO_ANSWER.to_string());
                println!("{} {} {} {}", marker, entry.label, score, entry.id.dimmed());
            }
        }
        print_sidebar(flow);
        Ok(())
    }
}

fn paint_band(text: &str, band: Option<ScoreBand>) -> String {
    match band {
        Some(ScoreBand::High) => text.green().to_string(),
        Some(ScoreBand::Medium) => text.yellow().to_string(),
        Some(ScoreBand::Low) => text.red().to_string(),
        None => text.to_string(),
    }
}

fn print_header(flow: &LessonFlow) {
    let items: Vec<String> = flow
        .step_header()
        .iter()
        .map(|item| {
            let mark = if item.completed { "✓ " } else { "" };
            let text = format!("{}{}", mark, item.label);
            if item.active {
                format!("[{}]", text).bold().to_string()
            } else if item.enabled {
                text
            } else {
                text.dimmed().to_string()
            }
        })
        .collect();
    println!("{}\n", items.join("  ›  "));
}

fn print_sidebar(flow: &LessonFlow) {
    let sidebar = flow.sidebar();
    println!();
    if let Some(mastery) = sidebar.mastery_percent {
        let min = sidebar
            .min_percent
            .map(|m| format!(" (minimum {:.0}%)", m))
            .unwrap_or_default();
        println!(
            "{} {}{}",
            "Mastery:".bold(),
            paint_band(&format!("{:.0}%", mastery), sidebar.mastery_band),
            min
        );
    }
    if sidebar.retake_warning {
        println!(
            "{}",
            "Your mastery is below the lesson minimum. Retake the quiz to continue.".yellow()
        );
    }
    match &sidebar.action {
        Some(SidebarAction::StartQuiz) => println!("Next: {}", "lessonflow quiz".bold()),
        Some(SidebarAction::NextLesson { lesson_id }) => {
            println!("Next: {} {}", "lesson".bold(), lesson_id)
        }
        Some(SidebarAction::Retake { enabled: true }) => {
            println!("Next: {}", "lessonflow retake".bold())
        }
        Some(SidebarAction::Retake { enabled: false }) => {
            println!("{}", "Retake unavailable".dimmed())
        }
        None => {}
    }
}
