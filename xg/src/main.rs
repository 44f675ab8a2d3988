//! ExerciseGen - AI exercise-generation workflow
//!
//! CLI entry point: start sessions, answer clarifications, approve plans,
//! and watch generation complete.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use exercisegen::cli::{Cli, Command, OutputFormat};
use exercisegen::config::Config;
use exercisegen::domain::{ClarificationAnswer, IdResolver, Plan, SessionStatus};
use exercisegen::llm::create_client;
use exercisegen::scheduler::{run_worker, stage_channel};
use exercisegen::state::StateManager;
use exercisegen::workflow::{SessionProjection, WorkflowEngine};
use exercisegen::access::AllowAll;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("exercisegen")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_log_level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("exercisegen.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!("main: dispatching command");
    match cli.command {
        Command::Run {
            prompt,
            document,
            owner,
            model,
            yes,
        } => cmd_run(&config, &prompt, &document, &owner, model.as_deref(), yes).await,
        Command::Show { session, format } => cmd_show(&config, &session, format).await,
        Command::Sessions { status, format } => cmd_sessions(&config, status, format).await,
    }
}

/// Spawn the StateManager over the configured store directory
fn open_state(config: &Config) -> Result<StateManager> {
    let store_path = PathBuf::from(&config.storage.store_dir);
    if !store_path.exists() {
        debug!(?store_path, "open_state: creating store directory");
        fs::create_dir_all(&store_path).context("Failed to create store directory")?;
    }
    StateManager::spawn(&store_path).context("Failed to spawn StateManager")
}

/// Start a session and drive it interactively to a terminal state
async fn cmd_run(
    config: &Config,
    prompt: &str,
    document: &str,
    owner: &str,
    model: Option<&str>,
    auto_approve: bool,
) -> Result<()> {
    debug!(%prompt, %document, %owner, auto_approve, "cmd_run: called");
    config.validate()?;

    let state = open_state(config)?;
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let (scheduler, rx) = stage_channel();

    let engine = Arc::new(WorkflowEngine::new(
        state.clone(),
        llm,
        Arc::new(scheduler),
        Arc::new(AllowAll),
        config.clone(),
    ));
    let worker = tokio::spawn(run_worker(rx, engine.clone()));

    let session = engine.start_session(document, owner, prompt, model).await?;
    println!("Session {}", session.id.bold());
    println!("  Prompt: {}", prompt);
    println!();

    let mut last_status = None;
    let result = loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let projection = engine.get_session(&session.id, owner).await?;
        let status = projection.session.status;

        if last_status != Some(status) {
            debug!(%status, "cmd_run: status changed");
            println!("{} {}", "status:".dimmed(), colorize_status(status));
            last_status = Some(status);
        }

        match status {
            SessionStatus::Validating | SessionStatus::Planning | SessionStatus::Generating => {}
            SessionStatus::AwaitingClarification => {
                let answers = collect_answers(&projection)?;
                engine.answer_clarifications(&session.id, answers).await?;
                last_status = None;
            }
            SessionStatus::AwaitingApproval => {
                let Some(plan) = projection.session.plan.as_ref() else {
                    break Err(eyre::eyre!("Session awaiting approval without a plan"));
                };
                print_plan(plan);

                if auto_approve || confirm("Approve this plan and start generation?")? {
                    engine.approve_plan(&session.id).await?;
                    last_status = None;
                } else {
                    println!();
                    println!("Plan left unapproved. Resume later with:");
                    println!("  xg show {}", session.id);
                    break Ok(());
                }
            }
            SessionStatus::Completed => {
                print_results(&projection);
                break Ok(());
            }
            SessionStatus::Failed => {
                let message = projection
                    .session
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string());
                println!();
                println!("{} {}", "✗ Session failed:".red().bold(), message);
                worker.abort();
                std::process::exit(1);
            }
        }
    };

    worker.abort();
    state.shutdown().await.ok();
    result
}

/// Print clarification questions and read answers from stdin
fn collect_answers(projection: &SessionProjection) -> Result<Vec<ClarificationAnswer>> {
    let questions = projection
        .validation_result
        .as_ref()
        .map(|r| r.questions.clone())
        .unwrap_or_default();

    println!();
    println!("{}", "The request needs clarification:".yellow().bold());

    let mut answers = Vec::new();
    for question in &questions {
        let answer = prompt_line(&format!("  {} ", question.question.bold()))?;
        answers.push(ClarificationAnswer {
            question: question.question.clone(),
            answer,
        });
    }

    if answers.is_empty() {
        // Defensive fallback: the stage asked for clarification without
        // concrete questions
        let answer = prompt_line("  Anything to add about the request? ")?;
        answers.push(ClarificationAnswer {
            question: "Anything to add about the request?".to_string(),
            answer,
        });
    }

    Ok(answers)
}

fn print_plan(plan: &Plan) {
    println!();
    println!("{}", "Proposed plan".bold().underline());
    for item in &plan.items {
        println!(
            "  {} {} ({}, ~{} min)",
            item.id.dimmed(),
            item.title.bold(),
            item.exercise_type,
            item.estimated_minutes
        );
        println!("      {}", item.description);
    }
    if !plan.objectives.is_empty() {
        println!("  Objectives: {}", plan.objectives.join("; "));
    }
    println!("  Total: ~{} minutes", plan.total_minutes);
    println!("  Rationale: {}", plan.rationale);
    println!();
}

fn print_results(projection: &SessionProjection) {
    println!();
    let Some(result) = projection.generation_result.as_ref() else {
        println!("{}", "Session completed with no generation output".yellow());
        return;
    };

    println!(
        "{} {} exercise(s) generated, {} token(s) used",
        "✓".green().bold(),
        result.total_generated,
        projection.session.tokens_used
    );
    for exercise in &result.exercises {
        println!("  {} {} ({})", "✓".green(), exercise.title, exercise.exercise_type);
    }
    for error in &result.errors {
        println!("  {} {}: {}", "✗".red(), error.plan_item_id, error.message);
    }
}

/// Resolve a partial session reference and show the projection
async fn cmd_show(config: &Config, reference: &str, format: OutputFormat) -> Result<()> {
    debug!(%reference, %format, "cmd_show: called");
    let state = open_state(config)?;

    let session_id = resolve_session(&state, reference).await?;
    let (session, steps) = state.snapshot(&session_id).await?;
    let projection = SessionProjection::assemble(session, steps);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&projection)?);
        }
        OutputFormat::Text => {
            let session = &projection.session;
            println!("{}", session.id.bold());
            println!("  Status:  {}", colorize_status(session.status));
            println!("  Prompt:  {}", session.initial_prompt);
            println!("  Model:   {}", session.model);
            println!("  Tokens:  {}", session.tokens_used);
            if let Some(message) = &session.error_message {
                println!("  Error:   {}", message.red());
            }
            if let Some(requirements) = &session.requirements {
                println!(
                    "  Requirements: {} / {} / {}",
                    requirements.language.as_deref().unwrap_or("?"),
                    requirements.level.as_deref().unwrap_or("?"),
                    requirements.topic.as_deref().unwrap_or("?")
                );
            }
            if let Some(plan) = &projection.plan_result {
                print_plan(plan);
            }
            if projection.generation_result.is_some() {
                print_results(&projection);
            }
            println!();
            println!("  Steps:");
            for step in &projection.steps {
                println!(
                    "    {} {} [{}] {} tokens",
                    step.id.dimmed(),
                    step.step_type,
                    step.status,
                    step.tokens_used
                );
            }
        }
    }

    state.shutdown().await.ok();
    Ok(())
}

/// List sessions, optionally filtered by status
async fn cmd_sessions(config: &Config, status: Option<String>, format: OutputFormat) -> Result<()> {
    debug!(?status, %format, "cmd_sessions: called");
    let state = open_state(config)?;

    let sessions = state.list_sessions(status.clone(), None).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!(
                    "No sessions found{}",
                    status.map(|s| format!(" with status '{}'", s)).unwrap_or_default()
                );
            } else {
                println!("{:<48} {:<22} {:>8}  {}", "ID", "STATUS", "TOKENS", "PROMPT");
                println!("{}", "-".repeat(100));
                for session in sessions {
                    let prompt: String = session.initial_prompt.chars().take(40).collect();
                    println!(
                        "{:<48} {:<22} {:>8}  {}",
                        session.id,
                        session.status.to_string(),
                        session.tokens_used,
                        prompt
                    );
                }
            }
        }
    }

    state.shutdown().await.ok();
    Ok(())
}

/// Resolve a session reference (full id, hex prefix, or slug fragment)
async fn resolve_session(state: &StateManager, reference: &str) -> Result<String> {
    let sessions = state.list_sessions(None, None).await?;
    let ids: Vec<String> = sessions.into_iter().map(|s| s.id).collect();

    match IdResolver::new(&ids).resolve(reference) {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(eyre::eyre!("No session matches '{}'", reference)),
        Err(candidates) => {
            eprintln!("Ambiguous reference '{}', candidates:", reference);
            for candidate in &candidates {
                eprintln!("  {}", candidate);
            }
            Err(eyre::eyre!("Ambiguous session reference '{}'", reference))
        }
    }
}

fn colorize_status(status: SessionStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        SessionStatus::Completed => text.green(),
        SessionStatus::Failed => text.red(),
        SessionStatus::AwaitingClarification | SessionStatus::AwaitingApproval => text.yellow(),
        _ => text.cyan(),
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt_line(&format!("{} [y/N] ", question))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}
