//! daywise - reschedule your day and keep the calendar in sync
//!
//! Usage:
//!   daywise show                     Print the stored schedule
//!   daywise reschedule <PROMPT...>   Ask the model to plan around a disruption
//!   daywise sync                     Rebuild today's calendar from the stored schedule
//!   daywise set <FILE>               Replace the stored schedule from a JSON file
//!   daywise config                   Show the effective configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daywise_core::{AppError, Config, ConfigError, ValidationResult};
use daywise_schedule::repair_schedule;
use daywise_services::{RescheduleError, RescheduleOrchestrator, RescheduleRequest, ScheduleContext};

#[derive(Parser)]
#[command(name = "daywise", version, about = "Reschedule your day and keep the calendar in sync")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored schedule as JSON
    Show,
    /// Describe what came up; the day is replanned around it
    Reschedule {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Rebuild today's calendar from the stored schedule
    Sync,
    /// Replace the stored schedule with the entries in FILE
    Set { file: PathBuf },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = daywise_core::init() {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("{}", describe(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Config = cli.command {
        // Shown even when invalid, so the problems can be read next to the values.
        let config = Config::load_at(cli.config.as_deref())?;
        let validation = config.validate();
        let path = match cli.config.as_deref() {
            Some(path) => path.to_path_buf(),
            None => Config::config_path()?,
        };
        print!("{}", config_report(&config, &path, &validation));
        if !validation.is_valid() {
            return Err(AppError::Config(ConfigError::Invalid(validation.error_summary())).into());
        }
        return Ok(());
    }

    let (config, _validation) = Config::load_validated(cli.config.as_deref())?;
    let orchestrator = RescheduleOrchestrator::new(ScheduleContext::from_config(&config)?);

    match cli.command {
        Command::Show => {
            let schedule = orchestrator.current_schedule().await?;
            println!("{}", serde_json::to_string_pretty(&schedule)?);
        }
        Command::Reschedule { prompt } => {
            let request = RescheduleRequest {
                prompt: prompt.join(" "),
            };
            let ack = orchestrator.handle(&request).await?;
            println!("{}", ack.message);
        }
        Command::Sync => {
            let report = orchestrator.sync_today().await?;
            println!("Calendar synced: {}", report.summary());
            for skipped in &report.skipped {
                println!("  skipped '{}' ({}): {}", skipped.name, skipped.time, skipped.reason);
            }
        }
        Command::Set { file } => {
            let text = std::fs::read_to_string(&file)
                .map_err(AppError::Io)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let schedule = repair_schedule(&text)
                .with_context(|| format!("{} does not hold a usable schedule", file.display()))?;
            let outcome = orchestrator
                .replace_schedule_on(orchestrator.today(), schedule)
                .await?;
            println!("{}", outcome.acknowledgment().message);
        }
        Command::Config => {}
    }

    Ok(())
}

/// Effective settings followed by every validation error and warning.
/// Secrets are reported only as set or not set.
fn config_report(config: &Config, path: &Path, validation: &ValidationResult) -> String {
    let set = |present: bool| if present { "set" } else { "not set" };

    let mut lines = vec![
        format!("Config file:    {}", path.display()),
        format!("Database:       {}", config.store.database_path.display()),
        format!("Document:       {}", config.store.document_id),
        format!("Model:          {} at {}", config.model.model, config.model.base_url),
        format!("Model API key:  {}", set(config.model.resolved_api_key().is_some())),
        format!("Calendar:       {} at {}", config.calendar.calendar_id, config.calendar.base_url),
        format!("Calendar token: {}", set(config.calendar.resolved_access_token().is_some())),
        format!("Timezone:       {}", config.calendar.timezone),
    ];
    lines.extend(validation.errors.iter().map(|e| format!("error: {}", e)));
    lines.extend(validation.warnings.iter().map(|w| format!("warning: {}", w)));

    let mut report = lines.join("\n");
    report.push('\n');
    report
}

/// The user-facing line for a failed command.
fn describe(error: &anyhow::Error) -> String {
    if let Some(e) = error.downcast_ref::<RescheduleError>() {
        return e.user_message();
    }
    if let Some(e) = error.downcast_ref::<AppError>() {
        return format!("{} ({})", e.user_message(), error);
    }
    if let Some(e) = error.downcast_ref::<ConfigError>() {
        return format!("{} ({})", e.user_message(), e);
    }
    format!("{error:#}")
}
