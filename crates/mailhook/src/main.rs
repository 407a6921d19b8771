//! # mailhook
//!
//! Watches an IMAP mailbox and runs local programs when messages match
//! configured rules.
//!
//! Usage:
//!   mailhook                      # history sweep, then poll for new mail
//!   mailhook -m polling           # only poll
//!   mailhook check                # validate config.toml
//!   mailhook preview              # dry-run over the history window
//!   mailhook log                  # show what has fired

mod cli;
mod config;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mailhook_core::{
    ExecutionLog, Invoker, OperatingMode, ProcessRunner, RuleEngine, RuleSet, Scheduler,
};
use mailhook_imap::{FetchMode, ImapMailSource};
use tokio::time;
use tracing::{error, info, warn};

use crate::cli::{Cli, Commands};
use crate::config::{AppConfig, Credentials, relative_to};
use crate::logging::Verbosity;

/// How long a running action may take to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

type MailScheduler = Scheduler<ImapMailSource, ProcessRunner>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = match logging::init(Verbosity::from_flags(cli.debug, cli.quiet), &cli.logfile) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("mailhook: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command() {
        Commands::Run => run(&cli).await,
        Commands::Check => check(&cli),
        Commands::Preview => preview(&cli).await,
        Commands::Log => show_log(&cli).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Loads the configuration and validates the rules.
fn load(cli: &Cli) -> Result<(AppConfig, RuleSet)> {
    let config = AppConfig::load(&cli.config)?;
    let rules = config.rule_set()?;
    Ok((config, rules))
}

fn check(cli: &Cli) -> Result<()> {
    let (config, rules) = load(cli)?;
    let mode = config.run_mode(cli.force_mode.map(Into::into))?;
    config.imap()?;

    println!("{}: {} rule(s), run mode {mode}", cli.config.display(), rules.len());
    for rule in rules.rules() {
        println!(
            "  {:<20} {:<8} {:<12} {:<8} {}",
            rule.name,
            rule.mode.as_str(),
            rule.repeat.as_str(),
            rule.target.as_str(),
            rule.action
        );
    }
    Ok(())
}

async fn show_log(cli: &Cli) -> Result<()> {
    let config = AppConfig::load(&cli.config)?;
    let path = relative_to(&cli.config, &config.general.log_db);
    let log = ExecutionLog::open(&path)
        .await
        .with_context(|| format!("Failed to open execution log {}", path.display()))?;

    let records = log.list().await.context("Failed to read execution log")?;
    if records.is_empty() {
        println!("No actions recorded in {}", path.display());
    }
    for record in records {
        println!(
            "{}  {:<20} {:>4}  {}{}",
            record.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
            record.rule_name,
            record.exit_code,
            record.matched_subject,
            record
                .error_detail
                .map(|detail| format!("  ({detail})"))
                .unwrap_or_default()
        );
    }
    log.close().await;
    Ok(())
}

async fn preview(cli: &Cli) -> Result<()> {
    let (config, rules) = load(cli)?;
    let (scheduler, log) = connect(cli, &config, rules).await?;

    let rows = scheduler.preview_history().await?;
    for row in &rows {
        let rule = match (&row.rule, row.already_fired) {
            (Some(rule), true) => format!("{rule} (already fired)"),
            (Some(rule), false) => rule.clone(),
            (None, _) => "-".to_string(),
        };
        println!("{:>8}  {:<28}  {:<24}  {}", row.uid.get(), row.sender, rule, row.subject);
    }
    let matched = rows.iter().filter(|row| row.rule.is_some()).count();
    println!("{matched} of {} message(s) would trigger a rule", rows.len());

    shutdown(scheduler, &log).await;
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    let (config, rules) = load(cli)?;
    let mode = config.run_mode(cli.force_mode.map(Into::into))?;
    let (scheduler, log) = connect(cli, &config, rules).await?;

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut interrupted = false;

    if mode.admits(OperatingMode::History) {
        let sweep = scheduler.run_history_sweep();
        tokio::pin!(sweep);
        let report = tokio::select! {
            report = &mut sweep => report,
            signal = &mut interrupt => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, finishing the current message");
                interrupted = true;
                scheduler.stop_polling().await;
                sweep.await
            }
        }
        .context("History sweep failed")?;
        info!(
            fetched = report.fetched,
            matched = report.matched,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            interrupted = report.interrupted,
            "History sweep complete"
        );
    }

    if mode.admits(OperatingMode::Polling) && !interrupted {
        let handle = scheduler.start_polling().await?;

        let deadline = async {
            match config.poll_timeout() {
                Some(limit) => time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            signal = &mut interrupt => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, shutting down");
            }
            () = deadline => info!("Poll timeout reached, shutting down"),
        }

        scheduler.stop_polling().await;
        match time::timeout(SHUTDOWN_GRACE, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Polling task ended abnormally: {e}"),
            Err(_) => warn!(
                "Polling task still busy after {}s, exiting anyway",
                SHUTDOWN_GRACE.as_secs()
            ),
        }
    }

    shutdown(scheduler, &log).await;
    Ok(())
}

/// Opens the execution log and the mailbox, and wires up the scheduler.
async fn connect(
    cli: &Cli,
    config: &AppConfig,
    rules: RuleSet,
) -> Result<(Arc<MailScheduler>, Arc<ExecutionLog>)> {
    let credentials = Credentials::load(&cli.config)?;
    let imap = config.imap()?;

    let log_path = relative_to(&cli.config, &config.general.log_db);
    let log = Arc::new(
        ExecutionLog::open(&log_path)
            .await
            .with_context(|| format!("Failed to open execution log {}", log_path.display()))?,
    );

    let fetch_mode = if cli.slow {
        FetchMode::OneByOne
    } else {
        FetchMode::Batch
    };
    let source = ImapMailSource::connect(&imap, &credentials.address, &credentials.password)
        .await
        .with_context(|| format!("Failed to log in to {}:{}", imap.host, imap.port))?
        .with_fetch_mode(fetch_mode);

    let runner = ProcessRunner::new()
        .with_actions_dir(relative_to(&cli.config, &config.general.actions_dir));
    let scheduler = Scheduler::new(
        source,
        RuleEngine::new(rules),
        Invoker::new(Arc::clone(&log), runner),
        config.schedule(),
    );
    Ok((Arc::new(scheduler), log))
}

/// Logs out of the mailbox and closes the execution log.
async fn shutdown(scheduler: Arc<MailScheduler>, log: &ExecutionLog) {
    match Arc::try_unwrap(scheduler) {
        Ok(scheduler) => {
            if let Err(e) = scheduler.into_source().logout().await {
                warn!("Logout failed: {e}");
            }
        }
        Err(_) => warn!("Polling task still holds the session, skipping logout"),
    }
    log.close().await;
    info!("Stopped");
}
