//! treesum - content-addressed manifests of file trees
//!
//! Hashes every file under a directory into a line-oriented manifest,
//! reuses digests of unchanged files on later runs, and compares manifests
//! to produce a shell script that replays moves plus a report of duplicate
//! files.

pub mod cli;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::{Cli, Commands, CompareArgs, HashArgs};
use crate::compare::ManifestComparer;
use crate::config::Config;
use crate::engine::{AlgorithmConfirm, ManifestGenerator, RunMode};
use crate::error::ExitCode;
use crate::progress::Progress;
use crate::scanner::Algorithm;

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns the first fatal error; [`ExitCode::from_error`] maps it to an
/// exit status.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let show_progress = !(cli.quiet || cli.no_progress);

    match cli.command {
        Commands::Generate(args) => handle_hash(RunMode::Generate, args, config, show_progress),
        Commands::Append(args) => handle_hash(RunMode::Append, args, config, show_progress),
        Commands::Update(args) => handle_hash(RunMode::Update, args, config, show_progress),
        Commands::Compare(args) => handle_compare(args, &config),
    }
}

fn handle_hash(
    mode: RunMode,
    args: HashArgs,
    mut config: Config,
    show_progress: bool,
) -> anyhow::Result<ExitCode> {
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm.name().to_string();
    }
    if let Some(workers) = args.workers {
        config.workers = Some(usize::try_from(workers).unwrap_or(usize::MAX));
    }
    if let Some(frequency) = args.write_frequency {
        config.write_frequency = usize::try_from(frequency).unwrap_or(usize::MAX);
    }

    let interrupt = signal::install_handler()?;
    let confirm: Arc<dyn AlgorithmConfirm> = if args.yes {
        Arc::new(|_: &str, _: Algorithm| true)
    } else {
        Arc::new(PromptConfirm)
    };
    let mut engine_config = config
        .generate_config(mode)?
        .with_shutdown_flag(interrupt.flag())
        .with_confirm(confirm);
    if show_progress {
        engine_config = engine_config.with_progress_callback(Arc::new(Progress::new(false)));
    }

    let summary = ManifestGenerator::new(engine_config).run(&args.root, &args.hashfile)?;

    if let Ok(json) = serde_json::to_string(&summary) {
        log::debug!("Run summary: {json}");
    }
    if summary.scan_errors > 0 {
        log::warn!("{} paths could not be read during the walk", summary.scan_errors);
    }
    Ok(ExitCode::Success)
}

fn handle_compare(args: CompareArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let script = args
        .script
        .unwrap_or_else(|| PathBuf::from(&config.script_name));
    let mut comparer = ManifestComparer::new(script);
    let stdout = std::io::stdout();
    let summary = comparer.run(&args.hashfile, args.other.as_deref(), stdout.lock())?;

    log::debug!(
        "{} unchanged, {} moves, {} duplicate groups",
        summary.unchanged,
        summary.moves,
        summary.duplicate_groups
    );
    Ok(ExitCode::Success)
}

/// Asks on the terminal before switching a manifest to another algorithm.
/// Declines when stdin is not a terminal.
struct PromptConfirm;

impl AlgorithmConfirm for PromptConfirm {
    fn confirm_switch(&self, previous: &str, requested: Algorithm) -> bool {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            log::warn!("Not a terminal; pass --yes to switch from {previous} to {requested}");
            return false;
        }
        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "Manifest was built with {previous}; switching to {requested} rehashes every file. Continue? [y/N] "
        );
        let _ = stderr.flush();

        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}
