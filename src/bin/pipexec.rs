// src/bin/pipexec.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use pipexec::{
    CancellationToken, ErrorPolicy, ExecutionError,
    cli::Cli,
    core::config_loader,
    exec,
    system::{shell::ProcessEnv, signals},
};
use std::fs;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// The main entry point of the `pipexec` application.
/// It sets up logging, parses arguments, runs the command,
/// and performs centralized error handling.
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));

    match run_cli(cli, &cancellation_token) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // --- Centralized Error Handling ---
            // An interruption (Ctrl+C / SIGTERM) exits silently with the shell's convention.
            if let Some(ExecutionError::Interrupted { .. }) = e.downcast_ref::<ExecutionError>() {
                std::process::exit(130);
            }
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Loads configuration, runs the command and writes its output.
/// Returns the exit code this process should terminate with.
fn run_cli(cli: Cli, cancellation_token: &CancellationToken) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);

    let mut config = config_loader::load_config(cli.config.as_deref(), &ProcessEnv)?;
    if let Some(shell) = &cli.shell {
        config.shell = Some(shell.clone());
    }
    if cli.sentinel {
        config.error_policy = ErrorPolicy::Sentinel;
    }

    let command = cli
        .command_line()
        .context("The command contains characters that cannot be quoted")?;
    let input = read_input(&cli)?;

    let signal_ids = signals::register_termination_signals(cancellation_token)
        .context("Could not install signal handlers")?;
    let result = exec(&command, &input, &config, cancellation_token);
    signals::unregister(signal_ids);

    let Some(outcome) = result? else {
        eprintln!("{}", "pipexec: the command could not be run.".yellow());
        return Ok(1);
    };

    match outcome.output {
        Some(output) => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
            log::debug!("Command {}", outcome.exit);
            Ok(outcome.exit.process_exit_code())
        }
        None => Err(ExecutionError::Interrupted { pid: outcome.pid }.into()),
    }
}

fn read_input(cli: &Cli) -> Result<Vec<u8>> {
    if cli.no_input {
        return Ok(Vec::new());
    }
    match &cli.input {
        Some(path) => fs::read(path)
            .with_context(|| format!("Could not read input file '{}'", path.display())),
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .context("Could not read standard input")?;
            Ok(buf)
        }
    }
}
