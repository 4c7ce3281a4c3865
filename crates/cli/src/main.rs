//! walletrace CLI: run the lost-update scenario against Dgraph or memory.
//!
//! - `walletrace run`: both participants, report printed, exit 0
//! - `walletrace seed --balance N`: create or overwrite the record
//!
//! Any failure prints the wrapped error and exits with status 1.

mod commands;
mod format;
mod parse;

use std::process;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use walletrace::{Backend, Config, ScenarioConfig};

use commands::build_cli;
use format::{format_error, format_report};
use parse::{matches_to_invocation, CliAction, Invocation, Store};

fn main() {
    let matches = build_cli().get_matches();

    let invocation = match matches_to_invocation(&matches) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{}", format_error(&e));
            process::exit(1);
        }
    };

    init_logging(invocation.verbose);

    if let Err(e) = execute(&invocation) {
        eprintln!("{}", format_error(&e));
        process::exit(1);
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`, or `debug` with
/// `--verbose`).
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(invocation: &Invocation) -> Result<()> {
    match &invocation.action {
        CliAction::Run {
            policy,
            store,
            output,
        } => {
            let (backend, settings) = match store {
                Store::Memory { initial } => {
                    // A config file is optional here; only its scenario section matters
                    let settings = match &invocation.config {
                        Some(path) => Config::load(Some(path.as_path()))?.scenario,
                        None => ScenarioConfig::default(),
                    };
                    let backend = Backend::memory_seeded(&settings.alias, *initial);
                    (backend, settings)
                }
                Store::Dgraph => {
                    let config = Config::load(invocation.config.as_deref())?;
                    (Backend::from_config(&config), config.scenario)
                }
            };

            let policy = policy.unwrap_or(settings.policy);
            let report = backend
                .run_with_policy(&settings, policy)
                .with_context(|| format!("Unable to run scenario against {}", backend.endpoint()))?;
            println!("{}", format_report(&report, *output));
            Ok(())
        }
        CliAction::Seed { balance } => {
            let config = Config::load(invocation.config.as_deref())?;
            let backend = Backend::from_config(&config);
            backend
                .seed(&config.scenario.alias, *balance)
                .with_context(|| format!("Unable to seed {}", config.scenario.alias))?;
            println!("Seeded {} with balance {}", config.scenario.alias, balance);
            Ok(())
        }
    }
}
