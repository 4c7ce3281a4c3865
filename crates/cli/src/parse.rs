//! ArgMatches → CliAction conversion.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::ArgMatches;
use walletrace::{Balance, LockPolicy};

use crate::format::OutputMode;

/// Starting balance of the in-memory record when `--initial` is absent.
pub const DEFAULT_INITIAL_BALANCE: Balance = 100.0;

/// Where the `run` command gets its store
#[derive(Debug, Clone, PartialEq)]
pub enum Store {
    /// Dgraph, as configured
    Dgraph,
    /// In-memory record seeded with this balance
    Memory {
        /// Starting balance
        initial: Balance,
    },
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    /// Debug logging
    pub verbose: bool,
    /// What to do
    pub action: CliAction,
}

/// A subcommand with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum CliAction {
    /// Run the scenario
    Run {
        /// Policy override
        policy: Option<LockPolicy>,
        /// Store to run against
        store: Store,
        /// Report format
        output: OutputMode,
    },
    /// Seed the record
    Seed {
        /// Balance to store
        balance: Balance,
    },
}

/// Translate clap's matches into an [`Invocation`].
pub fn matches_to_invocation(matches: &ArgMatches) -> Result<Invocation> {
    let config = matches.get_one::<String>("config").map(PathBuf::from);
    let verbose = matches.get_flag("verbose");

    let action = match matches.subcommand() {
        Some(("run", sub)) => {
            let policy = sub
                .get_one::<String>("policy")
                .map(|raw| raw.parse::<LockPolicy>())
                .transpose()?;
            let store = if sub.get_flag("memory") {
                Store::Memory {
                    initial: sub
                        .get_one::<f64>("initial")
                        .copied()
                        .unwrap_or(DEFAULT_INITIAL_BALANCE),
                }
            } else {
                Store::Dgraph
            };
            let output = if sub.get_flag("json") {
                OutputMode::Json
            } else {
                OutputMode::Human
            };
            CliAction::Run {
                policy,
                store,
                output,
            }
        }
        Some(("seed", sub)) => {
            let balance = sub
                .get_one::<f64>("balance")
                .copied()
                .ok_or_else(|| anyhow!("seed requires --balance"))?;
            CliAction::Seed { balance }
        }
        Some((other, _)) => return Err(anyhow!("unknown command {:?}", other)),
        None => return Err(anyhow!("no command given")),
    };

    Ok(Invocation {
        config,
        verbose,
        action,
    })
}
