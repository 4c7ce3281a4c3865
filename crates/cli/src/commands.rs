//! Clap command tree.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the `walletrace` command.
pub fn build_cli() -> Command {
    Command::new("walletrace")
        .about("Lost-update race and lock-serialized fix for a shared balance")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("PATH")
                .help("Configuration file (default: config.toml, then config.yaml)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .subcommand(
            Command::new("run")
                .about("Run both participants against the record")
                .arg(
                    Arg::new("policy")
                        .long("policy")
                        .short('p')
                        .value_name("POLICY")
                        .value_parser(["unlocked", "serialized", "v1", "v2"])
                        .help("Concurrency strategy (default: from config, else serialized)"),
                )
                .arg(
                    Arg::new("memory")
                        .long("memory")
                        .action(ArgAction::SetTrue)
                        .help("Use an in-memory store instead of Dgraph"),
                )
                .arg(
                    Arg::new("initial")
                        .long("initial")
                        .value_name("BALANCE")
                        .value_parser(value_parser!(f64))
                        .requires("memory")
                        .help("Starting balance of the in-memory record (default: 100)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("seed")
                .about("Create or overwrite the record with a balance")
                .arg(
                    Arg::new("balance")
                        .long("balance")
                        .short('b')
                        .value_name("BALANCE")
                        .value_parser(value_parser!(f64))
                        .required(true)
                        .help("Balance to store"),
                ),
        )
}
