#[macro_use]
extern crate log;

use clap::{App, AppSettings, Arg, SubCommand};
use env_logger::{Builder, Target};
use log::LevelFilter;
use num_enum::TryFromPrimitive;
use openvote::*;

mod command_keygen;
mod command_run;
mod command_simulate;
mod command_status;
mod rest;

pub use command_keygen::*;
pub use command_run::*;
pub use command_simulate::*;
pub use command_status::*;
pub use rest::*;

#[derive(TryFromPrimitive, PartialEq, Copy, Clone)]
#[repr(u8)]
enum Verbosity {
    Warn = 0,
    Info = 1,
    Debug = 2,
}

impl Verbosity {
    fn level(self) -> LevelFilter {
        match self {
            Verbosity::Warn => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = App::new("OpenVote CLI")
        .version("0.1")
        .author("Patrick Hayes <patrick.d.hayes@gmail.com>")
        .about("Runs self-tallying Open Vote Network elections")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("url")
                .long("url")
                .takes_value(true)
                .help("Set the ledger gateway url - can also be set with OPENVOTE_URI"),
        )
        .arg(
            Arg::with_name("vote-addr")
                .long("vote-addr")
                .takes_value(true)
                .help("Address of the voting contract - can also be set with OPENVOTE_CONTRACT"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run a complete election against the ledger gateway")
                .arg(
                    Arg::with_name("KEYS")
                        .index(1)
                        .required(true)
                        .help("Account key file (accountKeys.json)"),
                )
                .arg(
                    Arg::with_name("CONFIG")
                        .index(2)
                        .required(true)
                        .help("Election config file"),
                ),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Run a complete election against an in-memory ledger")
                .arg(
                    Arg::with_name("voters")
                        .long("voters")
                        .takes_value(true)
                        .default_value("5")
                        .help("Number of voters"),
                )
                .arg(
                    Arg::with_name("no-votes")
                        .long("no-votes")
                        .takes_value(true)
                        .default_value("1")
                        .help("How many voters vote no"),
                )
                .arg(
                    Arg::with_name("delegations")
                        .long("delegations")
                        .takes_value(true)
                        .default_value("0")
                        .help("How many voters delegate their vote"),
                )
                .arg(
                    Arg::with_name("phase-gap")
                        .long("phase-gap")
                        .takes_value(true)
                        .default_value("5")
                        .help("Seconds between ledger deadlines"),
                ),
        )
        .subcommand(SubCommand::with_name("keygen").about("Generate a new account credential"))
        .subcommand(
            SubCommand::with_name("status").about("Show the ledger's phase and progress counters"),
        )
        .get_matches();

    let verbosity = Verbosity::try_from_primitive(matches.occurrences_of("v").min(2) as u8)
        .unwrap_or(Verbosity::Debug);

    // RUST_LOG wins over -v
    let mut builder = Builder::new();
    builder
        .filter_level(verbosity.level())
        .parse_default_env()
        .target(Target::Stderr);
    builder.init();

    let env_uri = std::env::var("OPENVOTE_URI");
    let uri = match matches.value_of("url") {
        Some(uri) => uri,
        None => env_uri.as_deref().unwrap_or("http://localhost:8545"),
    };
    let env_contract = std::env::var("OPENVOTE_CONTRACT");
    let contract = match matches.value_of("vote-addr") {
        Some(contract) => Some(contract),
        None => env_contract.as_deref().ok(),
    };
    debug!("ledger gateway: {}", uri);

    // Subcommands
    match matches.subcommand() {
        ("run", Some(matches)) => command_run(matches, uri, contract).await,
        ("simulate", Some(matches)) => command_simulate(matches).await,
        ("keygen", Some(matches)) => command_keygen(matches),
        ("status", Some(matches)) => command_status(matches, uri, contract).await,
        _ => fail("cli", "unknown subcommand"),
    }
}

/// Expand `~` and environment variables in a path argument
pub fn expand(filename: &str) -> String {
    match shellexpand::full(filename) {
        Ok(expanded) => expanded.into_owned(),
        Err(_) => filename.to_owned(),
    }
}

/// Print an error for `command` and exit non-zero
pub fn fail(command: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("openvote {}: {}", command, err);
    std::process::exit(1);
}

pub fn require_contract<'a>(command: &str, contract: Option<&'a str>) -> &'a str {
    contract.unwrap_or_else(|| {
        fail(
            command,
            "provide the contract address with --vote-addr or OPENVOTE_CONTRACT",
        )
    })
}

/// Print a run's per-phase reports and outcome
pub fn print_summary(summary: &RunSummary) {
    for report in summary.reports.iter() {
        println!(
            "{}: {} submitted, {} skipped, {} failed (gas used: {})",
            report.phase,
            report.completed.len(),
            report.skipped.len(),
            report.failures.len(),
            report.cost
        );
        for failure in report.failures.iter() {
            println!("  {}", failure);
        }
    }

    match &summary.outcome {
        Outcome::Tallied(tally) => println!("> Election finished: {}", tally),
        Outcome::Aborted {
            phase,
            cause,
            reset_error,
        } => {
            println!("> Election aborted in {}: {}", phase, cause);
            if let Some(e) = reset_error {
                println!("> Reset failed: {}", e);
            }
        }
    }
}
