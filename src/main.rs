mod cli;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use cli::init::InitArgs;
use cli::list::ListArgs;
use cli::run::RunArgs;
use lobbybot::error::ExitError;
use lobbybot::telemetry;

#[derive(Debug, Parser)]
#[command(
    name = "lobbybot",
    version,
    about = "Relay Warzone 2100 lobby games to an IRC channel"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Connect to IRC, serve commands, and announce lobby changes
    Run(RunArgs),
    /// Query the lobby once and print the hosted games
    List(ListArgs),
    /// Write a default lobbybot.toml
    Init(InitArgs),
    /// Print the JSON Schema for lobbybot.toml
    Schema,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Run(_) => "run",
            Self::List(_) => "list",
            Self::Init(_) => "init",
            Self::Schema => "schema",
        }
    }
}

fn main() -> ExitCode {
    telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Run(args) => args.execute(),
        Commands::List(args) => args.execute(),
        Commands::Init(args) => args.execute(),
        Commands::Schema => cli::schema::run_schema(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
