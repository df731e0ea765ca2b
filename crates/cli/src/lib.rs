pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "courier",
    about = "Courier operator CLI",
    long_about = "Inspect configuration, check registry, bus and database readiness, and manage the employee directory used by the agents.",
    after_help = "Examples:\n  courier doctor --json\n  courier config\n  courier schemas\n  courier seed --path config/fixtures/employee_directory.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, schema registry, delivery channel, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List bundled record schemas with their subjects and validate them locally")]
    Schemas,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load an employee directory seed file into the configured database")]
    Seed {
        #[arg(long, help = "Seed file (defaults to config/fixtures/employee_directory.json)")]
        path: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Schemas => commands::schemas::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed { path } => commands::seed::run(path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
