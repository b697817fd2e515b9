pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "sitescope",
    about = "SiteScope operator CLI",
    long_about = "Operate the scoping service: migrations, demo catalog, config inspection, readiness checks, and offline recommendation previews.",
    after_help = "Examples:\n  sitescope doctor --json\n  sitescope seed\n  sitescope recommend --module pos --equipment terminal=1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog (POS, payment terminal, barcode scanner)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity, schema version and catalog")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Preview recommendations, validation and costs for a selection")]
    Recommend {
        #[arg(long = "module", value_name = "ID", help = "Capability module to select")]
        modules: Vec<String>,
        #[arg(
            long = "equipment",
            value_name = "ID=QTY",
            help = "Equipment item and quantity to select"
        )]
        equipment: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Recommend { modules, equipment } => commands::recommend::run(&modules, &equipment),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
