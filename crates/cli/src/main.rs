use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use cli::{MigrateCommand, PlanCommand, SuggestCommand, VerifyCommand};
use common::{init_structured_logging, LoggingConfig, MigrationConfig};

#[derive(Parser)]
#[command(name = "posmigrate")]
#[command(about = "Migrate POS exports into an e-commerce store")]
#[command(version)]
struct Cli {
    /// YAML configuration file; POSMIGRATE_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the export schema and propose field mappings
    Suggest(SuggestCommand),
    /// Show the stages, strategy and estimate for a migration
    Plan(PlanCommand),
    /// Execute a migration and print the analytics report
    Migrate(MigrateCommand),
    /// Compare expected records with migrated ones
    Verify(VerifyCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_structured_logging(LoggingConfig::cli(cli.verbose, cli.json_logs))?;
    let config = MigrationConfig::load(cli.config.as_deref())?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Suggest(cmd) => cmd.execute(&config).await,
        Commands::Plan(cmd) => cmd.execute(&config).await,
        Commands::Migrate(cmd) => cmd.execute(&config).await,
        Commands::Verify(cmd) => cmd.execute(&config).await,
    }
}
