use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "studykit", about = "Run and inspect browser A/B studies")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which variant a client would be assigned
    Assign(commands::assign::AssignArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Run the study against an in-memory browser
    Simulate(commands::simulate::SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Assign(args) => commands::assign::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Simulate(args) => commands::simulate::run(args).await,
    }
}
