// Path: crates/aex-cli/src/main.rs
//! The AEX operator CLI: run the gateway, audit the ledger, and manage
//! agent identities. Grounded in `ioi-cli`'s `Cli`/`Commands` dispatch
//! pattern.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(name = "aex", version, about = "The AEX governance gateway operator CLI.")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the HTTP gateway.
    Serve(commands::serve::ServeArgs),

    /// Replays the hash chain and reconciles ledger spend against stored balances.
    Audit(commands::audit::AuditArgs),

    /// Create, list, and manage agent identities.
    Agent(commands::agent::AgentArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Audit(args) => commands::audit::run(args).await,
        Commands::Agent(args) => commands::agent::run(args).await,
    }
}
