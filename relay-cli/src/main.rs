//! Relay: platform-to-platform change propagation.
//!
//! # Usage
//!
//! ```text
//! relay init --host <domain> --sync-token <token> [--force]
//! relay platform list [--json]
//! relay platform add <name> --domain <domain> --token <token>
//! relay platform broadcast
//! relay sync-config list [--json]
//! relay sync-config add --source <id> --entity <type> --target <id>
//! relay sign <file> --platform-token <token> [--sync-token <token>]
//! relay serve
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    init::InitArgs, platform::PlatformCommand, sign::SignArgs, sync_config::SyncConfigCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "relay",
    version,
    about = "Propagate entity changes between independently deployed platforms",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.relay/config.yaml and a starter schema.
    Init(InitArgs),

    /// Manage the platform catalog.
    Platform {
        #[command(subcommand)]
        command: PlatformCommand,
    },

    /// Manage sync configuration rows.
    SyncConfig {
        #[command(subcommand)]
        command: SyncConfigCommand,
    },

    /// Print the webhook signature of a request body.
    Sign(SignArgs),

    /// Run the job runtime and webhook listener in the foreground.
    Serve,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Platform { command } => commands::platform::run(command),
        Commands::SyncConfig { command } => commands::sync_config::run(command),
        Commands::Sign(args) => args.run(),
        Commands::Serve => commands::serve::run(),
    }
}
