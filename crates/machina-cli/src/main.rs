//! Machina operator CLI
//!
//! Inspect the machine registry, check balances and run the payment flow
//! against a configured network.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "machina")]
#[command(about = "Machina - pay-per-use machine payments on peaq", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override a config value, e.g. `--set payment.mode=token_approval`
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every machine in the registry
    Machines,

    /// Show one machine
    Machine {
        /// Machine id, numeric or `<prefix>-<digits>`
        id: String,
    },

    /// Show native and payment-token balances of an account
    Balance { address: alloy_primitives::Address },

    /// Pay for and use a machine
    Use {
        id: String,

        /// Paying account; defaults to the node's first account
        #[arg(long)]
        user: Option<alloy_primitives::Address>,

        /// Notification feed file
        #[arg(long)]
        notifications: Option<PathBuf>,
    },

    /// List saved notifications
    Notifications {
        #[arg(long)]
        notifications: Option<PathBuf>,

        /// Mark every notification as read afterwards
        #[arg(long)]
        mark_read: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Notifications need no network configuration.
    let config = || {
        machina_core::MachinaConfig::load_with_overrides(cli.config.as_deref(), &cli.overrides)
    };

    match cli.command {
        Commands::Machines => commands::machines(&config()?).await?,
        Commands::Machine { id } => commands::machine(&config()?, &id).await?,
        Commands::Balance { address } => commands::balance(&config()?, address).await?,
        Commands::Use {
            id,
            user,
            notifications,
        } => commands::use_machine(&config()?, &id, user, notifications).await?,
        Commands::Notifications {
            notifications,
            mark_read,
        } => commands::notifications(notifications, mark_read).await?,
        Commands::Config => commands::show_config(&config()?)?,
    }

    Ok(())
}
