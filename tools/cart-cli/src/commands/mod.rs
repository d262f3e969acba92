//! CLI command implementations.

pub mod config;
pub mod replay;

use clap::{Args, Subcommand};

/// Arguments for the replay command.
#[derive(Args)]
pub struct ReplayArgs {
    /// Script file: a fixture plus the steps to send.
    pub script: String,

    /// Stop at the first failed step.
    #[arg(long)]
    pub fail_fast: bool,

    /// Print response headers for each step.
    #[arg(long)]
    pub headers: bool,

    /// Run the cart sweeper and cache reaper while replaying.
    #[arg(long)]
    pub background: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}
