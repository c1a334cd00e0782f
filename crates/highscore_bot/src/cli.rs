//! Command-line interface for highscore_bot.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use highscore_bot::ScorePolicy;

/// High score bot - tracks the best result of every player of the web game
#[derive(Parser, Debug)]
#[command(name = "highscore_bot")]
#[command(about = "Chat bot that tracks per-player high scores", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the TOML configuration file (optional)
    #[arg(short, long, default_value = "highscore_bot.toml")]
    pub config: PathBuf,

    /// Override the database path from the configuration
    #[arg(long)]
    pub db_path: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the webhook server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the score policy
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Print the stored record of a player
    Show {
        /// Player id
        id: i64,
    },
}

/// Score policy as a command-line value.
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum PolicyArg {
    /// Latest score replaces the stored one
    Overwrite,
    /// Only higher scores are stored
    KeepHighest,
}

impl From<PolicyArg> for ScorePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Overwrite => ScorePolicy::Overwrite,
            PolicyArg::KeepHighest => ScorePolicy::KeepHighest,
        }
    }
}
