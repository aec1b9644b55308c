//! Command-line interface for boardroom.

use boardroom::{Mode, TableId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Boardroom - turn-based board game tables with undoable history
#[derive(Parser, Debug)]
#[command(name = "boardroom")]
#[command(about = "Turn-based board game tables with undoable history", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a tic-tac-toe table against the computer
    Demo {
        /// User owning the table
        #[arg(long, default_value = "alice")]
        user: String,

        /// Table mode (normal, ranked, practice)
        #[arg(long, default_value = "normal")]
        mode: Mode,

        /// Seed for reproducible games
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print a stored table
    Show {
        /// Table id
        table_id: TableId,
    },

    /// List the tables of a user
    Tables {
        /// User id
        #[arg(long)]
        user: String,

        /// Only tables still in play
        #[arg(long)]
        active: bool,
    },
}
