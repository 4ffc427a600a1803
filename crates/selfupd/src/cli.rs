//! Command-line arguments

use clap::{Parser, Subcommand};

/// selfup daemon
#[derive(Parser)]
#[command(name = "selfupd")]
#[command(about = "Checks for, and installs, updates of a wrapper-managed server", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Check once whether an update is available
    Check,

    /// Show changelog entries newer than the running version
    Changes {
        /// Show the whole changelog
        #[arg(long)]
        all: bool,
    },

    /// Never offer this version again
    Ignore {
        /// Version to ignore, e.g. v2.1.0
        version: String,
    },

    /// Download, back up and hand off to the wrapper
    Install {
        /// Install the latest release even if it is not offered as an update
        #[arg(long)]
        force: bool,
    },

    /// Check periodically until SIGINT/SIGTERM
    Watch {
        /// Install offered updates automatically
        #[arg(long)]
        install: bool,
    },
}
