//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

#[derive(Debug, Parser)]
#[command(name = "transport", version, about = "Campus transport service")]
pub struct Cli {
    /// Path to the configuration file (defaults to ./transport.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// More output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server.
    Serve,

    /// Create an administrator account.
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            return Verbosity::Quiet;
        }
        match self.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Trace,
        }
    }
}
