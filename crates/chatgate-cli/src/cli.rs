//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Grace delay in seconds before simulated sessions self-authenticate
    #[arg(long)]
    pub grace: Option<u64>,

    /// Default QR wait timeout in seconds
    #[arg(long)]
    pub qr_timeout: Option<u64>,

    /// Fixed delay in seconds before reconnecting after a dropped connection
    #[arg(long)]
    pub reconnect: Option<u64>,

    /// Inbound messages retained per session
    #[arg(long)]
    pub ring_capacity: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive command mode (for testing/automation)
    Interactive,
    /// Show transport capabilities and session counts
    Info,
    /// Walk sessions through their full lifecycle and print the result
    Demo {
        /// Number of sessions to run
        #[arg(short, long, default_value_t = 1)]
        sessions: usize,
    },
}
