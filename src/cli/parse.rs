//! CLI parse: clap types for pokesync. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pokesync CLI - frame processor for optimistic client mutations
#[derive(Parser)]
#[command(name = "pokesync")]
#[command(about = "Apply queued client mutations in frames and compute client pokes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable logging
    #[arg(long)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show store version, pending queue and client cursors
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Enqueue mutations from a JSON array file ("-" reads stdin)
    Push {
        file: PathBuf,
    },
    /// Process one frame over the pending queue
    Process {
        /// Window start in ms (default: end minus frame.window_ms)
        #[arg(long)]
        start: Option<u64>,
        /// Window end in ms, exclusive (default: now)
        #[arg(long)]
        end: Option<u64>,
        /// Connected client to poke (repeatable)
        #[arg(long = "client")]
        clients: Vec<String>,
    },
    /// Process frames continuously until interrupted
    Run {
        /// Connected client to poke (repeatable)
        #[arg(long = "client")]
        clients: Vec<String>,
        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,
    },
    /// Print the full committed state for a client
    Pull {
        client: String,
    },
    /// Print one committed value
    Get {
        key: String,
    },
}
