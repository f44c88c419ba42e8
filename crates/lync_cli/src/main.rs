//! Lync CLI
//!
//! Command-line tools for inspecting and maintaining the event queue and
//! fetch cache a Lync terminal keeps on disk.
//!
//! # Commands
//!
//! - `inspect` - Display queue statistics and cached queries
//! - `dump-queue` - Dump queued events for debugging
//! - `compact` - Remove delivered (and optionally abandoned) events

mod commands;

use clap::{Parser, Subcommand};
use lync_sync_engine::{DEFAULT_CACHE_NAMESPACE, DEFAULT_QUEUE_KEY};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lync command-line maintenance tools.
#[derive(Parser)]
#[command(name = "lync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Storage key of the event queue
    #[arg(global = true, long, default_value = DEFAULT_QUEUE_KEY)]
    queue_key: String,

    /// Key prefix of the fetch cache
    #[arg(global = true, long, default_value = DEFAULT_CACHE_NAMESPACE)]
    cache_namespace: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display queue statistics and cached queries
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump queued events for debugging
    DumpQueue {
        /// Maximum number of events to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only show events with this status (pending, synced, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove delivered events from the queue
    Compact {
        /// Also remove abandoned events
        #[arg(short, long)]
        include_failed: bool,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = |command: &str| -> Result<commands::StoreLocation, String> {
        let path = cli
            .path
            .clone()
            .ok_or_else(|| format!("Store path required for {command}"))?;
        Ok(commands::StoreLocation {
            path,
            queue_key: cli.queue_key.clone(),
            cache_namespace: cli.cache_namespace.clone(),
        })
    };

    match &cli.command {
        Commands::Inspect { format } => {
            commands::inspect::run(&store("inspect")?, format)?;
        }
        Commands::DumpQueue {
            limit,
            status,
            format,
        } => {
            commands::dump_queue::run(&store("dump-queue")?, *limit, status.as_deref(), format)?;
        }
        Commands::Compact {
            include_failed,
            dry_run,
        } => {
            commands::compact::run(&store("compact")?, *include_failed, *dry_run)?;
        }
        Commands::Version => {
            println!("Lync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
