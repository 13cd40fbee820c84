//! CLI argument definitions using clap
//!
//! This module contains the clap structs for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Finmine - Mine entities, transfers and anomalies from financial documents
#[derive(Parser)]
#[command(name = "finmine")]
#[command(about = "Adaptive entity and anomaly mining for financial text", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory holding learned patterns and feedback history
    ///
    /// Defaults to the platform data directory (~/.local/share/finmine on Linux).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Engine config file (overrides the one in the data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract entities and transfers from text files and report anomalies
    Analyze {
        /// Text files to analyze (one document each)
        #[arg(short, long, required = true, num_args = 1..)]
        file: Vec<PathBuf>,

        /// Year assumed for dates written without one
        #[arg(long)]
        year: Option<i32>,
    },

    /// Load transaction rows from CSV and run suspicious-pattern detection
    Ingest {
        /// CSV file with account_id, amount, timestamp columns
        #[arg(long)]
        csv: PathBuf,
    },

    /// Learn from a corrected entity list
    Feedback {
        /// Text file the entities were extracted from
        #[arg(long)]
        text: PathBuf,

        /// JSON list of the entities the engine produced
        #[arg(long)]
        original: PathBuf,

        /// JSON list of the corrected entities
        #[arg(long)]
        corrected: PathBuf,

        /// Seconds the original extraction took
        #[arg(long, default_value = "0")]
        processing_time: f64,
    },

    /// Show learning performance over recent feedback
    Report {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List learned patterns
    Patterns {
        /// Only patterns for this entity type (e.g. ACCOUNT, MONEY)
        #[arg(short, long)]
        entity_type: Option<String>,

        /// Include patterns below the promotion threshold
        #[arg(long)]
        all: bool,
    },

    /// Parse a date/time string the way documents are parsed
    ParseTime {
        /// Text to parse (e.g. "2024年3月5日", "05/03/2024 14:30")
        text: String,
    },
}
