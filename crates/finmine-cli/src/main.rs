//! Finmine CLI - Financial entity and anomaly mining
//!
//! Usage:
//!   finmine analyze --file a.txt b.txt   Extract, link and flag documents
//!   finmine ingest --csv tx.csv          Detect bursts and large transfers
//!   finmine feedback --text ...          Learn from corrections
//!   finmine report                       Learning performance

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Reports go to stdout; keep logs on stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    let session = commands::Session::new(cli.data_dir.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { file, year } => commands::cmd_analyze(&session, &file, year).await,
        Commands::Ingest { csv } => commands::cmd_ingest(&session, &csv),
        Commands::Feedback {
            text,
            original,
            corrected,
            processing_time,
        } => commands::cmd_feedback(&session, &text, &original, &corrected, processing_time),
        Commands::Report { json } => commands::cmd_report(&session, json),
        Commands::Patterns { entity_type, all } => {
            commands::cmd_patterns(&session, entity_type.as_deref(), all)
        }
        Commands::ParseTime { text } => commands::cmd_parse_time(&text),
    }
}
