//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - Document analysis (extract, link, flag)
//! - `core` - Shared session state and the time-parser debugging command
//! - `feedback` - Learning commands (feedback, report)
//! - `ingest` - CSV transaction ingestion and suspicious-pattern detection
//! - `patterns` - Learned pattern listing

pub mod analyze;
pub mod core;
pub mod feedback;
pub mod ingest;
pub mod patterns;

// Re-export command functions for main.rs
pub use analyze::*;
pub use core::*;
pub use feedback::*;
pub use ingest::*;
pub use patterns::*;

/// Truncate a string to a maximum number of chars, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
