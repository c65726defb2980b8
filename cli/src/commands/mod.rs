//! Command implementations for the timeline CLI.
//!
//! Each command module provides:
//! - Args struct for clap argument parsing
//! - execute() function that performs the command against a Store
//! - Human-readable and JSON output formatting

pub mod admin;
pub mod follow;
pub mod item;
pub mod profile;
pub mod window;

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use timeline_store::FanOutReport;
use timeline_store::timeline_core::Score;

/// Print output in JSON or human-readable format.
pub fn output<T: Serialize + HumanReadable>(value: &T, human: bool) -> Result<()> {
    if human {
        value.print_human();
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

/// Trait for types that can be printed in human-readable format.
pub trait HumanReadable {
    fn print_human(&self);
}

/// Parses a pivot given either as RFC 3339 or as raw nanoseconds.
pub fn parse_instant(raw: &str) -> Result<Score> {
    if let Ok(nanos) = raw.parse::<i64>() {
        return Ok(Score::from_nanos(nanos));
    }
    let at = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| anyhow::anyhow!("Invalid instant {:?}: {}", raw, e))?;
    Ok(Score::from_datetime(at.with_timezone(&Utc)))
}

/// Format a score for human display.
pub fn format_score(score: Score) -> String {
    score.to_datetime().format("%Y-%m-%d %H:%M:%S%.9f UTC").to_string()
}

/// Truncate a string for display, adding ellipsis if needed.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a fan-out tally under a heading.
pub fn print_fanout(report: &FanOutReport) {
    println!(
        "  {} {} visited, {} inserted, {} removed, {} re-homed, {} unchanged, {} skipped",
        "Fan-out:".cyan(),
        report.visited,
        report.inserted,
        report.removed,
        report.rehomed,
        report.unchanged,
        report.skipped
    );
    if report.failed > 0 {
        println!("  {} {}", "Failed:".red(), report.failed);
    }
}

impl HumanReadable for FanOutReport {
    fn print_human(&self) {
        print_fanout(self);
    }
}
