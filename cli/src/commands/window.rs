//! WINDOW command - read a timeline around an instant.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use timeline_store::Store;
use timeline_store::timeline_core::{Pid, Score, Scope, TimelineItem};

use super::{HumanReadable, format_score, output, parse_instant, truncate};

/// Arguments for the window command.
#[derive(Args)]
pub struct WindowArgs {
    /// Timeline owner
    pub pid: String,

    /// Timeline to read: curated or suggested
    #[arg(short, long, default_value = "curated")]
    pub scope: Scope,

    /// Pivot instant, RFC 3339 or nanoseconds (default: newest)
    #[arg(short, long)]
    pub pivot: Option<String>,

    /// Entries to return from the pivot back
    #[arg(short, long, default_value_t = 20)]
    pub before: usize,

    /// Entries to return from the pivot forward
    #[arg(short, long, default_value_t = 0)]
    pub after: usize,
}

/// Response of the window command.
#[derive(Debug, Serialize)]
pub struct WindowResponse {
    pub pid: Pid,
    pub scope: Scope,
    pub pivot: Score,
    pub items: Vec<TimelineItem>,
}

impl HumanReadable for WindowResponse {
    fn print_human(&self) {
        println!(
            "{} {} ({})",
            "Timeline".green().bold(),
            self.pid.as_str().bold(),
            self.scope
        );
        println!("{}", "=".repeat(70));
        println!();

        for row in &self.items {
            let author = if row.author.name.is_empty() {
                row.author.pid.to_string()
            } else {
                format!("{} ({})", row.author.name, row.author.pid)
            };
            println!(
                "{} {} {}",
                ">>".blue().bold(),
                author.bold(),
                format_score(row.ts).dimmed()
            );
            if let Some(via) = &row.via {
                println!("   {} {}", "via".dimmed(), via.pid);
            }
            if !row.item.text.is_empty() {
                println!("   {}", truncate(&row.item.text, 200));
            }
            if !row.item.link.is_empty() {
                println!("   {}", row.item.link.underline());
            }
            println!("   {} {}", "ID:".dimmed(), row.id());
            println!();
        }

        if self.items.is_empty() {
            println!("  {}", "(No items in window)".dimmed());
        }
    }
}

/// Execute the window command.
pub async fn execute(store: &Store, human: bool, args: WindowArgs) -> Result<()> {
    let pid = Pid::new(&args.pid);
    let pivot = match &args.pivot {
        Some(raw) => parse_instant(raw)?,
        None => Score::MAX,
    };

    let items = store
        .ranges()
        .window_around(&pid, args.scope, pivot, args.before, args.after)
        .await?;

    let response = WindowResponse {
        pid,
        scope: args.scope,
        pivot,
        items,
    };

    output(&response, human)
}
