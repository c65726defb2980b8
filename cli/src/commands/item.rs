//! PUBLISH, PROMOTE and DEMOTE commands - move items between timelines.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use timeline_store::timeline_core::{ItemId, NewItem, Pid};
use timeline_store::{Demoted, Promoted, Published, Store};

use super::{HumanReadable, format_score, output, print_fanout};

/// Arguments for the publish command.
#[derive(Args)]
pub struct PublishArgs {
    /// Publishing profile
    pub pid: String,

    /// Item text
    #[arg(short, long, default_value = "")]
    pub text: String,

    /// Link the item points at
    #[arg(short, long, default_value = "")]
    pub link: String,

    /// Image URL
    #[arg(long, default_value = "")]
    pub image: String,

    /// Media URL
    #[arg(long, default_value = "")]
    pub media: String,

    /// Event start (RFC 3339); makes the item an event
    #[arg(long)]
    pub event: Option<chrono::DateTime<chrono::Utc>>,

    /// Event duration in seconds
    #[arg(long, default_value_t = 0)]
    pub duration: u32,

    /// Explicit item id instead of the content-derived one
    #[arg(long)]
    pub id: Option<String>,

    /// Expire the record after this many seconds unless promoted
    #[arg(long)]
    pub ttl: Option<u64>,
}

/// Arguments for promote and demote.
#[derive(Args)]
pub struct ItemArgs {
    /// Acting profile
    pub pid: String,

    /// Item ID
    pub item_id: String,
}

impl HumanReadable for Published {
    fn print_human(&self) {
        let verb = if self.promoted { "Promoted existing item" } else { "Published item" };
        println!("{}", verb.green().bold());
        println!();
        println!("  {} {}", "Item ID:".cyan(), self.item_id);
        println!("  {} {}", "Score:".cyan(), format_score(self.score));
        print_fanout(&self.fanout);
    }
}

impl HumanReadable for Promoted {
    fn print_human(&self) {
        println!("{}", "Promoted item".green().bold());
        println!();
        println!("  {} {}", "Item ID:".cyan(), self.item_id);
        println!("  {} {}", "Score:".cyan(), format_score(self.score));
        if !self.inserted {
            println!("  {}", "(already curated; score kept)".dimmed());
        }
        print_fanout(&self.fanout);
    }
}

impl HumanReadable for Demoted {
    fn print_human(&self) {
        println!("{}", "Demoted item".yellow().bold());
        println!();
        println!("  {} {}", "Item ID:".cyan(), self.item_id);
        if !self.removed {
            println!("  {}", "(was not curated)".dimmed());
        }
        print_fanout(&self.fanout);
    }
}

/// Execute the publish command.
pub async fn publish(store: &Store, human: bool, args: PublishArgs) -> Result<()> {
    let mut new = NewItem::new(args.pid.as_str())
        .text(args.text)
        .link(args.link)
        .image(args.image)
        .media(args.media)
        .duration(args.duration);
    if let Some(at) = args.event {
        new = new.event(at);
    }
    if let Some(id) = args.id {
        new = new.id(id);
    }

    let published = store
        .lifecycle()
        .publish(new, args.ttl.map(Duration::from_secs))
        .await?;

    output(&published, human)
}

/// Execute the promote command.
pub async fn promote(store: &Store, human: bool, args: ItemArgs) -> Result<()> {
    let promoted = store
        .lifecycle()
        .promote(&Pid::new(&args.pid), &ItemId::new(&args.item_id))
        .await?;

    output(&promoted, human)
}

/// Execute the demote command.
pub async fn demote(store: &Store, human: bool, args: ItemArgs) -> Result<()> {
    let demoted = store
        .lifecycle()
        .demote(&Pid::new(&args.pid), &ItemId::new(&args.item_id))
        .await?;

    output(&demoted, human)
}
