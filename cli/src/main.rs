//! Command-line interface for the timeline store.
//!
//! This CLI tool provides commands for timeline operations:
//! - publish: Publish a new item and fan it out
//! - promote: Re-admit an item into a curated timeline
//! - demote: Drop an item from a curated timeline
//! - follow / unfollow: Change the follow graph
//! - window: Read a timeline around an instant
//! - profile: Register, inspect and search profiles
//! - migrate: Create the database schema
//! - reconcile: Repair interrupted follow writes
//!
//! Configuration via environment:
//! - DATABASE_URL: PostgreSQL connection string (required)
//! - DATABASE_MAX_CONNECTIONS / DATABASE_MIN_CONNECTIONS: Pool bounds
//! - DATABASE_RUN_MIGRATIONS: Run migrations on connect (default: true)
//! - TIMELINE_NAMESPACE_PREFIX: Prefix for the four logical databases
//! - RUST_LOG: Log filter, overrides --log-level

mod commands;

use clap::{Parser, Subcommand};
use timeline_store::{Store, StoreConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use commands::{
    follow::FollowArgs,
    item::{ItemArgs, PublishArgs},
    profile::ProfileArgs,
    window::WindowArgs,
};

/// Timeline store CLI
///
/// Publish, curate and read per-profile timelines from the command line.
/// Output is JSON by default; --human prints formatted text.
#[derive(Parser)]
#[command(name = "timeline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output human-readable formatted text instead of JSON
    #[arg(long, global = true)]
    human: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a new item
    Publish(PublishArgs),

    /// Promote an item into a profile's curated timeline
    Promote(ItemArgs),

    /// Demote an item out of a profile's curated timeline
    Demote(ItemArgs),

    /// Follow a profile
    Follow(FollowArgs),

    /// Stop following a profile
    Unfollow(FollowArgs),

    /// Read a window of a timeline
    Window(WindowArgs),

    /// Manage profiles
    Profile(ProfileArgs),

    /// Create or update the database schema
    Migrate,

    /// Repair follow edges left by interrupted writes
    Reconcile,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = StoreConfig::from_env()?;

    if let Commands::Migrate = cli.command {
        return commands::admin::migrate(config, cli.human).await;
    }

    let store = Store::connect(config).await?;
    let human = cli.human;

    let result = match cli.command {
        Commands::Publish(args) => commands::item::publish(&store, human, args).await,
        Commands::Promote(args) => commands::item::promote(&store, human, args).await,
        Commands::Demote(args) => commands::item::demote(&store, human, args).await,
        Commands::Follow(args) => commands::follow::follow(&store, human, args).await,
        Commands::Unfollow(args) => commands::follow::unfollow(&store, human, args).await,
        Commands::Window(args) => commands::window::execute(&store, human, args).await,
        Commands::Profile(args) => commands::profile::execute(&store, human, args).await,
        Commands::Reconcile => commands::admin::reconcile(&store, human).await,
        Commands::Migrate => Ok(()),
    };

    store.close().await;
    result
}

/// Initialize tracing/logging, writing to stderr so JSON output stays clean.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
