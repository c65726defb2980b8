//! MIGRATE and RECONCILE commands - schema setup and follow-graph repair.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use timeline_store::{ReconcileReport, Store, StoreConfig};

use super::{HumanReadable, output};

/// Response of the migrate command.
#[derive(Debug, Serialize)]
pub struct MigrateResponse {
    pub migrated: bool,
}

impl HumanReadable for MigrateResponse {
    fn print_human(&self) {
        println!("{}", "Schema is up to date".green().bold());
    }
}

impl HumanReadable for ReconcileReport {
    fn print_human(&self) {
        println!("{}", "Follow graph reconciled".green().bold());
        println!();
        println!("  {} {}", "Edges scanned:".cyan(), self.scanned);
        println!("  {} {}", "Follows completed:".cyan(), self.completed);
        println!("  {} {}", "Orphans removed:".cyan(), self.removed);
        if self.malformed > 0 {
            println!("  {} {}", "Malformed edges:".yellow(), self.malformed);
        }
    }
}

/// Execute the migrate command.
pub async fn migrate(mut config: StoreConfig, human: bool) -> Result<()> {
    config.run_migrations = true;
    let store = Store::connect(config).await?;
    store.close().await;

    output(&MigrateResponse { migrated: true }, human)
}

/// Execute the reconcile command.
pub async fn reconcile(store: &Store, human: bool) -> Result<()> {
    let report = store.reconciler().run().await?;

    output(&report, human)
}
