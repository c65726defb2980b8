//! FOLLOW and UNFOLLOW commands - change the follow graph.

use anyhow::Result;
use clap::Args;
use timeline_store::Store;
use timeline_store::timeline_core::Pid;

use super::output;

/// Arguments for follow and unfollow.
#[derive(Args)]
pub struct FollowArgs {
    /// Profile doing the following
    pub pid: String,

    /// Profile being followed
    pub target: String,
}

/// Execute the follow command.
pub async fn follow(store: &Store, human: bool, args: FollowArgs) -> Result<()> {
    let report = store
        .lifecycle()
        .follow(&Pid::new(&args.pid), &Pid::new(&args.target))
        .await?;

    output(&report, human)
}

/// Execute the unfollow command.
pub async fn unfollow(store: &Store, human: bool, args: FollowArgs) -> Result<()> {
    let report = store
        .lifecycle()
        .unfollow(&Pid::new(&args.pid), &Pid::new(&args.target))
        .await?;

    output(&report, human)
}
