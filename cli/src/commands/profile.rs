//! PROFILE command - register, inspect and search profiles.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use timeline_store::Store;
use timeline_store::timeline_core::{FollowingProfile, NewProfile, Pid, Profile};

use super::{HumanReadable, output};

/// Arguments for the profile command.
#[derive(Args)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub command: ProfileCommand,
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Register a new profile
    Add {
        /// Profile ID
        pid: String,

        /// Display name
        #[arg(short, long, default_value = "")]
        name: String,

        /// Password for session login
        #[arg(long, env = "TIMELINE_PROFILE_PASSWORD")]
        password: String,

        /// Feed URL for feed-driven profiles
        #[arg(long, default_value = "")]
        feed_url: String,

        /// Parent profile of a feed
        #[arg(long)]
        parent: Option<String>,
    },

    /// Show a profile with its counts
    Show {
        /// Profile ID
        pid: String,
    },

    /// Find profiles whose ID contains a term ("*" for all)
    Search {
        /// Search term
        term: String,
    },

    /// List a page of followers
    Followers {
        /// Profile ID
        pid: String,

        #[arg(long, default_value_t = 0)]
        start: usize,

        #[arg(long, default_value_t = 50)]
        count: usize,
    },
}

impl HumanReadable for Profile {
    fn print_human(&self) {
        let title = if self.name.is_empty() { self.pid.to_string() } else { self.name.clone() };
        println!("{}", title.green().bold());
        println!("{}", "=".repeat(70));
        println!();
        println!("  {} {}", "Profile ID:".cyan(), self.pid);
        if !self.bio.is_empty() {
            println!("  {} {}", "Bio:".cyan(), self.bio);
        }
        if !self.feed_url.is_empty() {
            println!("  {} {}", "Feed:".cyan(), self.feed_url);
        }
        if let Some(parent) = &self.parent_pid {
            println!("  {} {}", "Parent:".cyan(), parent);
        }
        println!(
            "  {} {} curated, {} suggested",
            "Timelines:".cyan(),
            self.curated_count,
            self.suggested_count
        );
        println!(
            "  {} {} followers, {} following, {} feeds",
            "Graph:".cyan(),
            self.follower_count,
            self.following_count,
            self.feed_count
        );
    }
}

/// A list of profiles.
#[derive(Debug, Serialize)]
pub struct ProfileList {
    pub profiles: Vec<Profile>,
}

impl HumanReadable for ProfileList {
    fn print_human(&self) {
        for profile in &self.profiles {
            println!(
                "{} {} {}",
                ">>".blue().bold(),
                profile.pid.as_str().bold(),
                profile.name.dimmed()
            );
        }
        if self.profiles.is_empty() {
            println!("  {}", "(No profiles found)".dimmed());
        }
    }
}

/// A page of followers.
#[derive(Debug, Serialize)]
pub struct FollowerPage {
    pub followers: Vec<FollowingProfile>,
}

impl HumanReadable for FollowerPage {
    fn print_human(&self) {
        for follower in &self.followers {
            let marker = if follower.reciprocal { "<->" } else { " ->" };
            println!(
                "{} {} {}",
                marker.blue().bold(),
                follower.profile.pid.as_str().bold(),
                follower.profile.name.dimmed()
            );
        }
        if self.followers.is_empty() {
            println!("  {}", "(No followers)".dimmed());
        }
    }
}

/// Execute the profile command.
pub async fn execute(store: &Store, human: bool, args: ProfileArgs) -> Result<()> {
    let profiles = store.profiles();

    match args.command {
        ProfileCommand::Add {
            pid,
            name,
            password,
            feed_url,
            parent,
        } => {
            let new = NewProfile {
                feed_url,
                parent_pid: parent.map(Pid::new),
                ..NewProfile::new(pid.as_str(), name)
            };
            let profile = profiles.add_profile(new, &password).await?;
            output(&profile, human)
        }
        ProfileCommand::Show { pid } => {
            let profile = profiles.profile(&Pid::new(&pid)).await?;
            output(&profile, human)
        }
        ProfileCommand::Search { term } => {
            let found = profiles.find_profiles_by_substring(&term).await?;
            output(&ProfileList { profiles: found }, human)
        }
        ProfileCommand::Followers { pid, start, count } => {
            let followers = profiles.followers(&Pid::new(&pid), start, count).await?;
            output(&FollowerPage { followers }, human)
        }
    }
}
