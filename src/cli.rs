use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::db::EpisodeOrder;

#[derive(Debug, Parser)]
#[command(
    name = "podshuffler",
    version,
    about = "Queue podcast episodes and sync them onto an iPod Shuffle"
)]
pub struct Cli {
    /// Podcast database file
    #[arg(long, global = true, env = "PODSHUFFLER_DB")]
    pub db: Option<PathBuf>,

    /// Staging directory for downloaded episodes and control files
    #[arg(long, global = true, env = "PODSHUFFLER_STAGE")]
    pub stage: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Initialize your podcast database and staging directory
    Init,
    /// Add a new podcast
    Add(AddArgs),
    /// Modify the settings of an existing podcast
    Edit(EditArgs),
    /// Remove an existing podcast
    Remove {
        /// Podcast short name
        short_name: String,
    },
    /// Show high-level podcast information
    List(ListArgs),
    /// Mark episodes as listened or unlistened
    Mark(MarkArgs),
    /// Fetch new episode information
    Refresh {
        #[arg(long)]
        dry_run: bool,
    },
    /// Select and download episodes
    Stage {
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch and merge play data from the iPod Shuffle
    Pull {
        /// Root directory of the mounted iPod
        device: PathBuf,
    },
    /// Copy podcasts and control files to the iPod Shuffle
    Push {
        /// Root directory of the mounted iPod
        device: PathBuf,
    },
    /// Remove unneeded podcast files from the staging area
    Clean {
        #[arg(long)]
        dry_run: bool,
    },
    /// Check the database for episode hash collisions
    Diagnostic,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub feed_url: String,

    /// Short name used in device filenames (defaults to the feed title)
    #[arg(long)]
    pub short_name: Option<String>,

    /// Lower numbers play earlier
    #[arg(long, default_value_t = 0)]
    pub playlist_priority: u32,

    #[arg(long, value_enum, default_value_t = EpisodeOrder::NewestFirst)]
    pub episode_order: EpisodeOrder,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("changes")
        .required(true)
        .multiple(true)
        .args(["feed_url", "playlist_priority", "episode_order"])
))]
pub struct EditArgs {
    pub short_name: String,

    #[arg(long)]
    pub feed_url: Option<String>,

    #[arg(long)]
    pub playlist_priority: Option<u32>,

    #[arg(long, value_enum)]
    pub episode_order: Option<EpisodeOrder>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Show episodes of a single podcast
    #[arg(long)]
    pub podcast: Option<String>,

    /// Oldest episodes first
    #[arg(long, requires = "podcast")]
    pub reverse: bool,
}

#[derive(Debug, Args)]
#[command(
    group(ArgGroup::new("target").required(true).multiple(true).args(["podcast", "episode", "all"])),
    group(ArgGroup::new("flags").required(true).multiple(true).args(["listened", "unlistened", "queued", "unqueued"]))
)]
pub struct MarkArgs {
    #[arg(long)]
    pub podcast: Option<String>,

    /// Episode short hash (or any prefix of the content hash)
    #[arg(long)]
    pub episode: Option<String>,

    #[arg(long)]
    pub all: bool,

    #[arg(long, conflicts_with = "unlistened")]
    pub listened: bool,

    #[arg(long)]
    pub unlistened: bool,

    #[arg(long, conflicts_with = "unqueued")]
    pub queued: bool,

    #[arg(long)]
    pub unqueued: bool,
}
