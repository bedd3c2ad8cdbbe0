mod feed;
mod format;
mod merge;
mod select;
mod stage;
mod sync;


use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::Rng;
use tracing::{info, warn};

use crate::cli::{AddArgs, Cli, Command, EditArgs, ListArgs, MarkArgs};
use crate::db::{Database, Podcast, check_short_hash_collisions};
use crate::http::{RetryPolicy, download_with_retries};
use crate::paths::{database_file_path, stage_dir_path};

use self::feed::{apply_feed, default_short_name, fetch_feed};
use self::format::{
    GREEN_CHECKMARK, GREEN_PLUS, RED_DASH, format_duration, format_episode_date, format_megabytes,
    truncate,
};
use self::stage::{build_playlist, download_missing, plan_stage};

pub fn run(cli: Cli) -> Result<()> {
    let db_path = match cli.db {
        Some(path) => path,
        None => database_file_path()?,
    };
    let stage_dir = match cli.stage {
        Some(path) => path,
        None => stage_dir_path()?,
    };

    match cli.command {
        Command::Init => run_init(&db_path, &stage_dir)?,
        Command::Add(args) => run_add(&db_path, args)?,
        Command::Edit(args) => run_edit(&db_path, args)?,
        Command::Remove { short_name } => run_remove(&db_path, &short_name)?,
        Command::List(args) => run_list(&db_path, &args)?,
        Command::Mark(args) => run_mark(&db_path, &args)?,
        Command::Refresh { dry_run } => run_refresh(&db_path, dry_run)?,
        Command::Stage { dry_run } => run_stage(&db_path, &stage_dir, dry_run)?,
        Command::Pull { device } => run_pull(&db_path, &device)?,
        Command::Push { device } => run_push(&stage_dir, &device)?,
        Command::Clean { dry_run } => run_clean(&stage_dir, dry_run)?,
        Command::Diagnostic => run_diagnostic(&db_path)?,
    }

    Ok(())
}

fn run_init(db_path: &Path, stage_dir: &Path) -> Result<()> {
    let db = Database::open(db_path)?;
    if db_path.exists() {
        println!("Database already exists at {}", db.path().display());
    } else {
        db.save()?;
        println!("Created database at {}", db.path().display());
    }

    fs::create_dir_all(stage_dir)
        .with_context(|| format!("failed to create staging directory {}", stage_dir.display()))?;
    println!("Staging directory: {}", stage_dir.display());
    Ok(())
}

fn run_add(db_path: &Path, args: AddArgs) -> Result<()> {
    let mut db = Database::open(db_path)?;
    let feed = fetch_feed(&args.feed_url)?;

    let short_name = args
        .short_name
        .unwrap_or_else(|| default_short_name(&feed.title));
    validate_short_name(&short_name)?;

    let mut podcast = Podcast {
        name: feed.title.clone(),
        short_name,
        feed_url: args.feed_url,
        playlist_priority: args.playlist_priority,
        episode_order: args.episode_order,
        episodes: Vec::new(),
    };
    apply_feed(&mut podcast, &feed);

    println!("{} ({})", podcast.name, podcast.short_name);
    println!("{} episodes found", podcast.episodes.len());
    db.add(podcast)?;

    if args.dry_run {
        println!("Dry run, database not saved.");
        return Ok(());
    }
    db.save()
}

fn validate_short_name(short_name: &str) -> Result<()> {
    if short_name.is_empty() {
        bail!("short name must not be empty, pass --short-name");
    }
    if short_name.contains(['/', '\\']) {
        bail!("short name '{short_name}' must not contain path separators");
    }
    Ok(())
}

fn run_edit(db_path: &Path, args: EditArgs) -> Result<()> {
    let mut db = Database::open(db_path)?;
    let Some(podcast) = db.find_mut(&args.short_name) else {
        bail!("no podcast with short name '{}'", args.short_name);
    };

    if let Some(feed_url) = args.feed_url {
        podcast.feed_url = feed_url;
    }
    if let Some(priority) = args.playlist_priority {
        podcast.playlist_priority = priority;
    }
    if let Some(order) = args.episode_order {
        podcast.episode_order = order;
    }
    info!(podcast = %args.short_name, "updated podcast settings");
    db.save()
}

fn run_remove(db_path: &Path, short_name: &str) -> Result<()> {
    let mut db = Database::open(db_path)?;
    let removed = db.remove(short_name)?;
    db.save()?;
    println!("Removed {} ({})", removed.name, removed.short_name);
    Ok(())
}

fn run_list(db_path: &Path, args: &ListArgs) -> Result<()> {
    let db = Database::open(db_path)?;
    if db.podcasts.is_empty() {
        println!("No podcasts yet. Run `podshuffler add <feed-url>` first.");
        return Ok(());
    }

    if let Some(short_name) = args.podcast.as_deref()
        && db.find(short_name).is_none()
    {
        bail!("no podcast with short name '{short_name}'");
    }

    for podcast in &db.podcasts {
        if args
            .podcast
            .as_deref()
            .is_some_and(|wanted| wanted != podcast.short_name)
        {
            continue;
        }

        let unlistened = podcast
            .episodes
            .iter()
            .filter(|episode| !episode.listened)
            .count();
        println!("{} ({})", podcast.name, podcast.short_name);
        println!("{}", podcast.feed_url);
        println!(
            "{} known episodes, {} unlistened",
            podcast.episodes.len(),
            unlistened
        );
        println!("Playlist priority: {}", podcast.playlist_priority);
        println!("Episode order: {}", podcast.episode_order.as_str());
        println!();

        if args.podcast.is_none() {
            continue;
        }
        let mut episodes = podcast.episodes.iter().collect::<Vec<_>>();
        if args.reverse {
            episodes.reverse();
        }
        for episode in episodes {
            let symbol = if episode.listened { GREEN_CHECKMARK } else { " " };
            println!(
                "{symbol} {}  {}  {} ({})",
                episode.short_hash(),
                format_episode_date(&episode.date),
                truncate(&episode.title, 72),
                format_duration(episode.duration)
            );
        }
    }
    Ok(())
}

fn run_mark(db_path: &Path, args: &MarkArgs) -> Result<()> {
    let mut db = Database::open(db_path)?;
    if let Some(short_name) = args.podcast.as_deref()
        && db.find(short_name).is_none()
    {
        bail!("no podcast with short name '{short_name}'");
    }

    let changed = mark_episodes(&mut db.podcasts, args);
    if changed == 0 {
        bail!("no episodes matched");
    }
    db.save()?;
    if args.all {
        println!("Marked {changed} episode(s) across all podcasts");
    } else {
        println!("Marked {changed} episode(s)");
    }
    Ok(())
}

/// Applies the mark flags to every targeted episode and returns how many
/// episodes were targeted.
fn mark_episodes(podcasts: &mut [Podcast], args: &MarkArgs) -> usize {
    let mut changed = 0;
    for podcast in podcasts.iter_mut() {
        if args
            .podcast
            .as_deref()
            .is_some_and(|wanted| wanted != podcast.short_name)
        {
            continue;
        }
        for episode in podcast.episodes.iter_mut() {
            if args
                .episode
                .as_deref()
                .is_some_and(|prefix| !episode.content_hash.starts_with(prefix))
            {
                continue;
            }
            if args.listened {
                episode.listened = true;
            } else if args.unlistened {
                episode.listened = false;
            }
            if args.unqueued {
                episode.queued_up = false;
            } else if args.queued {
                episode.queued_up = true;
            }
            changed += 1;
        }
    }
    changed
}

fn run_refresh(db_path: &Path, dry_run: bool) -> Result<()> {
    let mut db = Database::open(db_path)?;
    let mut failed = Vec::new();

    for podcast in db.podcasts.iter_mut() {
        let feed = match fetch_feed(&podcast.feed_url) {
            Ok(feed) => feed,
            Err(err) => {
                warn!(podcast = %podcast.short_name, "refresh failed: {err:#}");
                failed.push(podcast.short_name.clone());
                continue;
            }
        };

        for guid in apply_feed(podcast, &feed) {
            let Some(episode) = podcast.episodes.iter().find(|episode| episode.guid == guid) else {
                continue;
            };
            println!(
                "{GREEN_PLUS} {}  {}  {}: {} ({})",
                episode.short_hash(),
                format_episode_date(&episode.date),
                podcast.name,
                episode.title,
                format_duration(episode.duration)
            );
        }
    }

    if !dry_run {
        db.save()?;
    }
    if !failed.is_empty() {
        bail!("failed to refresh: {}", failed.join(", "));
    }
    Ok(())
}

fn run_stage(db_path: &Path, stage_dir: &Path, dry_run: bool) -> Result<()> {
    stage_episodes(db_path, stage_dir, dry_run, &mut rand::thread_rng(), |url, target| {
        download_with_retries(url, target, RetryPolicy::media())
    })
}

/// The staged playlist is rebuilt from scratch on every run, so an empty
/// selection still replaces the previous control files.
fn stage_episodes<R, F>(
    db_path: &Path,
    stage_dir: &Path,
    dry_run: bool,
    rng: &mut R,
    fetch: F,
) -> Result<()>
where
    R: Rng + ?Sized,
    F: Fn(&str, &Path) -> Result<u64, String> + Sync,
{
    let mut db = Database::open(db_path)?;
    let staged = plan_stage(&mut db.podcasts, rng)?;
    let playlist = build_playlist(&staged);

    if playlist.is_empty() {
        println!("Nothing to stage.");
    } else {
        for episode in &staged {
            println!(
                "{}  {}  {}: {} ({})",
                episode.short_hash,
                format_episode_date(&episode.date),
                episode.podcast_name,
                episode.title,
                format_duration(episode.duration)
            );
        }

        println!();
        println!("Playlist order:");
        for entry in playlist.entries() {
            println!("  {:>14}  {}", entry.priority, entry.filename);
        }
    }

    if dry_run {
        println!("Dry run, nothing downloaded or saved.");
        return Ok(());
    }

    fs::create_dir_all(stage_dir)
        .with_context(|| format!("failed to create staging directory {}", stage_dir.display()))?;
    let downloaded = download_missing(stage_dir, &staged, fetch)?;
    info!(downloaded, "downloads finished");

    let count = playlist.len();
    let files = playlist.into_database().encode()?;
    files.write_to(stage_dir)?;
    db.save()?;
    println!("Staged {count} episode(s) in {}", stage_dir.display());
    Ok(())
}

fn run_pull(db_path: &Path, device: &Path) -> Result<()> {
    let mut db = Database::open(db_path)?;
    let report = sync::pull(&mut db.podcasts, device)?;
    db.save()?;

    println!(
        "Merged {} episode(s), {} listened",
        report.updated, report.listened
    );
    for filename in &report.unmatched {
        println!("  skipped {filename}");
    }
    Ok(())
}

fn run_push(stage_dir: &Path, device: &Path) -> Result<()> {
    let report = sync::push(stage_dir, device)?;
    for name in &report.removed {
        println!("{RED_DASH} {name}");
    }
    for name in &report.copied {
        println!("{GREEN_PLUS} {name}");
    }
    println!("Device at {} is up to date.", device.display());
    Ok(())
}

fn run_clean(stage_dir: &Path, dry_run: bool) -> Result<()> {
    let report = sync::clean(stage_dir, dry_run)?;
    for (name, size) in &report.removed {
        println!("{RED_DASH} {name} ({})", format_megabytes(*size));
    }
    let verb = if dry_run { "Would reclaim" } else { "Reclaimed" };
    println!("{verb} {}", format_megabytes(report.reclaimed_bytes()));
    Ok(())
}

fn run_diagnostic(db_path: &Path) -> Result<()> {
    let db = Database::open(db_path)?;
    check_short_hash_collisions(&db.podcasts)?;
    let episodes = db
        .podcasts
        .iter()
        .map(|podcast| podcast.episodes.len())
        .sum::<usize>();
    println!(
        "No short hash collisions among {episodes} episode(s) in {} podcast(s).",
        db.podcasts.len()
    );
    Ok(())
}
