use std::path::Path;
use std::thread;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use super::select::select_episode;
use crate::db::{Podcast, check_short_hash_collisions};
use crate::device::{Bookmark, DeviceEntry, DevicePlaylist, MediaType, build_filename};

/// One episode chosen for the device this cycle.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StagedEpisode {
    /// Device filename, including the leading `/`.
    pub(crate) filename: String,
    pub(crate) url: String,
    pub(crate) bookmark: Bookmark,
    pub(crate) podcast_priority: u32,
    pub(crate) podcast_name: String,
    pub(crate) short_hash: String,
    pub(crate) date: DateTime<Utc>,
    pub(crate) title: String,
    pub(crate) duration: u32,
}

impl StagedEpisode {
    pub(crate) fn local_name(&self) -> &str {
        self.filename.trim_start_matches('/')
    }

    pub(crate) fn device_entry(&self) -> DeviceEntry {
        DeviceEntry::staged(self.filename.clone(), self.bookmark, self.podcast_priority)
    }
}

/// Picks the next episode of every podcast. Refuses to touch anything if the
/// database has ambiguous short hashes.
pub(crate) fn plan_stage<R: Rng + ?Sized>(
    podcasts: &mut [Podcast],
    rng: &mut R,
) -> Result<Vec<StagedEpisode>> {
    check_short_hash_collisions(podcasts).context("refusing to stage episodes")?;

    let mut staged = Vec::new();
    for podcast in podcasts.iter_mut() {
        let Some(idx) = select_episode(podcast, rng) else {
            debug!(podcast = %podcast.short_name, "nothing to stage");
            continue;
        };
        let episode = &podcast.episodes[idx];
        let media_type = media_type_for_url(&episode.url);

        staged.push(StagedEpisode {
            filename: build_filename(&podcast.short_name, episode.short_hash(), media_type.extension()),
            url: episode.url.clone(),
            bookmark: episode.bookmark_time,
            podcast_priority: podcast.playlist_priority,
            podcast_name: podcast.name.clone(),
            short_hash: episode.short_hash().to_string(),
            date: episode.date,
            title: episode.title.clone(),
            duration: episode.duration,
        });
    }
    Ok(staged)
}

fn media_type_for_url(url: &str) -> MediaType {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .and_then(|(_, ext)| MediaType::from_extension(ext))
        .unwrap_or_default()
}

/// Downloads every staged episode not already present in `stage_dir`, in
/// parallel. Returns once all downloads have finished; any failure is fatal.
pub(crate) fn download_missing<F>(stage_dir: &Path, staged: &[StagedEpisode], fetch: F) -> Result<usize>
where
    F: Fn(&str, &Path) -> Result<u64, String> + Sync,
{
    let missing = staged
        .iter()
        .filter(|episode| !stage_dir.join(episode.local_name()).exists())
        .collect::<Vec<_>>();

    let results = thread::scope(|scope| {
        let handles = missing
            .iter()
            .map(|episode| {
                let fetch = &fetch;
                let target = stage_dir.join(episode.local_name());
                scope.spawn(move || fetch(&episode.url, &target))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err("download thread panicked".to_string()))
            })
            .collect::<Vec<_>>()
    });

    let mut failures = Vec::new();
    for (episode, result) in missing.iter().zip(results) {
        match result {
            Ok(bytes) => info!(file = episode.local_name(), bytes, "downloaded episode"),
            Err(err) => failures.push(format!("{}: {err}", episode.local_name())),
        }
    }
    if !failures.is_empty() {
        return Err(anyhow!("failed to download {} episode(s):\n  {}", failures.len(), failures.join("\n  ")));
    }
    Ok(missing.len())
}

/// Inserts entries one at a time in podcast order, whatever order the
/// downloads finished in.
pub(crate) fn build_playlist(staged: &[StagedEpisode]) -> DevicePlaylist {
    let mut playlist = DevicePlaylist::new();
    for episode in staged {
        playlist.insert(episode.device_entry());
    }
    playlist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_follows_enclosure_extension() {
        assert_eq!(media_type_for_url("https://cdn.test/ep/42.m4a?token=abc"), MediaType::Aac);
        assert_eq!(media_type_for_url("https://cdn.test/42.WAV"), MediaType::Wav);
        assert_eq!(media_type_for_url("https://cdn.test/42.mp3#t=10"), MediaType::Mp3);
        assert_eq!(media_type_for_url("https://cdn.test/stream"), MediaType::Mp3);
        assert_eq!(media_type_for_url("https://cdn.v2.test/play"), MediaType::Mp3);
    }
}
