use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::device::{Bookmark, DeviceError};

pub const SHORT_HASH_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EpisodeOrder {
    NewestOnly,
    NewestFirst,
    OldestFirst,
    Random,
}

impl EpisodeOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewestOnly => "newest-only",
            Self::NewestFirst => "newest-first",
            Self::OldestFirst => "oldest-first",
            Self::Random => "random",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub guid: String,
    #[serde(rename = "md5")]
    pub content_hash: String,
    pub date: DateTime<Utc>,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default, with = "bookmark_time")]
    pub bookmark_time: Bookmark,
    #[serde(default)]
    pub listened: bool,
    #[serde(default)]
    pub queued_up: bool,
}

impl Episode {
    pub fn short_hash(&self) -> &str {
        self.content_hash
            .get(..SHORT_HASH_LEN)
            .unwrap_or(&self.content_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Podcast {
    #[serde(default)]
    pub name: String,
    pub short_name: String,
    pub feed_url: String,
    #[serde(default)]
    pub playlist_priority: u32,
    pub episode_order: EpisodeOrder,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Podcast {
    /// Keeps the newest episode first.
    pub fn sort_episodes(&mut self) {
        self.episodes.sort_by(|a, b| b.date.cmp(&a.date));
    }
}

mod bookmark_time {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::device::Bookmark;

    pub fn serialize<S: Serializer>(bookmark: &Bookmark, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(u32::from(*bookmark))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bookmark, D::Error> {
        Ok(Bookmark::from(u32::deserialize(deserializer)?))
    }
}

pub struct Database {
    path: PathBuf,
    pub podcasts: Vec<Podcast>,
}

impl Database {
    /// Loads the database, treating a missing file as empty.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "database file missing, starting empty");
            return Ok(Self {
                path: path.to_path_buf(),
                podcasts: Vec::new(),
            });
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read database at {}", path.display()))?;
        let podcasts = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse database at {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            podcasts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create database directory {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(&self.podcasts).context("failed to serialize database")?;
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
        tmp.write_all(&json).context("failed to write database")?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to save database to {}", self.path.display()))?;
        debug!(path = %self.path.display(), podcasts = self.podcasts.len(), "saved database");
        Ok(())
    }

    pub fn find(&self, short_name: &str) -> Option<&Podcast> {
        self.podcasts
            .iter()
            .find(|podcast| podcast.short_name == short_name)
    }

    pub fn find_mut(&mut self, short_name: &str) -> Option<&mut Podcast> {
        self.podcasts
            .iter_mut()
            .find(|podcast| podcast.short_name == short_name)
    }

    pub fn add(&mut self, podcast: Podcast) -> Result<()> {
        if self
            .podcasts
            .iter()
            .any(|existing| existing.feed_url == podcast.feed_url)
        {
            bail!("a podcast with feed URL {} already exists", podcast.feed_url);
        }
        if self.find(&podcast.short_name).is_some() {
            bail!("a podcast with short name '{}' already exists", podcast.short_name);
        }
        self.podcasts.push(podcast);
        Ok(())
    }

    pub fn remove(&mut self, short_name: &str) -> Result<Podcast> {
        let Some(idx) = self
            .podcasts
            .iter()
            .position(|podcast| podcast.short_name == short_name)
        else {
            bail!("no podcast with short name '{short_name}'");
        };
        Ok(self.podcasts.remove(idx))
    }
}

/// Fails if two episodes anywhere in the database share a short hash, since
/// device filenames could no longer be mapped back to a single episode.
pub fn check_short_hash_collisions(podcasts: &[Podcast]) -> Result<(), DeviceError> {
    let mut seen: HashMap<&str, String> = HashMap::new();
    for podcast in podcasts {
        for episode in &podcast.episodes {
            let owner = format!("{}: {}", podcast.short_name, episode.title);
            if let Some(first) = seen.insert(episode.short_hash(), owner.clone()) {
                return Err(DeviceError::ShortHashCollision {
                    hash: episode.short_hash().to_string(),
                    first,
                    second: owner,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;

    use super::*;

    pub(crate) fn episode(hash: &str, day: u32) -> Episode {
        Episode {
            guid: format!("guid-{hash}"),
            content_hash: format!("{hash}{}", "0".repeat(24)),
            date: Utc
                .with_ymd_and_hms(2024, 1, day, 6, 0, 0)
                .single()
                .expect("valid date"),
            title: format!("Episode {day}"),
            url: format!("https://cdn.example.test/{hash}.mp3"),
            duration: 1800,
            bookmark_time: Bookmark::Unplayed,
            listened: false,
            queued_up: false,
        }
    }

    /// Episodes are given newest first.
    pub(crate) fn podcast(short_name: &str, order: EpisodeOrder, episodes: Vec<Episode>) -> Podcast {
        Podcast {
            name: format!("The {short_name} Show"),
            short_name: short_name.to_string(),
            feed_url: format!("https://feeds.example.test/{short_name}.xml"),
            playlist_priority: 2,
            episode_order: order,
            episodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{episode, podcast};
    use super::*;

    #[test]
    fn collision_check_rejects_shared_short_hash_across_podcasts() {
        let podcasts = vec![
            podcast("a", EpisodeOrder::NewestFirst, vec![episode("0a1b2c3d", 2)]),
            podcast("b", EpisodeOrder::NewestFirst, vec![episode("0a1b2c3d", 1)]),
        ];
        let err = check_short_hash_collisions(&podcasts).expect_err("collision should be detected");
        assert!(matches!(err, DeviceError::ShortHashCollision { ref hash, .. } if hash == "0a1b2c3d"));
    }

    #[test]
    fn collision_check_accepts_distinct_short_hashes() {
        let podcasts = vec![podcast(
            "a",
            EpisodeOrder::NewestFirst,
            vec![episode("0a1b2c3d", 2), episode("0a1b2c3e", 1)],
        )];
        assert!(check_short_hash_collisions(&podcasts).is_ok());
    }

    #[test]
    fn short_hash_tolerates_short_and_non_ascii_hashes() {
        let mut ep = episode("0a1b2c3d", 1);
        assert_eq!(ep.short_hash(), "0a1b2c3d");

        ep.content_hash = "abc".to_string();
        assert_eq!(ep.short_hash(), "abc");

        ep.content_hash = "0a1b2c3\u{e9}99".to_string();
        assert_eq!(ep.short_hash(), "0a1b2c3\u{e9}99");
    }

    #[test]
    fn json_uses_camel_case_and_raw_bookmark_numbers() {
        let mut ep = episode("0a1b2c3d", 3);
        ep.bookmark_time = Bookmark::Resumed(4000);
        let json = serde_json::to_value(podcast("news", EpisodeOrder::NewestOnly, vec![ep]))
            .expect("serialize");

        assert_eq!(json["shortName"], "news");
        assert_eq!(json["episodeOrder"], "newest-only");
        assert_eq!(json["episodes"][0]["md5"], "0a1b2c3d000000000000000000000000");
        assert_eq!(json["episodes"][0]["bookmarkTime"], 4000);
        assert_eq!(json["episodes"][0]["queuedUp"], false);
    }

    #[test]
    fn legacy_zero_bookmark_loads_as_unplayed_and_saves_as_sentinel() {
        let raw = r#"{"guid":"g","md5":"0a1b2c3d","date":"2024-01-01T00:00:00Z","title":"t","url":"u","bookmarkTime":0}"#;
        let ep: Episode = serde_json::from_str(raw).expect("parse");
        assert_eq!(ep.bookmark_time, Bookmark::Unplayed);

        let json = serde_json::to_value(&ep).expect("serialize");
        assert_eq!(json["bookmarkTime"], 0xFF_FFFF);
    }

    #[test]
    fn save_and_open_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("podcasts.json");

        let mut db = Database::open(&path).expect("missing file opens empty");
        assert!(db.podcasts.is_empty());
        db.add(podcast("news", EpisodeOrder::NewestOnly, vec![episode("0a1b2c3d", 1)]))
            .expect("add");
        db.save().expect("save");

        let reopened = Database::open(&path).expect("reopen");
        assert_eq!(reopened.podcasts, db.podcasts);
    }

    #[test]
    fn add_rejects_duplicate_feed_url_and_short_name() {
        let mut db = Database {
            path: PathBuf::from("unused.json"),
            podcasts: vec![podcast("news", EpisodeOrder::NewestOnly, Vec::new())],
        };

        let mut same_feed = podcast("other", EpisodeOrder::Random, Vec::new());
        same_feed.feed_url = db.podcasts[0].feed_url.clone();
        assert!(db.add(same_feed).is_err());

        let mut same_name = podcast("news", EpisodeOrder::Random, Vec::new());
        same_name.feed_url = "https://elsewhere.test/feed".to_string();
        assert!(db.add(same_name).is_err());

        assert!(db.remove("missing").is_err());
        assert_eq!(db.remove("news").expect("remove").short_name, "news");
    }
}
