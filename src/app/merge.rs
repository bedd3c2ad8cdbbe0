use tracing::{debug, info};

use crate::db::Podcast;
use crate::device::{Bookmark, DeviceEntry, parse_filename};

/// Resume positions at or below this are treated as accidental playback.
pub(crate) const MIN_RESUME_POSITION: u32 = 0x100;

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct MergeReport {
    pub(crate) updated: usize,
    pub(crate) listened: usize,
    pub(crate) unmatched: Vec<String>,
}

/// Folds play state reported by the device back into the canonical episodes.
/// Entries that do not map to a known episode are reported, never fatal.
pub(crate) fn merge_device_state(podcasts: &mut [Podcast], entries: &[DeviceEntry]) -> MergeReport {
    let mut report = MergeReport::default();

    for entry in entries {
        let Some(parsed) = parse_filename(&entry.filename) else {
            debug!(filename = %entry.filename, "not a managed episode file");
            report.unmatched.push(entry.filename.clone());
            continue;
        };

        let Some(podcast) = podcasts
            .iter_mut()
            .find(|podcast| podcast.short_name == parsed.short_name)
        else {
            debug!(filename = %entry.filename, "no podcast with short name {}", parsed.short_name);
            report.unmatched.push(entry.filename.clone());
            continue;
        };

        let mut matched = false;
        for episode in podcast
            .episodes
            .iter_mut()
            .filter(|episode| episode.content_hash.starts_with(&parsed.short_hash))
        {
            matched = true;
            episode.bookmark_time = resume_position(entry.bookmark);
            if entry.play_count > 0 {
                episode.listened = true;
                episode.queued_up = false;
                report.listened += 1;
            } else {
                episode.queued_up = true;
            }
            report.updated += 1;
            info!(
                podcast = %podcast.short_name,
                hash = %parsed.short_hash,
                plays = entry.play_count,
                "merged device state for {}",
                episode.title
            );
        }

        if !matched {
            report.unmatched.push(entry.filename.clone());
        }
    }

    report
}

fn resume_position(bookmark: Bookmark) -> Bookmark {
    match bookmark {
        Bookmark::Resumed(position) if position > MIN_RESUME_POSITION => bookmark,
        _ => Bookmark::Unplayed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EpisodeOrder;
    use crate::db::fixtures::{episode, podcast};
    use crate::device::{MediaType, Priority};

    fn device_entry(filename: &str, bookmark: u32, play_count: u32) -> DeviceEntry {
        DeviceEntry {
            filename: filename.to_string(),
            media_type: MediaType::Mp3,
            bookmark: Bookmark::from_device(bookmark),
            play_count,
            skip_count: 0,
            priority: Priority::Unknown,
        }
    }

    fn library() -> Vec<Podcast> {
        vec![
            podcast("news", EpisodeOrder::NewestOnly, vec![episode("0a1b2c3d", 2)]),
            podcast(
                "serial",
                EpisodeOrder::OldestFirst,
                vec![episode("11111111", 3), episode("22222222", 1)],
            ),
        ]
    }

    #[test]
    fn short_resume_position_merges_as_unplayed() {
        let mut podcasts = library();
        merge_device_state(&mut podcasts, &[device_entry("/news-0a1b2c3d.mp3", 50, 0)]);

        let ep = &podcasts[0].episodes[0];
        assert_eq!(ep.bookmark_time, Bookmark::Unplayed);
        assert!(ep.queued_up);
        assert!(!ep.listened);
    }

    #[test]
    fn real_resume_position_is_kept() {
        let mut podcasts = library();
        merge_device_state(&mut podcasts, &[device_entry("/serial-22222222.mp3", 4000, 0)]);

        assert_eq!(podcasts[1].episodes[1].bookmark_time, Bookmark::Resumed(4000));
        assert_eq!(podcasts[1].episodes[0].bookmark_time, Bookmark::Unplayed);
    }

    #[test]
    fn threshold_itself_counts_as_unplayed() {
        let mut podcasts = library();
        merge_device_state(&mut podcasts, &[device_entry("/news-0a1b2c3d.mp3", 0x100, 0)]);
        assert_eq!(podcasts[0].episodes[0].bookmark_time, Bookmark::Unplayed);

        merge_device_state(&mut podcasts, &[device_entry("/news-0a1b2c3d.mp3", 0x101, 0)]);
        assert_eq!(podcasts[0].episodes[0].bookmark_time, Bookmark::Resumed(0x101));
    }

    #[test]
    fn played_episode_is_marked_listened_and_unqueued() {
        let mut podcasts = library();
        podcasts[0].episodes[0].queued_up = true;

        let report = merge_device_state(
            &mut podcasts,
            &[device_entry("/news-0a1b2c3d.mp3", 0xFF_FFFF, 1)],
        );

        let ep = &podcasts[0].episodes[0];
        assert!(ep.listened);
        assert!(!ep.queued_up);
        assert_eq!(report.updated, 1);
        assert_eq!(report.listened, 1);
    }

    #[test]
    fn foreign_and_unknown_entries_are_skipped() {
        let mut podcasts = library();
        let before = podcasts.clone();

        let report = merge_device_state(
            &mut podcasts,
            &[
                device_entry("/Some Album/track01.mp3", 9000, 3),
                device_entry("/unknown-0a1b2c3d.mp3", 9000, 3),
                device_entry("/news-ffffffff.mp3", 9000, 3),
            ],
        );

        assert_eq!(podcasts, before);
        assert_eq!(report.updated, 0);
        assert_eq!(report.unmatched.len(), 3);
    }
}
