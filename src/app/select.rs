use rand::Rng;
use rand::seq::IteratorRandom;

use crate::db::{EpisodeOrder, Podcast};

/// Picks at most one episode of `podcast` to stage and marks it queued.
/// Returns its index in `podcast.episodes`.
///
/// A previously queued episode is reused, except under `newest-only` when a
/// newer episode has appeared since it was queued.
pub(crate) fn select_episode<R: Rng + ?Sized>(podcast: &mut Podcast, rng: &mut R) -> Option<usize> {
    let selected = match podcast.episodes.iter().position(|episode| episode.queued_up) {
        Some(queued) => reuse_queued(podcast, queued)?,
        None => pick_by_order(podcast, rng)?,
    };

    podcast.episodes[selected].queued_up = true;
    Some(selected)
}

fn reuse_queued(podcast: &mut Podcast, queued: usize) -> Option<usize> {
    if podcast.episode_order != EpisodeOrder::NewestOnly {
        return Some(queued);
    }

    if queued != 0 {
        podcast.episodes[queued].queued_up = false;
    }
    (!podcast.episodes[0].listened).then_some(0)
}

fn pick_by_order<R: Rng + ?Sized>(podcast: &Podcast, rng: &mut R) -> Option<usize> {
    let mut unlistened = podcast
        .episodes
        .iter()
        .enumerate()
        .filter(|(_, episode)| !episode.listened)
        .map(|(idx, _)| idx);

    match podcast.episode_order {
        EpisodeOrder::NewestOnly => {
            let newest = podcast.episodes.first()?;
            (!newest.listened).then_some(0)
        }
        EpisodeOrder::NewestFirst => unlistened.next(),
        EpisodeOrder::OldestFirst => unlistened.next_back(),
        EpisodeOrder::Random => unlistened.choose(rng),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::db::fixtures::{episode, podcast};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn newest_only_requeues_newest_episode() {
        let mut older = episode("00000002", 1);
        older.queued_up = true;
        let mut show = podcast(
            "daily",
            EpisodeOrder::NewestOnly,
            vec![episode("00000001", 2), older],
        );

        assert_eq!(select_episode(&mut show, &mut rng()), Some(0));
        assert!(show.episodes[0].queued_up);
        assert!(!show.episodes[1].queued_up);
    }

    #[test]
    fn newest_only_skips_podcast_when_newest_is_listened() {
        let mut newest = episode("00000001", 2);
        newest.listened = true;
        let mut show = podcast(
            "daily",
            EpisodeOrder::NewestOnly,
            vec![newest, episode("00000002", 1)],
        );

        assert_eq!(select_episode(&mut show, &mut rng()), None);
        assert!(show.episodes.iter().all(|episode| !episode.queued_up));
    }

    #[test]
    fn newest_only_drops_stale_queue_even_when_newest_is_listened() {
        let mut newest = episode("00000001", 2);
        newest.listened = true;
        let mut older = episode("00000002", 1);
        older.queued_up = true;
        let mut show = podcast("daily", EpisodeOrder::NewestOnly, vec![newest, older]);

        assert_eq!(select_episode(&mut show, &mut rng()), None);
        assert!(!show.episodes[1].queued_up);
    }

    #[test]
    fn queued_episode_is_reused_for_other_orders() {
        let mut middle = episode("00000002", 2);
        middle.queued_up = true;
        let mut show = podcast(
            "serial",
            EpisodeOrder::OldestFirst,
            vec![episode("00000001", 3), middle, episode("00000003", 1)],
        );

        assert_eq!(select_episode(&mut show, &mut rng()), Some(1));
        assert_eq!(select_episode(&mut show, &mut rng()), Some(1));
    }

    #[test]
    fn newest_first_and_oldest_first_skip_listened_episodes() {
        let mut newest = episode("00000001", 4);
        newest.listened = true;
        let mut oldest = episode("00000004", 1);
        oldest.listened = true;
        let episodes = vec![newest, episode("00000002", 3), episode("00000003", 2), oldest];

        let mut newest_first = podcast("a", EpisodeOrder::NewestFirst, episodes.clone());
        assert_eq!(select_episode(&mut newest_first, &mut rng()), Some(1));

        let mut oldest_first = podcast("b", EpisodeOrder::OldestFirst, episodes);
        assert_eq!(select_episode(&mut oldest_first, &mut rng()), Some(2));
        assert!(oldest_first.episodes[2].queued_up);
    }

    #[test]
    fn random_only_picks_unlistened_episodes() {
        for seed in 0..20 {
            let mut listened = episode("00000001", 3);
            listened.listened = true;
            let mut show = podcast(
                "mix",
                EpisodeOrder::Random,
                vec![listened, episode("00000002", 2), episode("00000003", 1)],
            );

            let picked = select_episode(&mut show, &mut StdRng::seed_from_u64(seed))
                .expect("an unlistened episode exists");
            assert!(picked == 1 || picked == 2);
        }
    }

    #[test]
    fn nothing_to_stage_when_everything_is_listened() {
        let mut done = episode("00000001", 1);
        done.listened = true;
        for order in [EpisodeOrder::NewestFirst, EpisodeOrder::OldestFirst, EpisodeOrder::Random] {
            let mut show = podcast("done", order, vec![done.clone()]);
            assert_eq!(select_episode(&mut show, &mut rng()), None);
        }

        let mut empty = podcast("empty", EpisodeOrder::NewestOnly, Vec::new());
        assert_eq!(select_episode(&mut empty, &mut rng()), None);
    }
}
