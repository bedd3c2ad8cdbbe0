use std::cmp::Ordering;

use rand::Rng;
use rand::seq::SliceRandom;

use super::{Bookmark, DeviceDatabase, DeviceEntry, Priority};

/// Entries in playback order. Built fresh for every staging run.
#[derive(Debug, Default)]
pub struct DevicePlaylist {
    entries: Vec<DeviceEntry>,
}

impl DevicePlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: DeviceEntry) {
        self.insert_with(entry, &mut rand::thread_rng());
    }

    /// Adds an entry and re-sorts the whole playlist. Entries that compare
    /// equal end up in random relative order.
    pub fn insert_with<R: Rng + ?Sized>(&mut self, entry: DeviceEntry, rng: &mut R) {
        self.entries.push(entry);
        self.entries.shuffle(rng);
        self.entries.sort_by(playback_order);
    }

    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_database(self) -> DeviceDatabase {
        DeviceDatabase::new(self.entries)
    }
}

fn playback_order(a: &DeviceEntry, b: &DeviceEntry) -> Ordering {
    compare_priority(a.priority, b.priority).then_with(|| compare_bookmark(a.bookmark, b.bookmark))
}

// Resume entries come first and unknown ones last; each tier ties within
// itself except assigned priorities, which compare numerically.
fn compare_priority(a: Priority, b: Priority) -> Ordering {
    match (a, b) {
        (Priority::Assigned(left), Priority::Assigned(right)) => left.total_cmp(&right),
        _ => tier(a).cmp(&tier(b)),
    }
}

fn tier(priority: Priority) -> u8 {
    match priority {
        Priority::Resume => 0,
        Priority::Assigned(_) => 1,
        Priority::Unknown => 2,
    }
}

fn compare_bookmark(a: Bookmark, b: Bookmark) -> Ordering {
    match (a, b) {
        (Bookmark::Resumed(left), Bookmark::Resumed(right)) => right.cmp(&left),
        (Bookmark::Resumed(_), Bookmark::Unplayed) => Ordering::Less,
        (Bookmark::Unplayed, Bookmark::Resumed(_)) => Ordering::Greater,
        (Bookmark::Unplayed, Bookmark::Unplayed) => Ordering::Equal,
    }
}
