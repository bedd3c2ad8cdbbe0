//! Whole-file framing for the three control files.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::debug;

use super::record::{
    SD_RECORD_LEN, STATS_RECORD_LEN, decode_sd_record, decode_stats_record, encode_sd_record,
    encode_stats_record, put_u24_be, put_u24_le, read_u24_be, read_u24_le,
};
use super::{DeviceEntry, DeviceError, MAX_U24, Priority, Result};

pub const SD_FILE: &str = "iTunesSD";
pub const STATS_FILE: &str = "iTunesStats";
pub const PSTATE_FILE: &str = "iTunesPState";

const SD_HEADER_LEN: usize = 18;
const SD_HEADER_CONSTANT: u32 = 0x01_0800;
const SD_HEADER_SIZE_FIELD: u32 = 0x00_0012;
const STATS_HEADER_LEN: usize = 6;
const PSTATE_LEN: usize = 21;
const PSTATE_VOLUME: u32 = 0x1D;
const PSTATE_TRAILER: u32 = 0x00_0001;

/// Playback state the device saves on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerState {
    pub volume: u32,
    pub track_number: u32,
    pub track_position: u32,
}

impl PlayerState {
    pub fn idle() -> Self {
        Self {
            volume: PSTATE_VOLUME,
            track_number: 0,
            track_position: 0,
        }
    }

    fn encode(&self) -> [u8; PSTATE_LEN] {
        let mut data = [0_u8; PSTATE_LEN];
        put_u24_le(&mut data[0..3], self.volume);
        // shuffle position (3..6) and shuffle flag (9..12) stay zero
        put_u24_le(&mut data[6..9], self.track_number);
        put_u24_le(&mut data[12..15], self.track_position);
        put_u24_le(&mut data[18..21], PSTATE_TRAILER);
        data
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < PSTATE_LEN {
            return Err(DeviceError::Truncated {
                file: PSTATE_FILE,
                expected: PSTATE_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            volume: read_u24_le(&data[0..3]),
            track_number: read_u24_le(&data[6..9]),
            track_position: read_u24_le(&data[12..15]),
        })
    }
}

/// The device database as a list of entries in playlist order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDatabase {
    pub entries: Vec<DeviceEntry>,
    pub player_state: PlayerState,
}

impl DeviceDatabase {
    pub fn new(entries: Vec<DeviceEntry>) -> Self {
        Self {
            entries,
            player_state: PlayerState::idle(),
        }
    }

    /// Encodes every file in memory. Nothing is returned unless all three
    /// encode cleanly.
    pub fn encode(&self) -> Result<ControlFiles> {
        let count = self.entries.len();
        if count > MAX_U24 as usize {
            return Err(DeviceError::TooManyEntries(count));
        }

        let mut sd = vec![0_u8; SD_HEADER_LEN];
        put_u24_be(&mut sd[0..3], count as u32);
        put_u24_be(&mut sd[3..6], SD_HEADER_CONSTANT);
        put_u24_be(&mut sd[6..9], SD_HEADER_SIZE_FIELD);
        sd.reserve(count * SD_RECORD_LEN);

        let mut stats = vec![0_u8; STATS_HEADER_LEN];
        put_u24_le(&mut stats[0..3], count as u32);
        stats.reserve(count * STATS_RECORD_LEN);

        for entry in &self.entries {
            if entry.priority == Priority::Unknown {
                return Err(DeviceError::UnassignedPriority(entry.filename.clone()));
            }
            sd.extend_from_slice(&encode_sd_record(entry)?);
            stats.extend_from_slice(&encode_stats_record(entry)?);
        }

        Ok(ControlFiles {
            sd,
            stats,
            pstate: self.player_state.encode().to_vec(),
        })
    }

    pub fn decode(files: &ControlFiles) -> Result<Self> {
        let sd = &files.sd;
        let stats = &files.stats;

        if sd.len() < SD_HEADER_LEN {
            return Err(DeviceError::Truncated {
                file: SD_FILE,
                expected: SD_HEADER_LEN,
                actual: sd.len(),
            });
        }
        if stats.len() < STATS_HEADER_LEN {
            return Err(DeviceError::Truncated {
                file: STATS_FILE,
                expected: STATS_HEADER_LEN,
                actual: stats.len(),
            });
        }

        let sd_count = read_u24_be(&sd[0..3]);
        let stats_count = read_u24_le(&stats[0..3]);
        if sd_count != stats_count {
            return Err(DeviceError::CountMismatch {
                sd: sd_count,
                stats: stats_count,
            });
        }

        let count = sd_count as usize;
        let sd_expected = SD_HEADER_LEN + count * SD_RECORD_LEN;
        if sd.len() < sd_expected {
            return Err(DeviceError::Truncated {
                file: SD_FILE,
                expected: sd_expected,
                actual: sd.len(),
            });
        }
        let stats_expected = STATS_HEADER_LEN + count * STATS_RECORD_LEN;
        if stats.len() < stats_expected {
            return Err(DeviceError::Truncated {
                file: STATS_FILE,
                expected: stats_expected,
                actual: stats.len(),
            });
        }

        let sd_records = sd[SD_HEADER_LEN..sd_expected].chunks_exact(SD_RECORD_LEN);
        let stats_records = stats[STATS_HEADER_LEN..stats_expected].chunks_exact(STATS_RECORD_LEN);

        let mut entries = Vec::with_capacity(count);
        for (index, (sd_record, stats_record)) in sd_records.zip(stats_records).enumerate() {
            let mut entry = decode_sd_record(sd_record, index)?;
            let (bookmark, play_count, skip_count) = decode_stats_record(stats_record, index)?;
            entry.bookmark = bookmark;
            entry.play_count = play_count;
            entry.skip_count = skip_count;
            entries.push(entry);
        }

        Ok(Self {
            entries,
            player_state: PlayerState::decode(&files.pstate)?,
        })
    }

    /// Filenames as stored on the device, without the leading `/`.
    pub fn referenced_filenames(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.filename.trim_start_matches('/'))
            .collect()
    }
}

/// Raw bytes of `iTunesSD`, `iTunesStats` and `iTunesPState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFiles {
    pub sd: Vec<u8>,
    pub stats: Vec<u8>,
    pub pstate: Vec<u8>,
}

impl ControlFiles {
    pub fn read_from(dir: &Path) -> anyhow::Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
        };
        Ok(Self {
            sd: read(SD_FILE)?,
            stats: read(STATS_FILE)?,
            pstate: read(PSTATE_FILE)?,
        })
    }

    /// Writes each file to a temporary sibling first and renames it into place.
    pub fn write_to(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;

        let mut staged = Vec::with_capacity(3);
        for (name, bytes) in [
            (SD_FILE, &self.sd),
            (STATS_FILE, &self.stats),
            (PSTATE_FILE, &self.pstate),
        ] {
            let mut tmp = NamedTempFile::new_in(dir)
                .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
            tmp.write_all(bytes)
                .with_context(|| format!("failed to write temporary {name}"))?;
            tmp.as_file()
                .sync_all()
                .with_context(|| format!("failed to flush temporary {name}"))?;
            staged.push((name, tmp));
        }

        for (name, tmp) in staged {
            let target = dir.join(name);
            tmp.persist(&target)
                .with_context(|| format!("failed to replace {}", target.display()))?;
            debug!(path = %target.display(), "wrote control file");
        }
        Ok(())
    }
}
