//! On-device control files of the iPod Shuffle (`iTunesSD`, `iTunesStats`,
//! `iTunesPState`) and the in-memory entries they are built from.

mod database;
mod filename;
mod playlist;
mod record;

use std::fmt;

use thiserror::Error;

pub use database::{ControlFiles, DeviceDatabase, PlayerState};
pub use filename::{EpisodeFilename, build_filename, parse_filename};
pub use playlist::DevicePlaylist;

/// Raw bookmark value the device uses for "never played / no resume point".
pub const UNPLAYED_BOOKMARK: u32 = 0xFF_FFFF;

/// Raw priority value for entries decoded from the device. Never serialized.
pub const UNKNOWN_PRIORITY: u32 = 0xDEAD_BEEF;

/// Nominal value shown for the resume tier.
pub const RESUME_PRIORITY: f64 = 1.5;

/// Largest value a 3-byte field can hold.
pub const MAX_U24: u32 = 0xFF_FFFF;

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{file} is truncated: expected at least {expected} bytes, found {actual}")]
    Truncated {
        file: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("iTunesSD lists {sd} entries but iTunesStats lists {stats}")]
    CountMismatch { sd: u32, stats: u32 },

    #[error("{file} record {index} has size field {found:#08x}, expected {expected:#08x}")]
    RecordSize {
        file: &'static str,
        index: usize,
        found: u32,
        expected: u32,
    },

    #[error("unknown media type code {0}")]
    UnknownMediaType(u8),

    #[error("filename field is not valid UTF-16")]
    InvalidFilename,

    #[error("filename '{name}' is {units} UTF-16 units long, at most {max} fit in a record")]
    FilenameTooLong {
        name: String,
        units: usize,
        max: usize,
    },

    #[error("{0} entries do not fit in a 3-byte count field")]
    TooManyEntries(usize),

    #[error("entry '{0}' has no assigned priority and cannot be written to the device")]
    UnassignedPriority(String),

    #[error("value {0:#x} does not fit in a 3-byte field")]
    FieldOverflow(u32),

    #[error("short hash {hash} is shared by '{first}' and '{second}'")]
    ShortHashCollision {
        hash: String,
        first: String,
        second: String,
    },
}

/// Resume position stored in the statistics file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bookmark {
    #[default]
    Unplayed,
    Resumed(u32),
}

impl Bookmark {
    /// Interprets a raw device field; only the sentinel means unplayed.
    pub fn from_device(raw: u32) -> Self {
        if raw == UNPLAYED_BOOKMARK {
            Self::Unplayed
        } else {
            Self::Resumed(raw)
        }
    }

    pub fn to_device(self) -> u32 {
        match self {
            Self::Unplayed => UNPLAYED_BOOKMARK,
            Self::Resumed(position) => position,
        }
    }

    pub fn is_resumed(self) -> bool {
        matches!(self, Self::Resumed(_))
    }
}

// The canonical database historically stores 0 for fresh episodes and the
// device sentinel for reset ones; both load as unplayed.
impl From<u32> for Bookmark {
    fn from(raw: u32) -> Self {
        if raw == 0 || raw >= UNPLAYED_BOOKMARK {
            Self::Unplayed
        } else {
            Self::Resumed(raw)
        }
    }
}

impl From<Bookmark> for u32 {
    fn from(bookmark: Bookmark) -> Self {
        bookmark.to_device()
    }
}

/// Transient ordering priority. `Resume` plays before every assigned
/// priority; among assigned ones lower plays earlier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Priority {
    Unknown,
    Resume,
    Assigned(f64),
}

impl Priority {
    pub fn raw(self) -> Option<f64> {
        match self {
            Self::Unknown => None,
            Self::Resume => Some(RESUME_PRIORITY),
            Self::Assigned(value) => Some(value),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.pad(&format!("unknown ({UNKNOWN_PRIORITY:#x})")),
            Self::Resume => f.pad(&format!("{RESUME_PRIORITY} (resume)")),
            Self::Assigned(value) => f.pad(&value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    #[default]
    Mp3,
    Aac,
    Wav,
}

impl MediaType {
    pub fn code(self) -> u8 {
        match self {
            Self::Mp3 => 1,
            Self::Aac => 2,
            Self::Wav => 4,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Mp3),
            2 => Ok(Self::Aac),
            4 => Ok(Self::Wav),
            other => Err(DeviceError::UnknownMediaType(other)),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "m4a",
            Self::Wav => "wav",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "m4a" | "aac" => Some(Self::Aac),
            "wav" => Some(Self::Wav),
            _ => None,
        }
    }
}

/// One track on the device: a record in both `iTunesSD` and `iTunesStats`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEntry {
    pub filename: String,
    pub media_type: MediaType,
    pub bookmark: Bookmark,
    pub play_count: u32,
    pub skip_count: u32,
    pub priority: Priority,
}

impl DeviceEntry {
    /// Entry for a freshly staged episode. A real resume position replaces
    /// the podcast priority with [`Priority::Resume`].
    pub fn staged(filename: String, bookmark: Bookmark, podcast_priority: u32) -> Self {
        let priority = if bookmark.is_resumed() {
            Priority::Resume
        } else {
            Priority::Assigned(f64::from(podcast_priority))
        };
        let media_type = filename
            .rsplit_once('.')
            .and_then(|(_, ext)| MediaType::from_extension(ext))
            .unwrap_or_default();

        Self {
            filename,
            media_type,
            bookmark,
            play_count: 0,
            skip_count: 0,
            priority,
        }
    }
}
