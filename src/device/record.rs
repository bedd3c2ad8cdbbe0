//! Fixed-size records for a single entry: 558 bytes in `iTunesSD`
//! (big-endian) and 18 bytes in `iTunesStats` (little-endian).

use super::{Bookmark, DeviceEntry, DeviceError, MAX_U24, MediaType, Priority, Result};

pub(super) const SD_RECORD_LEN: usize = 558;
pub(super) const STATS_RECORD_LEN: usize = 18;

const SD_RECORD_SIZE_FIELD: u32 = 0x00_022E;
const SD_RESERVED_A: u32 = 0x5A_A501;
const SD_VOLUME: u32 = 0x00_00C8;
const SD_RESERVED_G: u32 = 0x00_0200;
const SD_FILENAME_OFFSET: usize = 33;
const SD_FILENAME_LEN: usize = 522;
pub(super) const MAX_FILENAME_UNITS: usize = SD_FILENAME_LEN / 2;

const STATS_RECORD_SIZE_FIELD: u32 = 0x00_0012;

pub(super) fn put_u24_be(buf: &mut [u8], value: u32) {
    buf[0] = (value >> 16) as u8;
    buf[1] = (value >> 8) as u8;
    buf[2] = value as u8;
}

pub(super) fn put_u24_le(buf: &mut [u8], value: u32) {
    buf[0] = value as u8;
    buf[1] = (value >> 8) as u8;
    buf[2] = (value >> 16) as u8;
}

pub(super) fn read_u24_be(buf: &[u8]) -> u32 {
    (u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2])
}

pub(super) fn read_u24_le(buf: &[u8]) -> u32 {
    u32::from(buf[0]) | (u32::from(buf[1]) << 8) | (u32::from(buf[2]) << 16)
}

fn checked_u24(value: u32) -> Result<u32> {
    if value > MAX_U24 {
        return Err(DeviceError::FieldOverflow(value));
    }
    Ok(value)
}

pub(super) fn encode_sd_record(entry: &DeviceEntry) -> Result<[u8; SD_RECORD_LEN]> {
    let units = entry.filename.encode_utf16().collect::<Vec<_>>();
    if units.len() > MAX_FILENAME_UNITS {
        return Err(DeviceError::FilenameTooLong {
            name: entry.filename.clone(),
            units: units.len(),
            max: MAX_FILENAME_UNITS,
        });
    }

    let mut data = [0_u8; SD_RECORD_LEN];
    put_u24_be(&mut data[0..3], SD_RECORD_SIZE_FIELD);
    put_u24_be(&mut data[3..6], SD_RESERVED_A);
    // start time, three reserved fields, stop time and two more reserved
    // fields stay zero (bytes 6..24)
    put_u24_be(&mut data[24..27], SD_VOLUME);
    data[29] = entry.media_type.code();
    put_u24_be(&mut data[30..33], SD_RESERVED_G);

    for (i, unit) in units.iter().enumerate() {
        let offset = SD_FILENAME_OFFSET + i * 2;
        data[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
    }

    data[555] = 0; // shuffle-eligible
    data[556] = 1; // resumable
    Ok(data)
}

/// Decoded entries carry [`Priority::Unknown`]; playback counters come from
/// the statistics record.
pub(super) fn decode_sd_record(data: &[u8], index: usize) -> Result<DeviceEntry> {
    if data.len() != SD_RECORD_LEN {
        return Err(DeviceError::Truncated {
            file: "iTunesSD",
            expected: SD_RECORD_LEN,
            actual: data.len(),
        });
    }

    let size = read_u24_be(&data[0..3]);
    if size != SD_RECORD_SIZE_FIELD {
        return Err(DeviceError::RecordSize {
            file: "iTunesSD",
            index,
            found: size,
            expected: SD_RECORD_SIZE_FIELD,
        });
    }

    let media_type = MediaType::from_code(data[29])?;
    let filename = decode_filename(&data[SD_FILENAME_OFFSET..SD_FILENAME_OFFSET + SD_FILENAME_LEN])?;

    Ok(DeviceEntry {
        filename,
        media_type,
        bookmark: Bookmark::Unplayed,
        play_count: 0,
        skip_count: 0,
        priority: Priority::Unknown,
    })
}

fn decode_filename(field: &[u8]) -> Result<String> {
    let units = field
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|unit| *unit != 0)
        .collect::<Vec<_>>();
    if units.is_empty() {
        return Err(DeviceError::InvalidFilename);
    }
    String::from_utf16(&units).map_err(|_| DeviceError::InvalidFilename)
}

/// Play count is always written as zero, whatever the entry carries.
pub(super) fn encode_stats_record(entry: &DeviceEntry) -> Result<[u8; STATS_RECORD_LEN]> {
    let mut data = [0_u8; STATS_RECORD_LEN];
    put_u24_le(&mut data[0..3], STATS_RECORD_SIZE_FIELD);
    put_u24_le(&mut data[3..6], checked_u24(entry.bookmark.to_device())?);
    put_u24_le(&mut data[12..15], 0);
    put_u24_le(&mut data[15..18], checked_u24(entry.skip_count)?);
    Ok(data)
}

/// Returns `(bookmark, play count, skip count)`.
pub(super) fn decode_stats_record(data: &[u8], index: usize) -> Result<(Bookmark, u32, u32)> {
    if data.len() != STATS_RECORD_LEN {
        return Err(DeviceError::Truncated {
            file: "iTunesStats",
            expected: STATS_RECORD_LEN,
            actual: data.len(),
        });
    }

    let size = read_u24_le(&data[0..3]);
    if size != STATS_RECORD_SIZE_FIELD {
        return Err(DeviceError::RecordSize {
            file: "iTunesStats",
            index,
            found: size,
            expected: STATS_RECORD_SIZE_FIELD,
        });
    }

    Ok((
        Bookmark::from_device(read_u24_le(&data[3..6])),
        read_u24_le(&data[12..15]),
        read_u24_le(&data[15..18]),
    ))
}
