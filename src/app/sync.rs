use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::merge::{MergeReport, merge_device_state};
use crate::db::{Podcast, check_short_hash_collisions};
use crate::device::{ControlFiles, DeviceDatabase, MediaType, parse_filename};
use crate::paths::device_control_dir;

/// Reads the device's control files and merges its play state into `podcasts`.
pub(crate) fn pull(podcasts: &mut [Podcast], device_root: &Path) -> Result<MergeReport> {
    let control_dir = device_control_dir(device_root);
    let files = ControlFiles::read_from(&control_dir)?;
    let device = DeviceDatabase::decode(&files)
        .with_context(|| format!("failed to decode control files in {}", control_dir.display()))?;
    debug!(
        entries = device.entries.len(),
        track = device.player_state.track_number,
        position = device.player_state.track_position,
        "decoded device database"
    );

    check_short_hash_collisions(podcasts).context("refusing to merge device state")?;
    Ok(merge_device_state(podcasts, &device.entries))
}

#[derive(Debug, Default)]
pub(crate) struct PushReport {
    pub(crate) removed: Vec<String>,
    pub(crate) copied: Vec<String>,
}

/// Makes the device match the staging directory: stale episode files are
/// removed, missing ones copied, and the control files replaced last.
pub(crate) fn push(stage_dir: &Path, device_root: &Path) -> Result<PushReport> {
    let files = ControlFiles::read_from(stage_dir)?;
    let staged = DeviceDatabase::decode(&files)
        .with_context(|| format!("failed to decode staged control files in {}", stage_dir.display()))?;
    let referenced = staged.referenced_filenames().into_iter().collect::<HashSet<_>>();

    for name in &referenced {
        let source = stage_dir.join(name);
        if !source.is_file() {
            bail!("staged episode {} is missing, run `podshuffler stage` again", source.display());
        }
    }

    let mut report = PushReport::default();
    let on_device = managed_files(device_root)?;
    for (name, path) in &on_device {
        if referenced.contains(name.as_str()) {
            continue;
        }
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
        info!(file = %name, "removed episode no longer needed");
        report.removed.push(name.clone());
    }

    let present = on_device
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<HashSet<_>>();
    for name in staged.referenced_filenames() {
        if present.contains(name) {
            continue;
        }
        copy_atomically(&stage_dir.join(name), &device_root.join(name))?;
        info!(file = %name, "copied episode to device");
        report.copied.push(name.to_string());
    }

    files.write_to(&device_control_dir(device_root))?;
    Ok(report)
}

#[derive(Debug, Default)]
pub(crate) struct CleanReport {
    pub(crate) removed: Vec<(String, u64)>,
}

impl CleanReport {
    pub(crate) fn reclaimed_bytes(&self) -> u64 {
        self.removed.iter().map(|(_, size)| size).sum()
    }
}

/// Deletes staged episode files the staged playlist no longer references.
pub(crate) fn clean(stage_dir: &Path, dry_run: bool) -> Result<CleanReport> {
    let files = ControlFiles::read_from(stage_dir)?;
    let staged = DeviceDatabase::decode(&files)
        .with_context(|| format!("failed to decode staged control files in {}", stage_dir.display()))?;
    let referenced = staged.referenced_filenames().into_iter().collect::<HashSet<_>>();

    let mut report = CleanReport::default();
    for (name, path) in managed_files(stage_dir)? {
        if referenced.contains(name.as_str()) {
            continue;
        }
        let size = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        if !dry_run {
            fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
        }
        report.removed.push((name, size));
    }
    Ok(report)
}

/// Audio files directly inside `dir` whose names follow the episode filename
/// scheme.
fn managed_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let managed = parse_filename(&format!("/{name}"))
            .is_some_and(|parsed| MediaType::from_extension(&parsed.extension).is_some());
        if managed {
            out.push((name, entry.path()));
        }
    }
    out.sort();
    Ok(out)
}

fn copy_atomically(source: &Path, target: &Path) -> Result<()> {
    let dir = target.parent().unwrap_or(Path::new("."));
    let mut input = File::open(source).with_context(|| format!("failed to open {}", source.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    io::copy(&mut input, &mut tmp).with_context(|| format!("failed to copy {}", source.display()))?;
    tmp.persist(target)
        .with_context(|| format!("failed to write {}", target.display()))?;
    Ok(())
}
