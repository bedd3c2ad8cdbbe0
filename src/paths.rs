use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn database_file_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("podshuffler").join("podcasts.json"))
}

pub fn stage_dir_path() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("unable to resolve cache directory")?;
    Ok(base.join("podshuffler"))
}

/// Where the iPod keeps `iTunesSD`, `iTunesStats` and `iTunesPState`.
pub fn device_control_dir(device_root: &Path) -> PathBuf {
    device_root.join("iPod_Control").join("iTunes")
}
