use std::sync::LazyLock;

use regex::Regex;

static EPISODE_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(.+?)-([0-9a-f]{8})\.(.{3})$").expect("episode filename pattern is valid")
});

/// Parts of a managed episode filename, `/{short_name}-{short_hash}.{extension}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeFilename {
    pub short_name: String,
    pub short_hash: String,
    pub extension: String,
}

pub fn build_filename(short_name: &str, short_hash: &str, extension: &str) -> String {
    format!("/{short_name}-{short_hash}.{extension}")
}

/// `None` for anything that is not a managed episode file.
pub fn parse_filename(filename: &str) -> Option<EpisodeFilename> {
    let captures = EPISODE_FILENAME.captures(filename)?;
    Some(EpisodeFilename {
        short_name: captures[1].to_string(),
        short_hash: captures[2].to_string(),
        extension: captures[3].to_string(),
    })
}
