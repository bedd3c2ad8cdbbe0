use chrono::{DateTime, Local, Utc};

pub(crate) const GREEN_CHECKMARK: &str = "\x1b[32m\u{2713}\x1b[0m";
pub(crate) const GREEN_PLUS: &str = "\x1b[32m+\x1b[0m";
pub(crate) const RED_DASH: &str = "\x1b[31m-\x1b[0m";

/// `H:MM:SS` or `M:SS`; `??:??` when unknown.
pub(crate) fn format_duration(seconds: u32) -> String {
    if seconds == 0 {
        return "??:??".to_string();
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

pub(crate) fn format_episode_date(date: &DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%a %b %d %Y").to_string()
}

pub(crate) fn format_megabytes(bytes: u64) -> String {
    format!("{}M", (bytes + 512 * 1024) / (1024 * 1024))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}
