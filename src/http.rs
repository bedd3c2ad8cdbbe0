use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("podshuffler/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn feed() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub(crate) fn media() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

fn call_with_retries<T>(
    url: &str,
    policy: RetryPolicy,
    mut handle: impl FnMut(ureq::Response) -> Result<T, String>,
) -> Result<T, String> {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(policy.connect_timeout)
            .timeout_read(policy.read_timeout)
            .timeout_write(policy.read_timeout)
            .redirects(8)
            .build();

        match agent.get(url).set("User-Agent", USER_AGENT).call() {
            Ok(response) => return handle(response),
            Err(ureq::Error::Status(status, response)) => {
                let response_body = response.into_string().ok().unwrap_or_default();
                let body = response_body.trim();
                let status_error = if body.is_empty() {
                    format!("HTTP status {status}")
                } else {
                    let truncated = body.chars().take(240).collect::<String>();
                    format!("HTTP status {status} ({truncated})")
                };

                if should_retry_http_status(status) && attempt < attempts {
                    warn!(url, attempt, status, "retrying request");
                    thread::sleep(policy.retry_delay);
                    continue;
                }

                if should_retry_http_status(status) {
                    return Err(format!(
                        "request failed after {attempts} attempt(s): {status_error}"
                    ));
                }

                return Err(format!("request failed: {status_error}"));
            }
            Err(ureq::Error::Transport(err)) => {
                let transport_error = format!("transport error: {err}");
                if attempt < attempts {
                    warn!(url, attempt, %err, "retrying request");
                    thread::sleep(policy.retry_delay);
                    continue;
                }
                return Err(format!(
                    "request failed after {attempts} attempt(s): {transport_error}"
                ));
            }
        }
    }

    Err("request failed: exhausted attempts without a concrete error".to_string())
}

pub(crate) fn get_text_with_retries(url: &str, policy: RetryPolicy) -> Result<String, String> {
    call_with_retries(url, policy, |response| {
        response
            .into_string()
            .map_err(|err| format!("request failed: response decode failed: {err}"))
    })
}

/// Streams the body into a temporary file next to `target` and renames it
/// into place once complete, so an interrupted download leaves nothing behind.
pub(crate) fn download_with_retries(
    url: &str,
    target: &Path,
    policy: RetryPolicy,
) -> Result<u64, String> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|err| format!("failed to create directory {}: {err}", dir.display()))?;

    call_with_retries(url, policy, |response| {
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|err| format!("failed to create temporary file in {}: {err}", dir.display()))?;
        let written = io::copy(&mut response.into_reader(), &mut tmp)
            .map_err(|err| format!("download interrupted: {err}"))?;
        tmp.persist(target)
            .map_err(|err| format!("failed to save {}: {err}", target.display()))?;
        debug!(url, path = %target.display(), bytes = written, "download complete");
        Ok(written)
    })
}
