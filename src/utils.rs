//! Utility functions for text sanitization, logging helpers, and file system
//! operations.
//!
//! Article text routinely contains every delimiter a CSV dialect could pick,
//! which is why the output format is tab-separated and why every field is
//! sanitized before writing: [`sanitize_field`] guarantees that no unescaped
//! tab or newline survives inside a field.

use chrono::Local;
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use crate::errors::ScrapeError;

/// Normalize scraped text: non-breaking spaces become regular spaces and
/// surrounding whitespace is trimmed.
pub fn clean_text(text: &str) -> String {
    text.replace('\u{a0}', " ").trim().to_string()
}

/// Make a string safe to store as one field of a tab-separated row.
///
/// Tabs and newlines are the only characters with structural meaning in the
/// output format, so they are folded into single spaces. Combine with
/// [`clean_text`] for scraped article text.
pub fn sanitize_field(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r', '\t'], " ")
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes with an ellipsis and byte count
/// indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…(+{} bytes)", &s[..end], s.len() - end)
    }
}

/// Strip characters that are awkward in filenames (path separators, colons,
/// spaces) from a task-derived name component.
pub fn filename_component(s: &str) -> String {
    s.replace([':', ' ', '/', '\\'], "_")
}

/// Name a fresh run directory under `base`, stamped with the local time,
/// e.g. `data/parse_run_20260830_153000`.
pub fn run_dir_name(base: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    base.join(format!("parse_run_{timestamp}"))
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if missing, then performs a write test by creating
/// and immediately deleting a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), ScrapeError> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
