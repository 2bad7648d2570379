//! Per-task intermediate stores.
//!
//! Each task writes its extracted records to its own tab-separated file
//! inside a timestamped run directory, appending one row per record as the
//! record is extracted. A worker crash therefore loses at most the record
//! in flight; everything appended earlier stays on disk for the merger,
//! whether the task ultimately succeeds or fails.
//!
//! Rows are sanitized before writing so no field contains a tab or newline;
//! see [`crate::utils::sanitize_field`].

use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::errors::ScrapeError;
use crate::models::{ArticleRecord, Request};
use crate::utils::{filename_component, run_dir_name, sanitize_field};

/// Fixed column order of intermediate stores and the final artifact.
pub const COLUMNS: [&str; 6] = ["link", "pubdate", "article_body", "title", "parser", "keyword"];

/// The header row shared by every store and the merged artifact.
pub fn header_line() -> String {
    COLUMNS.join("\t")
}

/// Render one record as a sanitized tab-separated row (without newline).
pub fn record_line(record: &ArticleRecord) -> String {
    [
        sanitize_field(&record.url),
        record.published_at.format("%Y-%m-%d").to_string(),
        sanitize_field(&record.body),
        sanitize_field(&record.title),
        record.source.name().to_string(),
        sanitize_field(&record.company),
    ]
    .join("\t")
}

/// The directory holding every intermediate store of one run.
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    /// Create a fresh timestamped run directory under `base`.
    #[instrument(level = "info", skip_all, fields(base = %base.display()))]
    pub async fn create(base: &Path) -> Result<Self, ScrapeError> {
        let path = run_dir_name(base);
        fs::create_dir_all(&path).await?;
        info!(path = %path.display(), "Created run directory");
        Ok(RunDir { path })
    }

    /// Wrap an existing directory (used by tests and re-merges).
    pub fn at(path: PathBuf) -> Self {
        RunDir { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The store filename for one request, free of path-hostile characters.
    pub fn store_path(&self, request: &Request) -> PathBuf {
        let name = format!(
            "{}_{}_{}.tsv",
            filename_component(&request.company),
            request.source.name(),
            request.year,
        );
        self.path.join(name)
    }

    /// Where the merged artifact of this run lives.
    pub fn merged_path(&self) -> PathBuf {
        self.path.join("merged_results.tsv")
    }
}

/// An open intermediate store owned by exactly one task.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    file: File,
    records_written: usize,
}

impl TaskStore {
    /// Create the store file and write its header row.
    pub async fn create(run_dir: &RunDir, request: &Request) -> Result<Self, ScrapeError> {
        let path = run_dir.store_path(request);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;
        file.write_all(header_line().as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        debug!(path = %path.display(), "Opened task store");
        Ok(TaskStore {
            path,
            file,
            records_written: 0,
        })
    }

    /// Append one record and flush, so the row survives a crash of the
    /// owning worker.
    pub async fn append(&mut self, record: &ArticleRecord) -> Result<(), ScrapeError> {
        let line = record_line(record);
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await?;
        self.records_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }
}
