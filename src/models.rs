//! Data models for search requests, scraped articles, and task state.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`SourceId`]: the closed set of supported news sources
//! - [`Request`]: one (company, year, source) search intent
//! - [`DateWindow`]: the full-year date range a request covers
//! - [`ArticleReference`]: a discovered article awaiting extraction
//! - [`ArticleRecord`]: one extracted article, the unit persisted to output
//! - [`Task`] and [`TaskState`]: one orchestrated unit of work and its
//!   lifecycle (Pending → Running → Succeeded | Failed, terminal states
//!   immutable)

use chrono::NaiveDate;
use std::fmt;

use crate::errors::ScrapeError;

/// The closed enumeration of supported news sources.
///
/// Adding a new source means adding a variant here, a parser implementation
/// under [`crate::sources`], and one arm in the registry, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Vedomosti,
    Kommersant,
    Forbes,
}

impl SourceId {
    /// Every registered source, in registry iteration order.
    pub const ALL: [SourceId; 3] = [SourceId::Vedomosti, SourceId::Kommersant, SourceId::Forbes];

    /// Stable name used in intermediate filenames and the `parser` column.
    pub fn name(&self) -> &'static str {
        match self {
            SourceId::Vedomosti => "Vedomosti",
            SourceId::Kommersant => "Kommersant",
            SourceId::Forbes => "Forbes",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One (company, year, source) search intent read from the request table.
///
/// Requests are immutable once read; only `active = true` requests are
/// expanded into tasks by the scheduler.
#[derive(Debug, Clone)]
pub struct Request {
    /// Company name used as the search term (e.g. "Газпром").
    pub company: String,
    /// Two-digit year; the covered window is the full calendar year `20yy`.
    pub year: u8,
    /// The source responsible for serving this request.
    pub source: SourceId,
    /// Whether this request should be scheduled at all.
    pub active: bool,
}

impl Request {
    /// The full-calendar-year date window this request covers.
    pub fn date_window(&self) -> Result<DateWindow, ScrapeError> {
        DateWindow::full_year(2000 + self.year as i32)
    }
}

/// An inclusive date range handed to source parsers as the search window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    /// January 1st through December 31st of `year`.
    pub fn full_year(year: i32) -> Result<Self, ScrapeError> {
        let from = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| ScrapeError::Config(format!("invalid year {year}")))?;
        let to = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| ScrapeError::Config(format!("invalid year {year}")))?;
        Ok(DateWindow { from, to })
    }
}

/// A candidate article produced by a source's discovery step.
///
/// Transient: references are consumed by the extraction step and never
/// persisted directly. `url` is the unique key within a source.
#[derive(Debug, Clone)]
pub struct ArticleReference {
    pub url: String,
    pub title: String,
    pub published_at: Option<NaiveDate>,
}

/// One extracted article, the unit persisted to the intermediate store and
/// the final artifact.
///
/// Invariant: `(source, url)` uniquely identifies a record; the merger drops
/// later duplicates, keeping the first-seen record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub url: String,
    pub published_at: NaiveDate,
    pub body: String,
    pub title: String,
    pub source: SourceId,
    /// The company the search was run for (`keyword` column in the output).
    pub company: String,
}

/// Lifecycle of a task. Once a terminal state (`Succeeded` or `Failed`) is
/// reached, no further transition or record mutation occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// One unit of orchestrated work: a single active request, executed by
/// exactly one worker, owning its own intermediate store.
#[derive(Debug)]
pub struct Task {
    /// Position in scheduling order; also the merger's iteration key.
    pub id: usize,
    pub request: Request,
    pub state: TaskState,
    /// The error that moved the task to `Failed`, if any.
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: usize, request: Request) -> Self {
        Task {
            id,
            request,
            state: TaskState::Pending,
            error: None,
        }
    }
}

/// Final outcome of one task, published to the caller once the task reaches
/// a terminal state.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: usize,
    pub company: String,
    pub year: u8,
    pub source: SourceId,
    pub state: TaskState,
    /// Records appended to the task's intermediate store. Counts partial
    /// progress of failed tasks too.
    pub records_written: usize,
    /// Path of the task's intermediate store, if one was created. Set even
    /// for zero-record stores, which hold only the header row.
    pub store_path: Option<std::path::PathBuf>,
    pub error: Option<String>,
}
