//! The scraping orchestrator: request expansion, a bounded worker pool, and
//! per-task isolation.
//!
//! Active requests are expanded into tasks (one task per request), and the
//! tasks run on a bounded pool via `futures::stream::buffer_unordered`. Each
//! task owns its fetch context, its source parser instance and its
//! intermediate store, so tasks share nothing mutable; a failing task can
//! never take a sibling down with it, and no task ever blocks on anything
//! but its own network calls.
//!
//! The scheduler itself never retries: fetch-level recovery is the retry
//! policy's job (see [`crate::fetch`]), and a task that still fails is
//! simply reported as failed.
//!
//! # Shutdown
//!
//! A `tokio::sync::watch` flag requests shutdown. Tasks not yet started are
//! failed without running; in-flight tasks abandon between fetches. Records
//! are only ever appended, so abandonment cannot corrupt a store.

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::errors::ScrapeError;
use crate::fetch::{FetchContext, RetryPolicy};
use crate::models::{Request, Task, TaskOutcome, TaskState};
use crate::sources::{self, SourceParser};
use crate::store::{RunDir, TaskStore};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Scheduler {
    /// Size of the worker pool; each worker runs one task to completion
    /// before taking the next.
    pub max_workers: usize,
    /// Retry policy handed to every task's fetch context.
    pub retry_policy: RetryPolicy,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler {
            max_workers: 3,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl Scheduler {
    /// Expand requests into tasks. Inactive requests produce no task at all.
    pub fn expand_requests(requests: Vec<Request>) -> Vec<Task> {
        requests
            .into_iter()
            .filter(|r| r.active)
            .enumerate()
            .map(|(id, request)| Task::new(id, request))
            .collect()
    }

    /// Run every active request to a terminal state and return the outcomes
    /// in task-id order.
    #[instrument(level = "info", skip_all, fields(max_workers = self.max_workers))]
    pub async fn run(
        &self,
        requests: Vec<Request>,
        run_dir: &RunDir,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<TaskOutcome> {
        self.run_with_resolver(requests, run_dir, shutdown, sources::registry)
            .await
    }

    /// Like [`Scheduler::run`], but with an injectable source resolver so
    /// tests can substitute scripted parsers for the real registry.
    pub async fn run_with_resolver<R>(
        &self,
        requests: Vec<Request>,
        run_dir: &RunDir,
        shutdown: watch::Receiver<bool>,
        resolver: R,
    ) -> Vec<TaskOutcome>
    where
        R: Fn(crate::models::SourceId) -> SourceParser + Sync,
    {
        let tasks = Self::expand_requests(requests);
        info!(count = tasks.len(), "Expanded requests into tasks");

        let mut outcomes: Vec<TaskOutcome> = stream::iter(tasks)
            .map(|task| {
                let shutdown = shutdown.clone();
                let resolver = &resolver;
                async move {
                    execute_task(task, run_dir, self.retry_policy.clone(), shutdown, resolver).await
                }
            })
            .buffer_unordered(self.max_workers.max(1))
            .collect()
            .await;

        // Completion order is nondeterministic; the merger and the summary
        // depend on task-id order.
        outcomes.sort_by_key(|o| o.task_id);
        outcomes
    }
}

/// Drive one task from `Pending` to a terminal state.
///
/// Every error path ends here: whatever the source parser or store throws,
/// the task is marked failed and its outcome returned, never propagated to
/// sibling tasks.
#[instrument(level = "info", skip_all, fields(task_id = task.id, company = %task.request.company, source = %task.request.source))]
async fn execute_task<R>(
    mut task: Task,
    run_dir: &RunDir,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    resolver: &R,
) -> TaskOutcome
where
    R: Fn(crate::models::SourceId) -> SourceParser + Sync,
{
    if *shutdown.borrow() {
        task.state = TaskState::Failed;
        task.error = Some("shutdown requested before task start".to_string());
        warn!("Task skipped: shutdown in progress");
        return outcome_of(&task, 0, None);
    }

    task.state = TaskState::Running;

    let mut store = match TaskStore::create(run_dir, &task.request).await {
        Ok(store) => store,
        Err(e) => {
            task.state = TaskState::Failed;
            task.error = Some(e.to_string());
            return outcome_of(&task, 0, None);
        }
    };

    let result = scrape_into_store(&task, &mut store, policy, shutdown, resolver).await;
    let records_written = store.records_written();
    let store_path = Some(store.path().to_path_buf());

    match result {
        Ok(()) => {
            task.state = TaskState::Succeeded;
            info!(records = records_written, "Task succeeded");
        }
        Err(e) => {
            task.state = TaskState::Failed;
            task.error = Some(e.to_string());
            warn!(records = records_written, error = %e, "Task failed; partial records remain available");
        }
    }
    outcome_of(&task, records_written, store_path)
}

/// The task body: resolve the parser, walk the source, append records as
/// they are extracted.
async fn scrape_into_store<R>(
    task: &Task,
    store: &mut TaskStore,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    resolver: &R,
) -> Result<(), ScrapeError>
where
    R: Fn(crate::models::SourceId) -> SourceParser + Sync,
{
    let window = task.request.date_window()?;
    let company = task.request.company.as_str();
    let mut ctx = FetchContext::new(policy)?;

    match resolver(task.request.source) {
        SourceParser::OneStep(source) => {
            for page in 0u32.. {
                if *shutdown.borrow() {
                    return Err(abandoned());
                }
                let records = source.parse_page(company, window, page, &mut ctx).await?;
                if records.is_empty() {
                    break;
                }
                for record in &records {
                    store.append(record).await?;
                }
            }
        }
        SourceParser::TwoStep(source) => {
            let references = source.search_news(company, window, &mut ctx).await?;
            for reference in &references {
                if *shutdown.borrow() {
                    return Err(abandoned());
                }
                let record = source.parse_article(company, reference, &mut ctx).await?;
                store.append(&record).await?;
            }
        }
    }
    Ok(())
}

fn abandoned() -> ScrapeError {
    ScrapeError::Cancelled
}

fn outcome_of(task: &Task, records_written: usize, store_path: Option<std::path::PathBuf>) -> TaskOutcome {
    TaskOutcome {
        task_id: task.id,
        company: task.request.company.clone(),
        year: task.request.year,
        source: task.request.source,
        state: task.state.clone(),
        records_written,
        store_path,
        error: task.error.clone(),
    }
}
