//! Merging intermediate stores into the final artifact.
//!
//! The merger runs after every task has reached a terminal state. It reads
//! the intermediate store of every task in task-id order, including the
//! partial stores of failed tasks, whose rows were verified and persisted
//! before the failure. It then deduplicates rows by (source, url) keeping the
//! first occurrence, and writes one tab-separated artifact.
//!
//! Any I/O failure here aborts the merge: a silently incomplete artifact is
//! worse than none. Malformed rows inside a store, by contrast, are skipped
//! with a warning; they can appear when a worker died mid-write.

use itertools::Itertools;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::errors::ScrapeError;
use crate::models::{SourceId, TaskOutcome, TaskState};
use crate::store::{header_line, RunDir, COLUMNS};
use crate::utils::truncate_for_log;

/// Index of the `link` column, half of the deduplication key.
const COL_LINK: usize = 0;
/// Index of the `parser` column, the other half of the deduplication key.
const COL_PARSER: usize = 4;

/// One failed (company, year, source) combination, named so a caller can
/// re-run exactly what is missing.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub company: String,
    pub year: u8,
    pub source: SourceId,
    pub error: String,
}

/// Outcome of a merge: where the artifact is and how complete it is.
#[derive(Debug)]
pub struct MergeSummary {
    pub artifact_path: PathBuf,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub records_merged: usize,
    pub duplicates_dropped: usize,
    /// Record counts per source, in registry order.
    pub per_source: Vec<(SourceId, usize)>,
    pub failures: Vec<FailureReport>,
}

/// Merge every intermediate store of a run into the final artifact.
///
/// Deterministic: outcomes are processed in task-id order and rows within a
/// store in append order, so repeated merges over the same stores produce
/// byte-identical artifacts.
#[instrument(level = "info", skip_all, fields(run_dir = %run_dir.path().display()))]
pub async fn merge(
    run_dir: &RunDir,
    outcomes: &[TaskOutcome],
) -> Result<MergeSummary, ScrapeError> {
    let mut rows: Vec<(String, String, String)> = Vec::new(); // (source, url, row)
    let mut total_rows = 0usize;

    let mut ordered: Vec<&TaskOutcome> = outcomes.iter().collect();
    ordered.sort_by_key(|o| o.task_id);

    for outcome in &ordered {
        let Some(path) = outcome.store_path.as_ref() else {
            continue;
        };
        let content = fs::read_to_string(path).await?;
        for line in content.lines().skip(1) {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < COLUMNS.len() {
                warn!(
                    path = %path.display(),
                    columns = fields.len(),
                    row = %truncate_for_log(line, 120),
                    "Skipping row with insufficient columns"
                );
                continue;
            }
            total_rows += 1;
            rows.push((
                fields[COL_PARSER].to_string(),
                fields[COL_LINK].to_string(),
                line.to_string(),
            ));
        }
    }

    let kept: Vec<(String, String, String)> = rows
        .into_iter()
        .unique_by(|(source, url, _)| (source.clone(), url.clone()))
        .collect();
    let duplicates_dropped = total_rows - kept.len();

    let per_source = SourceId::ALL
        .iter()
        .map(|s| {
            let count = kept
                .iter()
                .filter(|(source, _, _)| source.as_str() == s.name())
                .count();
            (*s, count)
        })
        .collect();

    let artifact_path = run_dir.merged_path();
    let mut artifact = String::with_capacity(kept.iter().map(|(_, _, r)| r.len() + 1).sum::<usize>() + 64);
    artifact.push_str(&header_line());
    artifact.push('\n');
    for (_, _, row) in &kept {
        artifact.push_str(row);
        artifact.push('\n');
    }
    fs::write(&artifact_path, artifact).await?;

    let summary = MergeSummary {
        artifact_path,
        tasks_succeeded: ordered
            .iter()
            .filter(|o| o.state == TaskState::Succeeded)
            .count(),
        tasks_failed: ordered
            .iter()
            .filter(|o| o.state == TaskState::Failed)
            .count(),
        records_merged: kept.len(),
        duplicates_dropped,
        per_source,
        failures: ordered
            .iter()
            .filter(|o| o.state == TaskState::Failed)
            .map(|o| FailureReport {
                company: o.company.clone(),
                year: o.year,
                source: o.source,
                error: o.error.clone().unwrap_or_else(|| "unknown".to_string()),
            })
            .collect(),
    };

    info!(
        records = summary.records_merged,
        duplicates = summary.duplicates_dropped,
        succeeded = summary.tasks_succeeded,
        failed = summary.tasks_failed,
        artifact = %summary.artifact_path.display(),
        "Merge complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleRecord, Request, TaskState};
    use crate::store::TaskStore;
    use chrono::NaiveDate;

    fn request(company: &str, source: SourceId) -> Request {
        Request {
            company: company.to_string(),
            year: 22,
            source,
            active: true,
        }
    }

    fn record(company: &str, url: &str, source: SourceId) -> ArticleRecord {
        ArticleRecord {
            url: url.to_string(),
            published_at: NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(),
            body: "Текст статьи.".to_string(),
            title: "Заголовок".to_string(),
            source,
            company: company.to_string(),
        }
    }

    fn outcome(
        task_id: usize,
        request: &Request,
        state: TaskState,
        records: usize,
        store_path: Option<PathBuf>,
        error: Option<&str>,
    ) -> TaskOutcome {
        TaskOutcome {
            task_id,
            company: request.company.clone(),
            year: request.year,
            source: request.source,
            state,
            records_written: records,
            store_path,
            error: error.map(str::to_string),
        }
    }

    async fn write_store(run_dir: &RunDir, request: &Request, records: &[ArticleRecord]) -> PathBuf {
        let mut store = TaskStore::create(run_dir, request).await.unwrap();
        for r in records {
            store.append(r).await.unwrap();
        }
        store.path().to_path_buf()
    }

    #[tokio::test]
    async fn test_merge_combines_stores_and_reports_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let run_dir = RunDir::at(tmp.path().to_path_buf());

        let req_a = request("Газпром", SourceId::Vedomosti);
        let req_b = request("Газпром", SourceId::Forbes);
        let path_a = write_store(
            &run_dir,
            &req_a,
            &[
                record("Газпром", "https://v.ru/1", SourceId::Vedomosti),
                record("Газпром", "https://v.ru/2", SourceId::Vedomosti),
            ],
        )
        .await;
        let path_b = write_store(
            &run_dir,
            &req_b,
            &[record("Газпром", "https://f.ru/1", SourceId::Forbes)],
        )
        .await;

        let outcomes = vec![
            outcome(0, &req_a, TaskState::Succeeded, 2, Some(path_a), None),
            outcome(1, &req_b, TaskState::Succeeded, 1, Some(path_b), None),
        ];

        let summary = merge(&run_dir, &outcomes).await.unwrap();
        assert_eq!(summary.records_merged, 3);
        assert_eq!(summary.duplicates_dropped, 0);
        assert_eq!(summary.tasks_succeeded, 2);
        assert_eq!(summary.tasks_failed, 0);
        assert_eq!(
            summary.per_source,
            vec![
                (SourceId::Vedomosti, 2),
                (SourceId::Kommersant, 0),
                (SourceId::Forbes, 1),
            ]
        );

        let artifact = std::fs::read_to_string(&summary.artifact_path).unwrap();
        assert_eq!(artifact.lines().count(), 4);
        assert_eq!(artifact.lines().next().unwrap(), header_line());
    }

    #[tokio::test]
    async fn test_merge_deduplicates_keeping_first_task_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let run_dir = RunDir::at(tmp.path().to_path_buf());

        // Two tasks found the same Vedomosti article; the first task's copy
        // must win.
        let req_a = request("Газпром", SourceId::Vedomosti);
        let req_b = request("Газпром нефть", SourceId::Vedomosti);
        let mut duplicate = record("Газпром нефть", "https://v.ru/shared", SourceId::Vedomosti);
        duplicate.title = "Копия из второй задачи".to_string();
        let path_a = write_store(
            &run_dir,
            &req_a,
            &[record("Газпром", "https://v.ru/shared", SourceId::Vedomosti)],
        )
        .await;
        let path_b = write_store(&run_dir, &req_b, &[duplicate]).await;

        let outcomes = vec![
            outcome(0, &req_a, TaskState::Succeeded, 1, Some(path_a), None),
            outcome(1, &req_b, TaskState::Succeeded, 1, Some(path_b), None),
        ];

        let summary = merge(&run_dir, &outcomes).await.unwrap();
        assert_eq!(summary.records_merged, 1);
        assert_eq!(summary.duplicates_dropped, 1);

        let artifact = std::fs::read_to_string(&summary.artifact_path).unwrap();
        assert!(artifact.contains("\tГазпром\n"), "first task's row kept");
        assert!(!artifact.contains("Копия из второй задачи"));
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let run_dir = RunDir::at(tmp.path().to_path_buf());

        let req = request("Газпром", SourceId::Vedomosti);
        let path = write_store(
            &run_dir,
            &req,
            &[
                record("Газпром", "https://v.ru/1", SourceId::Vedomosti),
                record("Газпром", "https://v.ru/2", SourceId::Vedomosti),
            ],
        )
        .await;
        let outcomes = vec![outcome(0, &req, TaskState::Succeeded, 2, Some(path), None)];

        let first = merge(&run_dir, &outcomes).await.unwrap();
        let bytes_first = std::fs::read(&first.artifact_path).unwrap();
        let second = merge(&run_dir, &outcomes).await.unwrap();
        let bytes_second = std::fs::read(&second.artifact_path).unwrap();
        assert_eq!(bytes_first, bytes_second);
    }

    #[tokio::test]
    async fn test_merge_includes_partials_and_names_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let run_dir = RunDir::at(tmp.path().to_path_buf());

        let req_ok = request("Газпром", SourceId::Vedomosti);
        let req_bad = request("Лукойл", SourceId::Kommersant);
        let path_ok = write_store(
            &run_dir,
            &req_ok,
            &[record("Газпром", "https://v.ru/1", SourceId::Vedomosti)],
        )
        .await;
        // The failed task still persisted one record before dying.
        let path_bad = write_store(
            &run_dir,
            &req_bad,
            &[record("Лукойл", "https://k.ru/doc/1", SourceId::Kommersant)],
        )
        .await;

        let outcomes = vec![
            outcome(0, &req_ok, TaskState::Succeeded, 1, Some(path_ok), None),
            outcome(
                1,
                &req_bad,
                TaskState::Failed,
                1,
                Some(path_bad),
                Some("parse error: article unreadable"),
            ),
        ];

        let summary = merge(&run_dir, &outcomes).await.unwrap();
        assert_eq!(summary.records_merged, 2);
        assert_eq!(summary.tasks_failed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].company, "Лукойл");
        assert_eq!(summary.failures[0].source, SourceId::Kommersant);
        assert!(summary.failures[0].error.contains("article unreadable"));
    }

    #[tokio::test]
    async fn test_merge_skips_malformed_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let run_dir = RunDir::at(tmp.path().to_path_buf());

        let req = request("Газпром", SourceId::Vedomosti);
        let path = write_store(
            &run_dir,
            &req,
            &[record("Газпром", "https://v.ru/1", SourceId::Vedomosti)],
        )
        .await;
        // Simulate a row truncated by a dying worker.
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("https://v.ru/2\t2022-03-01\ttruncated");
        std::fs::write(&path, content).unwrap();

        let outcomes = vec![outcome(0, &req, TaskState::Succeeded, 1, Some(path), None)];
        let summary = merge(&run_dir, &outcomes).await.unwrap();
        assert_eq!(summary.records_merged, 1);
    }
}
