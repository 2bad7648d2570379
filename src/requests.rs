//! Reading the external request table.
//!
//! The request list is a flat comma-separated table maintained outside this
//! tool, one row per company: `company,2-digit year,active flag,source-type`.
//! Rows are kept when the source-type column carries the literal news marker
//! (`Новости`); any other source-type means the row belongs to a different
//! monitoring pipeline and is excluded entirely. The active flag (`TRUE`)
//! decides whether the row's requests are scheduled.
//!
//! Each kept row fans out into one [`Request`] per registered source, so a
//! single company/year line drives all three news sites.

use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::errors::ScrapeError;
use crate::models::{Request, SourceId};

/// Source-type marker of rows meant for news scraping.
const NEWS_SOURCE_TYPE: &str = "Новости";

/// Read the request table and expand it into per-source requests.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_requests(path: &Path) -> Result<Vec<Request>, ScrapeError> {
    let content = fs::read_to_string(path).await?;
    let requests = parse_requests(&content);
    info!(count = requests.len(), "Read request table");
    Ok(requests)
}

fn parse_requests(content: &str) -> Vec<Request> {
    let mut requests = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [company, year, active_flag, source_type] = fields[..] else {
            warn!(lineno = lineno + 1, "Skipping malformed request row");
            continue;
        };
        if source_type != NEWS_SOURCE_TYPE {
            continue;
        }
        let Ok(year) = year.parse::<u8>() else {
            warn!(lineno = lineno + 1, year, "Skipping row with unreadable year");
            continue;
        };
        let active = active_flag.eq_ignore_ascii_case("true");

        for source in SourceId::ALL {
            requests.push(Request {
                company: company.to_string(),
                year,
                source,
                active,
            });
        }
    }
    requests
}
