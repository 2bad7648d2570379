//! Forbes article source.
//!
//! Forbes serves search results from a JSON API that includes the article
//! body in the listing, so this is a one-step source like
//! [`super::vedomosti`]. The API pages with an offset/limit scheme (8 per
//! page) and filters by epoch-second publication bounds.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::ScrapeError;
use crate::fetch::FetchContext;
use crate::models::{ArticleRecord, DateWindow, SourceId};
use crate::sources::ListingSource;
use crate::utils::clean_text;

const PAGE_LIMIT: u32 = 8;
const DEFAULT_BASE_URL: &str = "https://www.forbes.ru/";
const DEFAULT_SEARCH_URL: &str = "https://www.forbes.ru/api/pub/search";

pub struct Forbes {
    base_url: String,
    search_url: String,
}

impl Default for Forbes {
    fn default() -> Self {
        Forbes {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

impl Forbes {
    /// Point the source at a different host (used by tests).
    pub fn with_urls(base_url: impl Into<String>, search_url: impl Into<String>) -> Self {
        Forbes {
            base_url: base_url.into(),
            search_url: search_url.into(),
        }
    }
}

#[async_trait]
impl ListingSource for Forbes {
    fn id(&self) -> SourceId {
        SourceId::Forbes
    }

    #[instrument(level = "debug", skip(self, ctx), fields(source = "Forbes"))]
    async fn parse_page(
        &self,
        company: &str,
        window: DateWindow,
        page: u32,
        ctx: &mut FetchContext,
    ) -> Result<Vec<ArticleRecord>, ScrapeError> {
        let start = window
            .from
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        let end = window
            .to
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();

        let query = [
            ("list[offset]", (page * PAGE_LIMIT).to_string()),
            ("list[limit]", PAGE_LIMIT.to_string()),
            ("search[term]", company.to_string()),
            ("search[type]", "news".to_string()),
            ("search[sort]", "date_asc".to_string()),
            ("search[start]", start.to_string()),
            ("search[end]", end.to_string()),
        ];

        let payload = ctx.get_json(&self.search_url, &query).await?;
        let records = records_from_payload(&payload, company, &self.base_url)?;
        debug!(page, count = records.len(), "Forbes page parsed");
        Ok(records)
    }
}

/// Extract records from one search API payload. Hits live under `results[]`;
/// `url_alias` is relative to the site root and `time` is an epoch second.
fn records_from_payload(
    payload: &Value,
    company: &str,
    base_url: &str,
) -> Result<Vec<ArticleRecord>, ScrapeError> {
    let results = payload["results"]
        .as_array()
        .ok_or_else(|| ScrapeError::Parse("Forbes payload has no 'results' array".to_string()))?;

    let mut records = Vec::with_capacity(results.len());
    for item in results {
        let alias = item["url_alias"]
            .as_str()
            .ok_or_else(|| ScrapeError::Parse("Forbes hit has no url_alias".to_string()))?;
        let published_at = item["time"]
            .as_i64()
            .and_then(date_from_epoch)
            .ok_or_else(|| {
                ScrapeError::Parse(format!("Forbes hit {alias} has unreadable time"))
            })?;

        records.push(ArticleRecord {
            url: format!("{base_url}{alias}"),
            published_at,
            body: clean_text(item["body"].as_str().unwrap_or_default()),
            title: clean_text(item["title"].as_str().unwrap_or_default()),
            source: SourceId::Forbes,
            company: company.to_string(),
        });
    }
    Ok(records)
}

fn date_from_epoch(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}
