//! Vedomosti article source.
//!
//! Vedomosti exposes a JSON search API that returns article text directly in
//! the listing payload, so this source is one-step: no per-article fetch is
//! needed. Results are paged with an offset/limit scheme (20 per page); the
//! sequence ends at the first empty page.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::ScrapeError;
use crate::fetch::FetchContext;
use crate::models::{ArticleRecord, DateWindow, SourceId};
use crate::sources::ListingSource;
use crate::utils::clean_text;
use async_trait::async_trait;

const PAGE_LIMIT: u32 = 20;

const DEFAULT_SEARCH_URL: &str = "https://api.vedomosti.ru/v2/documents/search";

pub struct Vedomosti {
    search_url: String,
}

impl Default for Vedomosti {
    fn default() -> Self {
        Vedomosti {
            search_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

impl Vedomosti {
    /// Point the source at a different search endpoint (used by tests).
    pub fn with_search_url(search_url: impl Into<String>) -> Self {
        Vedomosti {
            search_url: search_url.into(),
        }
    }
}

#[async_trait]
impl ListingSource for Vedomosti {
    fn id(&self) -> SourceId {
        SourceId::Vedomosti
    }

    #[instrument(level = "debug", skip(self, ctx), fields(source = "Vedomosti"))]
    async fn parse_page(
        &self,
        company: &str,
        window: DateWindow,
        page: u32,
        ctx: &mut FetchContext,
    ) -> Result<Vec<ArticleRecord>, ScrapeError> {
        let query = [
            ("query", company.to_string()),
            ("sort", "date".to_string()),
            ("material_types", "news".to_string()),
            ("date_from", window.from.format("%Y-%m-%d").to_string()),
            ("date_to", window.to.format("%Y-%m-%d").to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("from", (page * PAGE_LIMIT).to_string()),
        ];

        let payload = ctx.get_json(&self.search_url, &query).await?;
        let records = records_from_payload(&payload, company)?;
        debug!(page, count = records.len(), "Vedomosti page parsed");
        Ok(records)
    }
}

/// Extract records from one search API payload.
///
/// The payload carries hits under `found[].source`; an absent or non-array
/// `found` means the listing structure changed, which is a parse error
/// (distinct from a present-but-empty `found`).
fn records_from_payload(payload: &Value, company: &str) -> Result<Vec<ArticleRecord>, ScrapeError> {
    let found = payload["found"]
        .as_array()
        .ok_or_else(|| ScrapeError::Parse("Vedomosti payload has no 'found' array".to_string()))?;

    let mut records = Vec::with_capacity(found.len());
    for item in found {
        let source = &item["source"];
        let url = source["url"]
            .as_str()
            .ok_or_else(|| ScrapeError::Parse("Vedomosti hit has no url".to_string()))?
            .to_string();
        let title = clean_text(source["title"].as_str().unwrap_or_default());
        let body = clean_text(&text_of(&source["boxes"]));
        let published_at = parse_date(source["published_at"].as_str().unwrap_or_default())
            .ok_or_else(|| {
                ScrapeError::Parse(format!("Vedomosti hit {url} has unreadable published_at"))
            })?;

        records.push(ArticleRecord {
            url,
            published_at,
            body,
            title,
            source: SourceId::Vedomosti,
            company: company.to_string(),
        });
    }
    Ok(records)
}

/// The `boxes` field is article text, served either as one string or as an
/// array of text fragments depending on the material.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Dates arrive as RFC 3339-ish timestamps; only the `YYYY-MM-DD` prefix is
/// meaningful for the output.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}
