//! Kommersant article source.
//!
//! Kommersant only exposes search results as HTML, and the listing carries
//! nothing but links, so this is the two-step source: discovery walks the
//! paginated search results collecting `/doc/…` links, then each article is
//! fetched and extracted individually.
//!
//! # Search quirk
//!
//! The search endpoint does not answer with results directly; it answers
//! with a page whose first anchor is a redirect to the actual result page.
//! Discovery follows that redirect on every result page.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use url::Url;

use crate::errors::ScrapeError;
use crate::fetch::FetchContext;
use crate::models::{ArticleRecord, ArticleReference, DateWindow, SourceId};
use crate::sources::DiscoverSource;
use crate::utils::clean_text;

const DEFAULT_BASE_URL: &str = "https://www.kommersant.ru";

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1.doc_header__name").unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("div.doc__body").unwrap());
static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static PUBLISH_TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time.doc_header__publish_time").unwrap());
static DOC_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/doc/\d+").unwrap());

pub struct Kommersant {
    base_url: String,
}

impl Default for Kommersant {
    fn default() -> Self {
        Kommersant {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Kommersant {
    /// Point the source at a different host (used by tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Kommersant {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DiscoverSource for Kommersant {
    fn id(&self) -> SourceId {
        SourceId::Kommersant
    }

    #[instrument(level = "info", skip(self, ctx), fields(source = "Kommersant"))]
    async fn search_news(
        &self,
        company: &str,
        window: DateWindow,
        ctx: &mut FetchContext,
    ) -> Result<Vec<ArticleReference>, ScrapeError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| ScrapeError::Config(format!("bad Kommersant base url: {e}")))?;
        let search_url = format!("{}/search/results", self.base_url);
        let mut seen = HashSet::new();
        let mut references = Vec::new();
        let mut page = 1u32;

        loop {
            let query = [
                ("search_query", company.to_string()),
                ("sort_type", "0".to_string()),
                ("search_full", "1".to_string()),
                ("time_range", "2".to_string()),
                ("dateStart", window.from.format("%Y-%m-%d").to_string()),
                ("dateEnd", window.to.format("%Y-%m-%d").to_string()),
                ("stamp", Utc::now().timestamp_millis().to_string()),
                ("page", page.to_string()),
            ];

            let search_html = ctx.get_text(&search_url, &query).await?;
            let redirect = extract_redirect(&search_html).ok_or_else(|| {
                ScrapeError::Parse("Kommersant search page has no redirect link".to_string())
            })?;

            let results_url = base.join(&redirect).map_err(|e| {
                ScrapeError::Parse(format!("Kommersant redirect link unusable: {e}"))
            })?;
            let results_html = ctx.get_text(results_url.as_str(), &[]).await?;
            let links = extract_doc_links(&results_html, company, &base);
            debug!(page, count = links.len(), "Kommersant result page scanned");

            if links.is_empty() {
                break;
            }
            let before = references.len();
            for reference in links {
                if seen.insert(reference.url.clone()) {
                    references.push(reference);
                }
            }
            // A non-empty page of only already-seen documents means the
            // pagination has stopped advancing.
            if references.len() == before {
                break;
            }
            page += 1;
        }

        info!(count = references.len(), company, "Kommersant discovery finished");
        Ok(references)
    }

    #[instrument(level = "debug", skip(self, ctx, reference), fields(url = %reference.url))]
    async fn parse_article(
        &self,
        company: &str,
        reference: &ArticleReference,
        ctx: &mut FetchContext,
    ) -> Result<ArticleRecord, ScrapeError> {
        let html = ctx.get_text(&reference.url, &[]).await?;
        let (title, body, published_at) = extract_article(&html, &reference.url)?;

        Ok(ArticleRecord {
            url: reference.url.clone(),
            published_at,
            body,
            title,
            source: SourceId::Kommersant,
            company: company.to_string(),
        })
    }
}

/// Pull the redirect target out of the search response: its first anchor.
fn extract_redirect(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// Collect `/doc/…` anchors that carry the company in their query string.
///
/// The site percent-encodes Cyrillic query values, so both the raw and the
/// encoded spelling are accepted. Relative hrefs are resolved against the
/// site root.
fn extract_doc_links(html: &str, company: &str, base: &Url) -> Vec<ArticleReference> {
    let encoded = format!("query={}", urlencoding::encode(company));
    let raw = format!("query={company}");

    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            if !DOC_LINK_RE.is_match(href) {
                return None;
            }
            if !href.contains(&encoded) && !href.contains(&raw) {
                return None;
            }
            let url = base.join(href).ok()?.to_string();
            let title = clean_text(&a.text().collect::<Vec<_>>().join(" "));
            Some(ArticleReference {
                url,
                title,
                published_at: None,
            })
        })
        .collect()
}

/// Extract (title, body, date) from one article page.
///
/// A page without a document body or publish time is structurally not an
/// article, so extraction fails rather than producing an empty record.
fn extract_article(html: &str, url: &str) -> Result<(String, String, NaiveDate), ScrapeError> {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|h| clean_text(&h.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default();

    let body_elem = document
        .select(&BODY_SELECTOR)
        .next()
        .ok_or_else(|| ScrapeError::Parse(format!("{url} has no document body")))?;
    let body = clean_text(
        &body_elem
            .select(&PARAGRAPH_SELECTOR)
            .map(|p| p.text().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join(" "),
    );

    let published_at = document
        .select(&PUBLISH_TIME_SELECTOR)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .and_then(|dt| dt.get(..10))
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .ok_or_else(|| ScrapeError::Parse(format!("{url} has no readable publish time")))?;

    Ok((title, body, published_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RetryPolicy;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // `&nbsp;` in the title checks NBSP normalization end to end.
    const ARTICLE_HTML: &str = r#"
        <html><body>
          <header>
            <h1 class="doc_header__name">Газпром&nbsp;и экология</h1>
            <time class="doc_header__publish_time" datetime="2022-05-17T12:30:00+03:00">17.05.2022</time>
          </header>
          <div class="doc__body">
            <p>Первый абзац о компании.</p>
            <p>Второй абзац.</p>
          </div>
        </body></html>
    "#;

    fn results_html(base: &str) -> String {
        format!(
            r#"<html><body>
                 <a href="{base}/doc/5363001?query=%D0%93%D0%B0%D0%B7%D0%BF%D1%80%D0%BE%D0%BC">Газпром снизил выбросы</a>
                 <a href="/doc/5363002?query=%D0%93%D0%B0%D0%B7%D0%BF%D1%80%D0%BE%D0%BC">Еще одна новость</a>
                 <a href="/doc/9999999?query=%D0%9B%D1%83%D0%BA%D0%BE%D0%B9%D0%BB">Про другую компанию</a>
                 <a href="/news/unrelated">Не документ</a>
               </body></html>"#
        )
    }

    #[test]
    fn test_extract_redirect() {
        let html = r#"<html><body><a href="/search/results_redirect?abc=1">go</a></body></html>"#;
        assert_eq!(
            extract_redirect(html).as_deref(),
            Some("/search/results_redirect?abc=1")
        );
        assert_eq!(extract_redirect("<html><body></body></html>"), None);
    }

    #[test]
    fn test_extract_doc_links_filters_company_and_pattern() {
        let links = extract_doc_links(
            &results_html("https://www.kommersant.ru"),
            "Газпром",
            &Url::parse("https://www.kommersant.ru").unwrap(),
        );
        assert_eq!(links.len(), 2);
        assert!(links[0].url.contains("/doc/5363001"));
        assert!(links[1].url.starts_with("https://www.kommersant.ru/doc/5363002"));
        assert_eq!(links[0].title, "Газпром снизил выбросы");
    }

    #[test]
    fn test_extract_article() {
        let (title, body, date) =
            extract_article(ARTICLE_HTML, "https://www.kommersant.ru/doc/5363001").unwrap();
        assert_eq!(title, "Газпром и экология");
        assert_eq!(body, "Первый абзац о компании. Второй абзац.");
        assert_eq!(date, NaiveDate::from_ymd_opt(2022, 5, 17).unwrap());
    }

    #[test]
    fn test_extract_article_without_body_fails() {
        let html = r#"<html><body><h1 class="doc_header__name">Заголовок</h1></body></html>"#;
        let err = extract_article(html, "https://example.com/doc/1").unwrap_err();
        assert!(matches!(err, ScrapeError::Parse(_)));
    }

    #[tokio::test]
    async fn test_search_news_walks_redirect_and_pages() {
        let server = MockServer::start().await;
        let redirect_html =
            r#"<html><body><a href="/search/found">results</a></body></html>"#;

        Mock::given(method("GET"))
            .and(path("/search/results"))
            .and(query_param("search_query", "Газпром"))
            .respond_with(ResponseTemplate::new(200).set_body_string(redirect_html))
            .mount(&server)
            .await;
        // First result page has links, the second is empty, ending discovery.
        Mock::given(method("GET"))
            .and(path("/search/found"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(results_html(&server.uri())),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/found"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body></body></html>".to_string()),
            )
            .mount(&server)
            .await;

        let source = Kommersant::with_base_url(server.uri());
        let mut ctx = FetchContext::new(RetryPolicy {
            jitter_ms: 0,
            ..RetryPolicy::default()
        })
        .unwrap();
        let window = DateWindow::full_year(2022).unwrap();

        let references = source
            .search_news("Газпром", window, &mut ctx)
            .await
            .unwrap();
        assert_eq!(references.len(), 2);
    }

    #[tokio::test]
    async fn test_search_news_stops_when_pagination_repeats() {
        let server = MockServer::start().await;
        let redirect_html =
            r#"<html><body><a href="/search/found">results</a></body></html>"#;

        Mock::given(method("GET"))
            .and(path("/search/results"))
            .respond_with(ResponseTemplate::new(200).set_body_string(redirect_html))
            .mount(&server)
            .await;
        // Every result page is identical and non-empty, as when the site
        // ignores the page parameter.
        Mock::given(method("GET"))
            .and(path("/search/found"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(results_html(&server.uri())),
            )
            .mount(&server)
            .await;

        let source = Kommersant::with_base_url(server.uri());
        let mut ctx = FetchContext::new(RetryPolicy {
            jitter_ms: 0,
            ..RetryPolicy::default()
        })
        .unwrap();
        let window = DateWindow::full_year(2022).unwrap();

        let references = source
            .search_news("Газпром", window, &mut ctx)
            .await
            .unwrap();
        assert_eq!(references.len(), 2, "repeated pages must not loop forever");
    }

    #[tokio::test]
    async fn test_parse_article_extracts_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc/5363001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE_HTML))
            .mount(&server)
            .await;

        let source = Kommersant::with_base_url(server.uri());
        let mut ctx = FetchContext::new(RetryPolicy {
            jitter_ms: 0,
            ..RetryPolicy::default()
        })
        .unwrap();
        let reference = ArticleReference {
            url: format!("{}/doc/5363001", server.uri()),
            title: "Газпром и экология".to_string(),
            published_at: None,
        };

        let record = source
            .parse_article("Газпром", &reference, &mut ctx)
            .await
            .unwrap();
        assert_eq!(record.source, SourceId::Kommersant);
        assert_eq!(record.company, "Газпром");
        assert_eq!(record.title, "Газпром и экология");
        assert_eq!(
            record.published_at,
            NaiveDate::from_ymd_opt(2022, 5, 17).unwrap()
        );
    }
}
