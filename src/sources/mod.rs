//! Source parsers for discovering and extracting company news.
//!
//! Each supported news source implements one of two capability shapes,
//! depending on how much the site exposes at listing time:
//!
//! | Source | Module | Shape | Notes |
//! |--------|--------|-------|-------|
//! | Vedomosti | [`vedomosti`] | one-step | JSON search API returns full article text in the listing |
//! | Forbes | [`forbes`] | one-step | JSON search API returns full article text in the listing |
//! | Kommersant | [`kommersant`] | two-step | HTML search results, one extra fetch per article |
//!
//! # Capability contract
//!
//! - [`DiscoverSource`] (two-step): `search_news` yields candidate
//!   [`ArticleReference`]s for a company and date window, `parse_article`
//!   turns one reference into an [`ArticleRecord`]. Zero references is a
//!   normal outcome; an unreadable listing is a parse error.
//! - [`ListingSource`] (one-step): `parse_page` yields one page of
//!   fully-populated records per call; an empty page ends the sequence.
//!   Pages are pulled one at a time so records can be persisted as they
//!   arrive.
//!
//! [`SourceParser`] is the tagged union over both shapes, resolved once per
//! task by [`registry`]. The mapping is an explicit `match` over the closed
//! [`SourceId`] enum; there is no dynamic registration.
//!
//! All outbound fetches go through the task's [`FetchContext`] so rate
//! limiting and retry behave identically across sources.

use async_trait::async_trait;

use crate::errors::ScrapeError;
use crate::fetch::FetchContext;
use crate::models::{ArticleRecord, ArticleReference, DateWindow, SourceId};

pub mod forbes;
pub mod kommersant;
pub mod vedomosti;

/// Two-step capability: discover candidate articles, then extract each one
/// with a dedicated fetch.
#[async_trait]
pub trait DiscoverSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Discover candidate articles for `company` within `window`.
    ///
    /// Returns an empty vector when the source has nothing for the query
    /// (not a failure), and `ScrapeError::Parse` when the listing structure
    /// itself cannot be read. Each call re-queries the site.
    async fn search_news(
        &self,
        company: &str,
        window: DateWindow,
        ctx: &mut FetchContext,
    ) -> Result<Vec<ArticleReference>, ScrapeError>;

    /// Fetch and extract one article.
    async fn parse_article(
        &self,
        company: &str,
        reference: &ArticleReference,
        ctx: &mut FetchContext,
    ) -> Result<ArticleRecord, ScrapeError>;
}

/// One-step capability for sources whose listing already carries everything
/// an [`ArticleRecord`] needs.
///
/// The record sequence is consumed page by page: callers request page 0, 1,
/// 2, ... until a page comes back empty.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Fetch one page of records for `company` within `window`.
    async fn parse_page(
        &self,
        company: &str,
        window: DateWindow,
        page: u32,
        ctx: &mut FetchContext,
    ) -> Result<Vec<ArticleRecord>, ScrapeError>;
}

/// A resolved source implementation: either shape, behind one tag.
pub enum SourceParser {
    TwoStep(Box<dyn DiscoverSource>),
    OneStep(Box<dyn ListingSource>),
}

impl SourceParser {
    pub fn id(&self) -> SourceId {
        match self {
            SourceParser::TwoStep(s) => s.id(),
            SourceParser::OneStep(s) => s.id(),
        }
    }
}

/// Resolve a source identifier to the parser responsible for it.
///
/// Total over [`SourceId`]: every request the scheduler accepts can be
/// served.
pub fn registry(source: SourceId) -> SourceParser {
    match source {
        SourceId::Vedomosti => SourceParser::OneStep(Box::new(vedomosti::Vedomosti::default())),
        SourceId::Kommersant => {
            SourceParser::TwoStep(Box::new(kommersant::Kommersant::default()))
        }
        SourceId::Forbes => SourceParser::OneStep(Box::new(forbes::Forbes::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_total_and_consistent() {
        for source in SourceId::ALL {
            let parser = registry(source);
            assert_eq!(parser.id(), source);
        }
    }

    #[test]
    fn test_registry_shapes() {
        assert!(matches!(
            registry(SourceId::Vedomosti),
            SourceParser::OneStep(_)
        ));
        assert!(matches!(
            registry(SourceId::Forbes),
            SourceParser::OneStep(_)
        ));
        assert!(matches!(
            registry(SourceId::Kommersant),
            SourceParser::TwoStep(_)
        ));
    }
}
