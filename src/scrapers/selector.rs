//! Generic listing-page extractor driven by a [`SourceConfig`].
//!
//! # Flow
//!
//! 1. GET the listing page
//! 2. Take the first `limit` elements matching `item_selector`
//! 3. Read the headline text and `href` of each entry's anchor, resolve the link
//! 4. When `detail` is configured, GET each article page and read its body;
//!    a failed or empty detail fetch keeps the entry with placeholder content
//!
//! HTML parsing happens in plain functions ([`parse_listing`], [`parse_detail`])
//! so the non-`Send` DOM never lives across an `.await`.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{Extractor, SourceConfig};
use crate::error::{Error, Result};
use crate::models::CandidateRecord;
use crate::utils::{normalize_whitespace, resolve_url, truncate_content};

/// Headline and absolute link of one listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub title: String,
    pub url: String,
}

/// Extractor for any source describable by CSS selectors.
#[derive(Debug)]
pub struct SelectorExtractor {
    config: SourceConfig,
    base: Url,
    client: reqwest::Client,
    content_max_chars: usize,
}

impl SelectorExtractor {
    /// Validate the config (name, limit, base address, selectors) and build
    /// the extractor.
    pub fn new(
        config: SourceConfig,
        client: reqwest::Client,
        content_max_chars: usize,
    ) -> Result<Self> {
        config.validate()?;
        let base = Url::parse(config.base_url())?;
        Url::parse(&config.listing_url)?;
        parse_selector(&config.item_selector)?;
        parse_selector(&config.link_selector)?;
        if let Some(detail) = &config.detail {
            parse_selector(&detail.content_selector)?;
        }

        Ok(Self {
            config,
            base,
            client,
            content_max_chars,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Article body for `url`, or `None` when the page can't be fetched or
    /// holds no matching content.
    #[instrument(level = "debug", skip(self), fields(source = %self.config.name))]
    async fn fetch_detail(&self, url: &str) -> Option<String> {
        let detail = self.config.detail.as_ref()?;
        match self.get_text(url).await {
            Ok(body) => match parse_detail(&body, &detail.content_selector) {
                Ok(content) => content,
                Err(e) => {
                    warn!(%url, error = %e, "Could not parse article page");
                    None
                }
            },
            Err(e) => {
                warn!(%url, error = %e, "Article fetch failed; keeping placeholder content");
                None
            }
        }
    }

    fn candidate(&self, entry: ListingEntry, content: Option<String>) -> CandidateRecord {
        let content = content.unwrap_or_else(|| self.config.placeholder.clone());
        CandidateRecord {
            title: entry.title,
            content: truncate_content(&content, self.content_max_chars),
            source: self.config.name.clone(),
            url: entry.url,
            published_at: Some(Utc::now()),
        }
    }
}

#[async_trait]
impl Extractor for SelectorExtractor {
    fn source(&self) -> &str {
        &self.config.name
    }

    #[instrument(level = "info", skip_all, fields(source = %self.config.name))]
    async fn extract(&self) -> Result<Vec<CandidateRecord>> {
        let html = self.get_text(&self.config.listing_url).await?;
        let entries = parse_listing(&html, &self.config, &self.base)?;
        debug!(entries = ?entries, "Parsed listing entries");

        let records: Vec<CandidateRecord> = stream::iter(entries)
            .then(|entry| async move {
                let content = if self.config.detail.is_some() {
                    self.fetch_detail(&entry.url).await
                } else {
                    None
                };
                self.candidate(entry, content)
            })
            .collect()
            .await;

        info!(
            count = records.len(),
            listing = %self.config.listing_url,
            "Extracted candidates"
        );
        Ok(records)
    }
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Read the first `config.limit` entries off a listing page.
///
/// Entries without an anchor, without an `href`, with an unresolvable link or
/// with an empty headline are skipped; they still count toward the limit.
pub fn parse_listing(html: &str, config: &SourceConfig, base: &Url) -> Result<Vec<ListingEntry>> {
    let item_selector = parse_selector(&config.item_selector)?;
    let link_selector = parse_selector(&config.link_selector)?;
    let document = Html::parse_document(html);

    let mut entries = Vec::new();
    for item in document.select(&item_selector).take(config.limit) {
        let Some(link) = find_link(item, &link_selector) else {
            continue;
        };
        let Some(href) = link.value().attr("href").filter(|h| !h.trim().is_empty()) else {
            continue;
        };
        let title = normalize_whitespace(&link.text().collect::<String>());
        if title.is_empty() {
            continue;
        }
        match resolve_url(base, href) {
            Ok(url) => entries.push(ListingEntry { title, url }),
            Err(e) => debug!(%href, error = %e, "Skipping entry with unresolvable link"),
        }
    }
    Ok(entries)
}

fn find_link<'a>(item: ElementRef<'a>, link_selector: &Selector) -> Option<ElementRef<'a>> {
    if item.value().name() == "a" {
        return Some(item);
    }
    item.select(link_selector).next()
}

/// Body text of the first element matching `content_selector`, if non-empty.
pub fn parse_detail(html: &str, content_selector: &str) -> Result<Option<String>> {
    let selector = parse_selector(content_selector)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty()))
}
