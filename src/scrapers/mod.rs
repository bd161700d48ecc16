//! News source extractors.
//!
//! Every source is scraped the same way: fetch one listing page, locate the
//! entries, read each entry's headline and link, resolve the link, and
//! optionally fetch the article page for its body. The only thing that differs
//! per site is a handful of CSS selectors, so a source is described by a
//! [`SourceConfig`] value and run by the generic [`SelectorExtractor`].
//!
//! # Built-in Sources
//!
//! | Source | Listing | Detail fetch |
//! |--------|---------|--------------|
//! | 东方财富网 | `p.title` entries | yes, `div.newsContent` |
//! | 新浪财经 | `li` entries | no |
//! | 财经网 | `h3.title` entries | no |
//! | 界面新闻 | `div.news-el` entries | no |
//!
//! Extra or replacement sources can be loaded from a YAML file, see
//! [`sources::load_sources`].
//!
//! # Failure Isolation
//!
//! [`Extractor::extract`] is fallible; [`Extractor::fetch`] wraps it and turns
//! any error into an empty result with a warning, so one broken site never
//! aborts a cycle.

pub mod selector;
pub mod sources;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::CandidateRecord;

pub use selector::SelectorExtractor;
pub use sources::{DetailConfig, SourceConfig};

/// Browser-like user agent; several of the listing pages serve an empty
/// shell to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// A per-source fetch-and-parse unit.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Stable label stored with every record this extractor produces.
    fn source(&self) -> &str;

    /// Fetch the listing page and turn it into candidates.
    async fn extract(&self) -> Result<Vec<CandidateRecord>>;

    /// [`extract`](Extractor::extract) with failures degraded to zero candidates.
    async fn fetch(&self) -> Vec<CandidateRecord> {
        match self.extract().await {
            Ok(records) => records,
            Err(e) => {
                warn!(source = %self.source(), error = %e, "Extraction failed; source contributes no candidates");
                Vec::new()
            }
        }
    }
}

/// Ordered set of extractors run by each cycle.
///
/// Registration order is the order in which sources are fetched and in which
/// their candidates appear in the merged result.
#[derive(Default)]
pub struct SourceRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one [`SelectorExtractor`] per config, sharing a single HTTP client.
    pub fn from_configs(
        configs: Vec<SourceConfig>,
        client: reqwest::Client,
        content_max_chars: usize,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let extractor = SelectorExtractor::new(config, client.clone(), content_max_chars)?;
            registry.register(Box::new(extractor));
        }
        info!(sources = ?registry.names(), "Source registry built");
        Ok(registry)
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.source().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Extractor> {
        self.extractors.iter().map(|e| e.as_ref())
    }
}

/// Shared HTTP client for all extractors.
///
/// The timeout applies to every request, listing and detail alike, and is the
/// only thing that stops a hung upstream from stalling a cycle.
pub fn build_http_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(user_agent)
        .map_err(|e| Error::Config(format!("user agent is not a valid header value: {e}")))?;
    headers.insert(USER_AGENT, agent);

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()?)
}
