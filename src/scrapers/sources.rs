//! Source definitions: the built-in finance feeds and YAML-loaded ones.
//!
//! A source file is a YAML list of [`SourceConfig`] entries:
//!
//! ```yaml
//! - name: 界面新闻
//!   listing_url: https://www.jiemian.com/lists/48.html
//!   base_url: https://www.jiemian.com/
//!   item_selector: div.news-el
//!   placeholder: 界面新闻财经报道
//! - name: 东方财富网
//!   listing_url: https://finance.eastmoney.com/news/cywjh.html
//!   item_selector: p.title
//!   limit: 10
//!   placeholder: 暂无详细内容
//!   detail:
//!     content_selector: div.newsContent
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::{Error, Result};

fn default_link_selector() -> String {
    "a".to_string()
}

fn default_limit() -> usize {
    10
}

/// Declarative description of one listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Label stored in the `source` column.
    pub name: String,
    /// Page holding the list of recent articles.
    pub listing_url: String,
    /// Address relative links are resolved against; the listing URL when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Selects one element per article entry.
    pub item_selector: String,
    /// Selects the anchor inside an entry. An entry that is itself an anchor
    /// is used directly.
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    /// Only the first `limit` entries of the page are considered.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Content stored when no article body is fetched or found.
    #[serde(default)]
    pub placeholder: String,
    /// Fetch each article page for its body.
    #[serde(default)]
    pub detail: Option<DetailConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailConfig {
    /// Selects the element holding the article body on the article page.
    pub content_selector: String,
}

impl SourceConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(&self.listing_url)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config(format!(
                "source for {} has an empty name",
                self.listing_url
            )));
        }
        if self.limit == 0 {
            return Err(Error::Config(format!("source {} has limit 0", self.name)));
        }
        Ok(())
    }
}

/// The four finance feeds scraped out of the box.
///
/// Only 东方财富网 fetches article bodies; the others store their placeholder.
pub fn builtin_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "东方财富网".to_string(),
            listing_url: "https://finance.eastmoney.com/news/cywjh.html".to_string(),
            base_url: Some("https://finance.eastmoney.com/".to_string()),
            item_selector: "p.title".to_string(),
            link_selector: default_link_selector(),
            limit: default_limit(),
            placeholder: "暂无详细内容".to_string(),
            detail: Some(DetailConfig {
                content_selector: "div.newsContent".to_string(),
            }),
        },
        SourceConfig {
            name: "新浪财经".to_string(),
            listing_url: "https://finance.sina.com.cn/roll/index.d.html?cid=56247".to_string(),
            base_url: Some("https://finance.sina.com.cn/".to_string()),
            item_selector: "li".to_string(),
            link_selector: default_link_selector(),
            limit: default_limit(),
            placeholder: "新浪财经新闻".to_string(),
            detail: None,
        },
        SourceConfig {
            name: "财经网".to_string(),
            listing_url: "http://www.caijing.com.cn/".to_string(),
            base_url: Some("http://www.caijing.com.cn/".to_string()),
            item_selector: "h3.title".to_string(),
            link_selector: default_link_selector(),
            limit: default_limit(),
            placeholder: "财经网新闻".to_string(),
            detail: None,
        },
        SourceConfig {
            name: "界面新闻".to_string(),
            listing_url: "https://www.jiemian.com/lists/48.html".to_string(),
            base_url: Some("https://www.jiemian.com/".to_string()),
            item_selector: "div.news-el".to_string(),
            link_selector: default_link_selector(),
            limit: default_limit(),
            placeholder: "界面新闻财经报道".to_string(),
            detail: None,
        },
    ]
}

/// Parse a YAML list of sources and check it is usable.
pub fn parse_sources(yaml: &str) -> Result<Vec<SourceConfig>> {
    let configs: Vec<SourceConfig> = serde_yaml::from_str(yaml)?;
    if configs.is_empty() {
        return Err(Error::Config("sources file lists no sources".to_string()));
    }

    let mut seen = HashSet::new();
    for config in &configs {
        config.validate()?;
        if !seen.insert(config.name.as_str()) {
            return Err(Error::Config(format!("duplicate source name {}", config.name)));
        }
    }
    Ok(configs)
}

/// Load source definitions from a YAML file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_sources(path: &Path) -> Result<Vec<SourceConfig>> {
    let yaml = fs::read_to_string(path).await?;
    let configs = parse_sources(&yaml)?;
    info!(count = configs.len(), "Loaded source definitions");
    Ok(configs)
}
