//! Data models shared by the extractors, the store and the HTTP API.
//!
//! - [`CandidateRecord`]: an item produced by one extractor run, not yet persisted
//! - [`StoredRecord`]: a persisted, URL-unique row of the `news` table
//! - [`NewsFilter`], [`NewsPage`]: the paginated read contract
//! - [`NewsStats`], [`SourceStat`]: aggregate counters for the stats endpoint
//! - [`InsertReport`], [`CycleSummary`]: outcome of one ingestion cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A news item as scraped from a listing page, before deduplication.
///
/// # Fields
///
/// * `title` - Headline text, whitespace-normalized
/// * `content` - Article body or the source's placeholder text, already capped
/// * `source` - Stable label of the extractor that produced it
/// * `url` - Absolute article address, the deduplication key
/// * `published_at` - Best-effort publication time (ingestion time when unknown)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub title: String,
    pub content: String,
    pub source: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// A persisted news item.
///
/// `id` and `created_at` are assigned by the store on first insertion of a
/// given `url` and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub source: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Optional filters applied to list and count queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsFilter {
    /// Exact match on the `source` label.
    pub source: Option<String>,
    /// Case-insensitive substring matched against title or content.
    pub search: Option<String>,
}

impl NewsFilter {
    /// Build a filter from raw query values, treating blank strings as absent.
    pub fn new(source: Option<String>, search: Option<String>) -> Self {
        fn non_blank(s: Option<String>) -> Option<String> {
            s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            source: non_blank(source),
            search: non_blank(search),
        }
    }
}

/// One page of records plus the totals needed to render pagination.
#[derive(Debug, Serialize)]
pub struct NewsPage {
    pub data: Vec<StoredRecord>,
    pub total: i64,
    pub page: u32,
    pub pages: i64,
}

/// Number of pages needed to show `total` records `limit` at a time.
///
/// Returns `0` when there is nothing to show.
pub fn page_count(total: i64, limit: u32) -> i64 {
    if total <= 0 || limit == 0 {
        return 0;
    }
    let limit = i64::from(limit);
    (total + limit - 1) / limit
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SourceStat {
    pub source: String,
    pub count: i64,
}

/// Aggregate counters served by the stats endpoint.
#[derive(Debug, Serialize)]
pub struct NewsStats {
    pub total_news: i64,
    pub source_stats: Vec<SourceStat>,
    /// Newest `created_at` across all records, `None` for an empty store.
    pub last_update: Option<DateTime<Utc>>,
}

/// Per-batch insertion counters.
///
/// Duplicates and rejected records are expected steady-state outcomes, not
/// failures; only `failed` reflects an unexpected storage error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => f.write_str("scheduled"),
            Trigger::Manual => f.write_str("manual"),
        }
    }
}

/// Outcome of one fetch-then-store cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub trigger: Trigger,
    /// Candidates returned by all extractors together.
    pub fetched: usize,
    pub report: InsertReport,
    pub elapsed: Duration,
}

impl CycleSummary {
    pub fn inserted(&self) -> usize {
        self.report.inserted
    }
}
