//! SQLite-backed deduplicating news store.
//!
//! The `news` table carries a `UNIQUE` constraint on `url`, and every record is
//! written with a single `INSERT ... ON CONFLICT(url) DO NOTHING` statement.
//! The existence check and the insert are therefore one atomic step performed
//! by SQLite itself, so two overlapping batches can never both insert the same
//! URL. `id` (`AUTOINCREMENT`, never reused) and `created_at` are assigned in
//! that same statement.
//!
//! # Schema
//!
//! ```text
//! news
//! ├── id            INTEGER PRIMARY KEY AUTOINCREMENT
//! ├── title         TEXT NOT NULL
//! ├── content       TEXT
//! ├── source        TEXT NOT NULL
//! ├── url           TEXT NOT NULL UNIQUE
//! ├── published_at  DATETIME
//! └── created_at    DATETIME NOT NULL
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::utils::truncate_for_log;
use crate::models::{
    CandidateRecord, InsertReport, NewsFilter, NewsStats, SourceStat, StoredRecord,
};

/// Result of trying to insert one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same URL already exists; nothing was written.
    Duplicate,
    /// The candidate lacks a URL or title and cannot be stored.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct NewsStore {
    pool: SqlitePool,
}

impl NewsStore {
    /// Open (creating if needed) the database at `database_url`.
    ///
    /// `sqlite::memory:` is supported for tests; it is pinned to a single
    /// long-lived connection so the database survives between queries.
    #[instrument(level = "info", skip_all, fields(database_url = %database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(10)
        };
        let pool = pool_options.connect_with(options).await?;

        info!("Connected to news database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the table and indexes if they don't exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT,
                source TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                published_at DATETIME,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_news_source ON news (source)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_news_created_at ON news (created_at)")
            .execute(&self.pool)
            .await?;

        info!("News schema ready");
        Ok(())
    }

    /// Insert `record` unless its URL is already stored.
    pub async fn insert_one(&self, record: &CandidateRecord) -> Result<InsertOutcome> {
        if record.url.trim().is_empty() || record.title.trim().is_empty() {
            debug!(
                source = %record.source,
                title = %truncate_for_log(&record.title, 80),
                "Rejecting candidate without url or title"
            );
            return Ok(InsertOutcome::Rejected);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO news (title, content, source, url, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&record.title)
        .bind(&record.content)
        .bind(&record.source)
        .bind(&record.url)
        .bind(record.published_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    /// Insert every candidate whose URL is new.
    ///
    /// Never fails as a whole: a storage error on one record is logged and
    /// counted in [`InsertReport::failed`], and the batch continues.
    #[instrument(level = "info", skip_all, fields(candidates = records.len()))]
    pub async fn insert_batch(&self, records: Vec<CandidateRecord>) -> InsertReport {
        let mut report = InsertReport::default();
        for record in &records {
            match self.insert_one(record).await {
                Ok(InsertOutcome::Inserted) => report.inserted += 1,
                Ok(InsertOutcome::Duplicate) => report.duplicates += 1,
                Ok(InsertOutcome::Rejected) => report.rejected += 1,
                Err(e) => {
                    warn!(url = %record.url, source = %record.source, error = %e, "Failed to store record");
                    report.failed += 1;
                }
            }
        }
        info!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            rejected = report.rejected,
            failed = report.failed,
            "Batch stored"
        );
        report
    }

    /// Records matching `filter`, newest first, `limit` per page.
    ///
    /// `page` is 1-based; pages past the end come back empty.
    pub async fn list(&self, filter: &NewsFilter, page: u32, limit: u32) -> Result<Vec<StoredRecord>> {
        let offset = i64::from(page.max(1) - 1) * i64::from(limit);

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, title, content, source, url, published_at, created_at FROM news",
        );
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(offset);

        Ok(qb
            .build_query_as::<StoredRecord>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Number of records matching `filter`.
    pub async fn count(&self, filter: &NewsFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM news");
        push_filter(&mut qb, filter);
        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    /// Distinct source labels, alphabetically.
    pub async fn sources(&self) -> Result<Vec<String>> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT DISTINCT source FROM news ORDER BY source")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn stats(&self) -> Result<NewsStats> {
        let total_news = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news")
            .fetch_one(&self.pool)
            .await?;

        let source_stats = sqlx::query_as::<_, SourceStat>(
            "SELECT source, COUNT(*) AS count FROM news GROUP BY source ORDER BY count DESC, source ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let last_update = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM news ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(NewsStats {
            total_news,
            source_stats,
            last_update,
        })
    }

    /// Cheap round trip used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &NewsFilter) {
    qb.push(" WHERE 1=1");
    if let Some(source) = &filter.source {
        qb.push(" AND source = ").push_bind(source.clone());
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR content LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

/// Escape `LIKE` wildcards so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
