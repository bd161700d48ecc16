//! Command-line interface definitions for the news hub.
//!
//! Every option can also be supplied through the environment variable named
//! next to it, which is how the service is usually configured in containers.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::DEFAULT_SOURCE_DELAY;
use crate::scheduler::DEFAULT_INTERVAL;
use crate::scrapers::DEFAULT_USER_AGENT;

/// Command-line arguments for the news hub server.
///
/// # Examples
///
/// ```sh
/// # Defaults: sqlite:finance_news.db, port 5000, hourly crawl
/// finance_news_hub
///
/// # Custom database, crawl every 15 minutes, sources from YAML
/// finance_news_hub --database-url sqlite:/var/lib/news/news.db \
///     --interval-secs 900 --sources ./sources.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:finance_news.db")]
    pub database_url: String,

    /// Address to bind the HTTP API to
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP API
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Seconds between scheduled crawl cycles
    #[arg(long, env = "CRAWL_INTERVAL_SECS", default_value_t = DEFAULT_INTERVAL.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: u64,

    /// Per-request timeout for listing and article fetches, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout_secs: u64,

    /// Pause between two sources within one cycle, in milliseconds
    #[arg(long, env = "SOURCE_DELAY_MS", default_value_t = DEFAULT_SOURCE_DELAY.as_millis() as u64)]
    pub source_delay_ms: u64,

    /// Maximum stored content length in characters (longer content is cut and marked)
    #[arg(long, env = "CONTENT_MAX_CHARS", default_value_t = 500)]
    pub content_max_chars: usize,

    /// Optional YAML file with source definitions, replacing the built-in sources
    #[arg(short, long, env = "NEWS_SOURCES_FILE")]
    pub sources: Option<PathBuf>,

    /// User-Agent header sent with every request
    #[arg(long, env = "USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl Cli {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn source_delay(&self) -> Duration {
        Duration::from_millis(self.source_delay_ms)
    }
}
