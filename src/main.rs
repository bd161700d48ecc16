//! # Finance News Hub
//!
//! A long-running service that scrapes finance news listing pages on a fixed
//! schedule, deduplicates articles by URL into SQLite, and serves them through
//! a small JSON API.
//!
//! ## Features
//!
//! - Scrapes 东方财富网, 新浪财经, 财经网 and 界面新闻 out of the box; more
//!   sources are plain YAML selector definitions
//! - Hourly background crawl plus a manual `POST /api/crawl` trigger that
//!   never overlaps with it
//! - URL-unique storage: re-crawling the same article is a no-op
//! - Paginated, filterable, searchable listing endpoint and stats endpoint
//!
//! ## Usage
//!
//! ```sh
//! finance_news_hub --database-url sqlite:finance_news.db --port 5000
//! ```
//!
//! ## Architecture
//!
//! 1. **Extraction**: each source fetches its listing page (and optionally
//!    article pages) into candidate records
//! 2. **Orchestration**: all sources run in order with a short pause between them
//! 3. **Storage**: candidates are inserted if their URL is new
//! 4. **Scheduling**: steps 1–3 run every interval and on demand, one at a time
//! 5. **Serving**: the API reads the store concurrently with ingestion

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod error;
mod models;
mod pipeline;
mod scheduler;
mod scrapers;
mod store;
mod utils;

use api::AppState;
use cli::Cli;
use pipeline::Orchestrator;
use scheduler::Scheduler;
use scrapers::{SourceRegistry, build_http_client, sources};
use store::NewsStore;
use utils::ensure_database_dir;

/// How long shutdown waits for an in-flight cycle before giving up on it.
const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("finance_news_hub starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Store: schema must exist before the first cycle ----
    ensure_database_dir(&args.database_url).await?;
    let store = NewsStore::connect(&args.database_url).await?;
    store.ensure_schema().await?;

    // ---- Sources ----
    let configs = match &args.sources {
        Some(path) => sources::load_sources(path).await?,
        None => sources::builtin_sources(),
    };
    let client = build_http_client(args.request_timeout(), &args.user_agent)?;
    let registry = SourceRegistry::from_configs(configs, client, args.content_max_chars)?;
    if registry.is_empty() {
        warn!("No sources registered; cycles will fetch nothing");
    }

    // ---- Scheduler ----
    let orchestrator = Orchestrator::new(registry, args.source_delay());
    let scheduler = Arc::new(Scheduler::new(orchestrator, store.clone(), args.interval()));
    let shutdown = CancellationToken::new();
    let scheduler_handle = scheduler.start(shutdown.clone());

    // ---- HTTP API ----
    let app = api::router(AppState {
        store: store.clone(),
        scheduler: Arc::clone(&scheduler),
    });
    let listener = TcpListener::bind(args.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // ---- Shutdown ----
    shutdown.cancel();
    if let Some(handle) = scheduler_handle {
        match tokio::time::timeout(SCHEDULER_STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => warn!(error = %e, "Scheduler task ended abnormally"),
            Err(_) => warn!("Scheduler did not stop in time; abandoning in-flight cycle"),
        }
    }
    store.pool().close().await;

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, cancelling `token` so the scheduler loop
/// stops alongside the HTTP server.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
    token.cancel();
}
