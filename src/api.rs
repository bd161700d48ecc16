//! JSON HTTP API over the news store.
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | GET | `/api/news?page&limit&source&search` | `{data, total, page, pages}` |
//! | GET | `/api/sources` | `{sources}` |
//! | GET | `/api/stats` | `{total_news, source_stats, last_update}` |
//! | POST | `/api/crawl` | `{message, total_crawled, inserted}` |
//! | GET | `/health` | `{status, database, scheduler}` |
//!
//! Read endpoints never treat "nothing matched" as an error. The crawl
//! endpoint always answers with a summary, including when another cycle is
//! already in progress.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::Error;
use crate::models::{NewsFilter, NewsPage, NewsStats, page_count};
use crate::scheduler::{CycleOutcome, Scheduler, SchedulerState};
use crate::store::NewsStore;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: NewsStore,
    pub scheduler: Arc<Scheduler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/news", get(list_news))
        .route("/api/sources", get(list_sources))
        .route("/api/stats", get(stats))
        .route("/api/crawl", post(manual_crawl))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Raw query string values; numbers are parsed leniently so a malformed
/// `page` falls back to its default instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub source: Option<String>,
    pub search: Option<String>,
}

impl NewsQuery {
    fn page(&self) -> u32 {
        parse_number(self.page.as_deref()).unwrap_or(1).max(1)
    }

    fn limit(&self) -> u32 {
        parse_number(self.limit.as_deref())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

fn parse_number(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse().ok())
}

/// Store failure surfaced as `500 {error}`.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

async fn list_news(
    State(state): State<AppState>,
    Query(query): Query<NewsQuery>,
) -> Result<Json<NewsPage>, ApiError> {
    let page = query.page();
    let limit = query.limit();
    let filter = NewsFilter::new(query.source, query.search);

    let data = state.store.list(&filter, page, limit).await?;
    let total = state.store.count(&filter).await?;

    Ok(Json(NewsPage {
        data,
        total,
        page,
        pages: page_count(total, limit),
    }))
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<String>,
}

async fn list_sources(State(state): State<AppState>) -> Result<Json<SourcesResponse>, ApiError> {
    Ok(Json(SourcesResponse {
        sources: state.store.sources().await?,
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<NewsStats>, ApiError> {
    Ok(Json(state.store.stats().await?))
}

#[derive(Debug, Serialize)]
pub struct CrawlResponse {
    pub message: String,
    pub total_crawled: usize,
    pub inserted: usize,
}

async fn manual_crawl(State(state): State<AppState>) -> Json<CrawlResponse> {
    let response = match state.scheduler.trigger_manual().await {
        CycleOutcome::Completed(summary) => CrawlResponse {
            message: format!(
                "Manual crawl finished, {} new articles added",
                summary.inserted()
            ),
            total_crawled: summary.fetched,
            inserted: summary.inserted(),
        },
        CycleOutcome::AlreadyRunning => CrawlResponse {
            message: "A crawl is already in progress; nothing new was started".to_string(),
            total_crawled: 0,
            inserted: 0,
        },
    };
    Json(response)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub scheduler: SchedulerState,
}

/// `200` when the database answers within five seconds, `503` otherwise.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match tokio::time::timeout(Duration::from_secs(5), state.store.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("query failed: {e}")),
        Err(_) => Err("query timeout (>5s)".to_string()),
    };

    let scheduler = state.scheduler.state();
    match database {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                database: "ok".to_string(),
                scheduler,
            }),
        ),
        Err(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                database: reason,
                scheduler,
            }),
        ),
    }
}
