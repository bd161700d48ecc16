//! Ingestion orchestrator: run every registered extractor and merge results.
//!
//! Sources are fetched one after another in registration order with a fixed
//! pause between them, so no single run bursts requests. A source that fails
//! (or panics) contributes nothing and the run carries on with the next one.

use futures::FutureExt;
use itertools::Itertools;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument};

use crate::models::CandidateRecord;
use crate::scrapers::SourceRegistry;

/// Pause between two consecutive sources within one run.
pub const DEFAULT_SOURCE_DELAY: Duration = Duration::from_secs(1);

pub struct Orchestrator {
    registry: SourceRegistry,
    source_delay: Duration,
}

impl Orchestrator {
    pub fn new(registry: SourceRegistry, source_delay: Duration) -> Self {
        Self {
            registry,
            source_delay,
        }
    }

    /// Fetch every source and concatenate their candidates.
    ///
    /// The result lists each source's candidates in the order the extractor
    /// returned them, sources in registration order. No sorting across
    /// sources takes place.
    #[instrument(level = "info", skip_all, fields(sources = self.registry.len()))]
    pub async fn run_all(&self) -> Vec<CandidateRecord> {
        let t0 = Instant::now();
        let mut all = Vec::new();

        for (i, extractor) in self.registry.iter().enumerate() {
            if i > 0 && !self.source_delay.is_zero() {
                sleep(self.source_delay).await;
            }

            let source = extractor.source();
            match AssertUnwindSafe(extractor.fetch()).catch_unwind().await {
                Ok(records) => {
                    info!(%source, count = records.len(), "Source fetched");
                    all.extend(records);
                }
                Err(_) => {
                    error!(%source, "Extractor panicked; skipping source for this run");
                }
            }
        }

        let per_source = all.iter().counts_by(|r| r.source.clone());
        info!(
            total = all.len(),
            ?per_source,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Finished fetching all sources"
        );
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::{FailingExtractor, PanickingExtractor, StaticExtractor};

    fn registry(extractors: Vec<Box<dyn crate::scrapers::Extractor>>) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for e in extractors {
            registry.register(e);
        }
        registry
    }

    #[tokio::test]
    async fn test_run_all_preserves_registration_order() {
        let orchestrator = Orchestrator::new(
            registry(vec![
                Box::new(StaticExtractor::new("b", &["https://b/1", "https://b/2"])),
                Box::new(StaticExtractor::new("a", &["https://a/1"])),
            ]),
            Duration::ZERO,
        );

        let urls: Vec<String> = orchestrator.run_all().await.into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://b/1", "https://b/2", "https://a/1"]);
    }

    #[tokio::test]
    async fn test_run_all_isolates_failing_and_panicking_sources() {
        let orchestrator = Orchestrator::new(
            registry(vec![
                Box::new(StaticExtractor::new("first", &["https://first/1"])),
                Box::new(FailingExtractor),
                Box::new(PanickingExtractor),
                Box::new(StaticExtractor::new("last", &["https://last/1", "https://last/2"])),
            ]),
            Duration::ZERO,
        );

        let records = orchestrator.run_all().await;
        let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["first", "last", "last"]);
    }

    #[tokio::test]
    async fn test_run_all_empty_registry() {
        let orchestrator = Orchestrator::new(SourceRegistry::new(), DEFAULT_SOURCE_DELAY);
        assert!(orchestrator.run_all().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_paces_between_sources() {
        let orchestrator = Orchestrator::new(
            registry(vec![
                Box::new(StaticExtractor::new("a", &["https://a/1"])),
                Box::new(StaticExtractor::new("b", &["https://b/1"])),
                Box::new(StaticExtractor::new("c", &["https://c/1"])),
            ]),
            Duration::from_secs(1),
        );

        let start = tokio::time::Instant::now();
        orchestrator.run_all().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
