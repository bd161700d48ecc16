//! Periodic and manual ingestion cycles.
//!
//! Two triggers share one pipeline: the background loop started by
//! [`Scheduler::start`] (first cycle immediately, then every interval) and
//! [`Scheduler::trigger_manual`] called by the HTTP API. A cycle is
//! `Orchestrator::run_all` followed by `NewsStore::insert_batch`.
//!
//! # Overlap Policy
//!
//! At most one cycle runs at a time. A trigger arriving while a cycle is in
//! flight does not wait for it; it returns [`CycleOutcome::AlreadyRunning`]
//! straight away and starts nothing.
//!
//! # Lifetime
//!
//! The loop runs until its [`CancellationToken`] is cancelled. A panic inside
//! one cycle is caught and logged; the loop keeps going.

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::models::{CycleSummary, Trigger};
use crate::pipeline::Orchestrator;
use crate::store::NewsStore;

/// Time between two scheduled cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    /// Another cycle was in flight; this trigger did nothing.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

pub struct Scheduler {
    orchestrator: Orchestrator,
    store: NewsStore,
    interval: Duration,
    cycle_lock: Mutex<()>,
    /// Set only while a cycle holds `cycle_lock`; `state()` reads this and
    /// never touches the lock.
    running: AtomicBool,
    started: AtomicBool,
}

/// Clears the running flag when the cycle ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator, store: NewsStore, interval: Duration) -> Self {
        Self {
            orchestrator,
            store,
            interval,
            cycle_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Cycle fired by the timer.
    pub async fn tick(&self) -> CycleOutcome {
        self.run_cycle(Trigger::Scheduled).await
    }

    /// Cycle requested from outside (the crawl endpoint).
    pub async fn trigger_manual(&self) -> CycleOutcome {
        self.run_cycle(Trigger::Manual).await
    }

    /// Fetch all sources and store the new records, unless a cycle is
    /// already running.
    #[instrument(level = "info", skip_all, fields(trigger = %trigger))]
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            info!("Ingestion cycle already running; not starting another");
            return CycleOutcome::AlreadyRunning;
        };
        // Declared after `_guard`, so it is dropped first.
        let _running = RunningGuard::set(&self.running);

        let t0 = Instant::now();
        info!("Ingestion cycle starting");

        let candidates = self.orchestrator.run_all().await;
        let fetched = candidates.len();
        let report = self.store.insert_batch(candidates).await;

        let summary = CycleSummary {
            trigger,
            fetched,
            report,
            elapsed: t0.elapsed(),
        };
        info!(
            fetched,
            inserted = report.inserted,
            duplicates = report.duplicates,
            rejected = report.rejected,
            failed = report.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Ingestion cycle complete"
        );
        CycleOutcome::Completed(summary)
    }

    /// Spawn the periodic loop.
    ///
    /// Only the first call spawns anything; later calls log a warning and
    /// return `None`.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler loop already started");
            return None;
        }
        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move { scheduler.run(shutdown).await }))
    }

    async fn run(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler loop started");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                error!("Ingestion cycle panicked; scheduler keeps running");
            }
        }

        info!("Scheduler loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateRecord;
    use crate::models::NewsFilter;
    use crate::scrapers::testing::{PanickingExtractor, StaticExtractor, candidate};
    use crate::scrapers::{Extractor, SourceRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    async fn store() -> NewsStore {
        let store = NewsStore::connect("sqlite::memory:").await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    fn scheduler(extractors: Vec<Box<dyn Extractor>>, store: NewsStore, interval: Duration) -> Arc<Scheduler> {
        let mut registry = SourceRegistry::new();
        for e in extractors {
            registry.register(e);
        }
        Arc::new(Scheduler::new(
            Orchestrator::new(registry, Duration::ZERO),
            store,
            interval,
        ))
    }

    /// Blocks inside `extract` until released.
    struct GatedExtractor {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Extractor for GatedExtractor {
        fn source(&self) -> &str {
            "gated"
        }

        async fn extract(&self) -> crate::error::Result<Vec<CandidateRecord>> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(vec![candidate("gated", "https://gated/1"), candidate("gated", "https://gated/2")])
        }
    }

    /// Counts how many cycles reached it.
    struct CountingExtractor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Extractor for CountingExtractor {
        fn source(&self) -> &str {
            "counting"
        }

        async fn extract(&self) -> crate::error::Result<Vec<CandidateRecord>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![candidate("counting", &format!("https://counting/{n}"))])
        }
    }

    /// Panics from `source()` on its first call. `run_all` reads the name
    /// outside its per-source guard, so the panic escapes the whole cycle.
    struct PanicOnceExtractor {
        tripped: AtomicBool,
    }

    impl PanicOnceExtractor {
        fn new() -> Self {
            Self {
                tripped: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Extractor for PanicOnceExtractor {
        fn source(&self) -> &str {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                panic!("source name unavailable");
            }
            "panic-once"
        }

        async fn extract(&self) -> crate::error::Result<Vec<CandidateRecord>> {
            Ok(Vec::new())
        }
    }

    async fn wait_for_calls(calls: &AtomicUsize, at_least: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < at_least {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("scheduler loop did not run in time");
    }

    #[tokio::test]
    async fn test_tick_then_retick_is_idempotent() {
        let store = store().await;
        let scheduler = scheduler(
            vec![
                Box::new(StaticExtractor::new("a", &["https://a/1", "https://a/2"])),
                Box::new(StaticExtractor::new("b", &["https://b/1"])),
            ],
            store.clone(),
            DEFAULT_INTERVAL,
        );

        let CycleOutcome::Completed(first) = scheduler.tick().await else {
            panic!("first cycle should run");
        };
        assert_eq!(first.trigger, Trigger::Scheduled);
        assert_eq!(first.fetched, 3);
        assert_eq!(first.inserted(), 3);

        let CycleOutcome::Completed(second) = scheduler.trigger_manual().await else {
            panic!("second cycle should run");
        };
        assert_eq!(second.trigger, Trigger::Manual);
        assert_eq!(second.fetched, 3);
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.report.duplicates, 3);
        assert_eq!(store.count(&NewsFilter::default()).await.unwrap(), 3);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_manual_trigger_during_cycle_reports_already_running() {
        let store = store().await;
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let scheduler = scheduler(
            vec![Box::new(GatedExtractor {
                started: started.clone(),
                release: release.clone(),
            })],
            store.clone(),
            DEFAULT_INTERVAL,
        );

        let background = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        };
        started.notified().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        assert_eq!(scheduler.trigger_manual().await, CycleOutcome::AlreadyRunning);

        release.notify_one();
        let CycleOutcome::Completed(summary) = background.await.unwrap() else {
            panic!("background cycle should complete");
        };
        assert_eq!(summary.inserted(), 2);
        assert_eq!(store.count(&NewsFilter::default()).await.unwrap(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_loop_runs_immediately_and_stops_on_cancel() {
        let store = store().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = scheduler(
            vec![Box::new(CountingExtractor { calls: calls.clone() })],
            store.clone(),
            DEFAULT_INTERVAL,
        );

        let token = CancellationToken::new();
        let handle = scheduler.start(token.clone()).unwrap();
        assert!(scheduler.start(token.clone()).is_none());

        wait_for_calls(&calls, 1).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop after cancel")
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.count(&NewsFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_loop_survives_panicking_source() {
        let store = store().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = scheduler(
            vec![
                Box::new(PanickingExtractor),
                Box::new(CountingExtractor { calls: calls.clone() }),
            ],
            store.clone(),
            Duration::from_millis(20),
        );

        let token = CancellationToken::new();
        let handle = scheduler.start(token.clone()).unwrap();
        wait_for_calls(&calls, 3).await;
        token.cancel();
        handle.await.unwrap();

        assert!(store.count(&NewsFilter::default()).await.unwrap() >= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_state_reads_never_turn_triggers_away() {
        let scheduler = scheduler(Vec::new(), store().await, DEFAULT_INTERVAL);
        let stop = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let scheduler = scheduler.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let _ = scheduler.state();
                    }
                })
            })
            .collect();

        let mut turned_away = 0;
        for _ in 0..2_000 {
            if scheduler.trigger_manual().await == CycleOutcome::AlreadyRunning {
                turned_away += 1;
            }
        }
        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(turned_away, 0);
    }

    #[tokio::test]
    async fn test_panicking_cycle_leaves_scheduler_idle() {
        let store = store().await;
        let scheduler = scheduler(
            vec![
                Box::new(PanicOnceExtractor::new()),
                Box::new(StaticExtractor::new("a", &["https://a/1"])),
            ],
            store.clone(),
            DEFAULT_INTERVAL,
        );

        assert!(AssertUnwindSafe(scheduler.tick()).catch_unwind().await.is_err());
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let CycleOutcome::Completed(summary) = scheduler.trigger_manual().await else {
            panic!("cycle after a panic should run");
        };
        assert_eq!(summary.inserted(), 1);
    }

    #[tokio::test]
    async fn test_loop_survives_panic_escaping_cycle() {
        let store = store().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = scheduler(
            vec![
                Box::new(PanicOnceExtractor::new()),
                Box::new(CountingExtractor { calls: calls.clone() }),
            ],
            store.clone(),
            Duration::from_millis(20),
        );

        let token = CancellationToken::new();
        let handle = scheduler.start(token.clone()).unwrap();
        // The first cycle panics before reaching the counting source.
        wait_for_calls(&calls, 2).await;
        token.cancel();
        handle.await.unwrap();

        assert!(store.count(&NewsFilter::default()).await.unwrap() >= 2);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
