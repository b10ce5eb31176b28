// src/pipeline/harvest.rs

//! The harvest loop: drives one category from discovery through extraction
//! into the accumulator, checkpointing after every processed page.
//!
//! A page's cursor is recorded only after its targets have been processed,
//! so interruption replays the in-flight page on resume (at-least-once);
//! the accumulator absorbs the replayed keys as duplicates.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Category, HarvestState, Target, phone};
use crate::pipeline::accumulator::{Offer, UniqueAccumulator};
use crate::services::{Extractor, TargetFetcher, TargetPage, TargetSource};
use crate::storage::CheckpointStore;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The unique count reached the configured target.
    CompletedAtTarget,
    /// Every discovery endpoint was exhausted first; carries the shortfall.
    CompletedWithShortfall(usize),
    /// A stop was requested; state is persisted and resumable.
    Stopped,
}

/// Per-run counters, reported at the end and logged along the way.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub pages: u32,
    pub novel: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed_targets: usize,
    pub empty_targets: usize,
}

/// Result of one harvest run.
#[derive(Debug)]
pub struct HarvestOutcome {
    pub status: RunStatus,
    pub unique_count: usize,
    pub target_count: usize,
    pub stats: RunStats,
}

/// Orchestrates discovery, fetch, extraction and checkpointing for one
/// category. Individual target failures cost only that target; storage
/// failures end the run, since progress could no longer be recorded.
pub struct HarvestLoop {
    category: Category,
    fetcher: Arc<dyn TargetFetcher>,
    extractor: Extractor,
    store: Arc<dyn CheckpointStore>,
    request_delay: Duration,
    concurrency: usize,
    stop: Arc<AtomicBool>,
}

impl HarvestLoop {
    pub fn new(
        category: Category,
        fetcher: Arc<dyn TargetFetcher>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            category,
            fetcher,
            extractor: Extractor::new(),
            store,
            request_delay: Duration::ZERO,
            concurrency: 1,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Share a stop flag (set from a signal handler). Checked at page
    /// boundaries; the in-flight page always completes and persists.
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Run until the target is reached, discovery is exhausted, or a stop is
    /// requested.
    pub async fn run(
        &self,
        source: &mut dyn TargetSource,
        target_count: usize,
    ) -> Result<HarvestOutcome> {
        let state = self.store.load(self.category).await?;
        let mut cursors = state.cursors.clone();
        let mut acc = UniqueAccumulator::from_keys(state.phones, target_count);
        let mut stats = RunStats::default();

        log::info!(
            "{}: starting with {}/{} unique keys",
            self.category,
            acc.count(),
            target_count
        );

        loop {
            if self.stop.load(Ordering::SeqCst) {
                log::info!("{}: stop requested, checkpointing", self.category);
                self.persist(&mut acc, &cursors, target_count).await?;
                return Ok(self.outcome(RunStatus::Stopped, &acc, stats));
            }
            if acc.target_reached() {
                self.persist(&mut acc, &cursors, target_count).await?;
                return Ok(self.outcome(RunStatus::CompletedAtTarget, &acc, stats));
            }

            let Some(page) = source.next_page().await? else {
                self.persist(&mut acc, &cursors, target_count).await?;
                let status = if acc.target_reached() {
                    RunStatus::CompletedAtTarget
                } else {
                    RunStatus::CompletedWithShortfall(target_count - acc.count())
                };
                return Ok(self.outcome(status, &acc, stats));
            };

            stats.pages += 1;
            let TargetPage { targets, cursor } = page;
            let batch_completed = self.process_batch(targets, &mut acc, &mut stats).await;

            // Record the cursor only once the whole batch is in the set; a
            // stop mid-page leaves the cursor behind so resume replays it.
            if batch_completed {
                cursors.insert(cursor.0, cursor.1);
            }
            self.persist(&mut acc, &cursors, target_count).await?;

            log::info!(
                "{}: {}/{} unique after page {} ({} novel, {} duplicate so far)",
                self.category,
                acc.count(),
                target_count,
                stats.pages,
                stats.novel,
                stats.duplicates
            );
        }
    }

    /// Fetch one page's targets concurrently and fold the results into the
    /// accumulator as they land. Returns `false` when a stop request cut the
    /// batch short; remaining in-flight fetches are dropped.
    async fn process_batch(
        &self,
        targets: Vec<Target>,
        acc: &mut UniqueAccumulator,
        stats: &mut RunStats,
    ) -> bool {
        let fetches = stream::iter(targets)
            .map(|target| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let result = fetcher.fetch_target(&target).await;
                    (target, result)
                }
            })
            .buffer_unordered(self.concurrency);
        futures::pin_mut!(fetches);

        while let Some((target, result)) = fetches.next().await {
            if self.stop.load(Ordering::SeqCst) {
                return false;
            }
            match result {
                Ok(content) => {
                    let candidates = self.extractor.extract(&content);
                    if candidates.is_empty() {
                        stats.empty_targets += 1;
                        log::debug!("{}: no candidates in target {}", self.category, target.id);
                    }
                    for candidate in candidates {
                        match phone::normalize(&candidate.raw) {
                            Some(key) => match acc.offer(key) {
                                Offer::Added => stats.novel += 1,
                                Offer::AlreadyPresent => stats.duplicates += 1,
                            },
                            None => {
                                stats.rejected += 1;
                                log::debug!(
                                    "{}: rejected candidate {:?} from target {}",
                                    self.category,
                                    candidate.raw,
                                    target.id
                                );
                            }
                        }
                    }
                }
                Err(error) => {
                    stats.failed_targets += 1;
                    log::warn!("{}: target {} failed: {error}", self.category, target.id);
                }
            }
            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }
        true
    }

    /// Checkpoint the current set. Keys persisted to this slot by a previous
    /// writer are folded back in first, so an overwrite never shrinks the
    /// on-disk set.
    async fn persist(
        &self,
        acc: &mut UniqueAccumulator,
        cursors: &HashMap<String, u32>,
        target_count: usize,
    ) -> Result<()> {
        let on_disk = self.store.load(self.category).await?;
        for key in on_disk.phones {
            acc.offer(key);
        }
        let state = HarvestState {
            phones: acc.keys().to_vec(),
            target_count,
            cursors: cursors.clone(),
            updated_at: chrono::Utc::now(),
            ..HarvestState::empty()
        };
        self.store.persist(self.category, &state).await
    }

    fn outcome(&self, status: RunStatus, acc: &UniqueAccumulator, stats: RunStats) -> HarvestOutcome {
        HarvestOutcome {
            status,
            unique_count: acc.count(),
            target_count: acc.target(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::error::FetchError;
    use crate::models::TargetOrigin;
    use crate::storage::LocalCheckpointStore;

    /// Serves canned content by target ID; unknown IDs fail like a 404.
    struct MapFetcher {
        pages: HashMap<String, String>,
    }

    impl MapFetcher {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                pages: entries
                    .iter()
                    .map(|(id, body)| (id.to_string(), body.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl TargetFetcher for MapFetcher {
        async fn fetch_target(&self, target: &Target) -> std::result::Result<String, FetchError> {
            self.pages
                .get(&target.id)
                .cloned()
                .ok_or(FetchError::Status(404))
        }
    }

    /// Yields pre-built pages in order, tracking how many were pulled.
    struct CannedSource {
        pages: Mutex<VecDeque<TargetPage>>,
        pulled: Mutex<u32>,
    }

    impl CannedSource {
        fn new(pages: Vec<TargetPage>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                pulled: Mutex::new(0),
            }
        }

        fn pulled(&self) -> u32 {
            *self.pulled.lock().unwrap()
        }
    }

    #[async_trait]
    impl TargetSource for CannedSource {
        async fn next_page(&mut self) -> Result<Option<TargetPage>> {
            *self.pulled.lock().unwrap() += 1;
            Ok(self.pages.lock().unwrap().pop_front())
        }
    }

    fn target(id: &str) -> Target {
        Target::new(
            id,
            Category::Agent,
            TargetOrigin {
                endpoint: "brokers-web".into(),
                page: 1,
            },
        )
    }

    fn page(ids: &[&str], next_page: u32) -> TargetPage {
        TargetPage {
            targets: ids.iter().map(|id| target(id)).collect(),
            cursor: ("brokers-web".into(), next_page),
        }
    }

    fn body(phone: &str) -> String {
        format!(r#"{{"result": true, "data": {{"phone_number": "{phone}"}}}}"#)
    }

    fn harness(tmp: &TempDir, fetcher: MapFetcher) -> (HarvestLoop, Arc<LocalCheckpointStore>) {
        let store = Arc::new(LocalCheckpointStore::new(tmp.path()));
        let looper = HarvestLoop::new(Category::Agent, Arc::new(fetcher), store.clone());
        (looper, store)
    }

    #[tokio::test]
    async fn reaches_target_and_persists() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MapFetcher::new(&[
            ("1", &body("571000001")),
            ("2", &body("571000002")),
            ("3", &body("571000003")),
        ]);
        let (looper, store) = harness(&tmp, fetcher);
        let mut source = CannedSource::new(vec![page(&["1", "2"], 2), page(&["3"], 3)]);

        let outcome = looper.run(&mut source, 2).await.unwrap();

        assert_eq!(outcome.status, RunStatus::CompletedAtTarget);
        assert_eq!(outcome.unique_count, 2);
        let state = store.load(Category::Agent).await.unwrap();
        assert_eq!(state.count(), 2);
        assert_eq!(state.cursor("brokers-web"), 2);
    }

    #[tokio::test]
    async fn exhaustion_reports_shortfall() {
        // Three targets but only 2 unique keys against a target of 10.
        let tmp = TempDir::new().unwrap();
        let fetcher = MapFetcher::new(&[
            ("1", &body("571000001")),
            ("2", &body("571000002")),
            ("3", &body("571000001")),
        ]);
        let (looper, store) = harness(&tmp, fetcher);
        let mut source = CannedSource::new(vec![page(&["1", "2", "3"], 2)]);

        let outcome = looper.run(&mut source, 10).await.unwrap();

        assert_eq!(outcome.status, RunStatus::CompletedWithShortfall(8));
        assert_eq!(outcome.unique_count, 2);
        assert_eq!(outcome.stats.duplicates, 1);
        let state = store.load(Category::Agent).await.unwrap();
        assert_eq!(state.count(), 2);
    }

    #[tokio::test]
    async fn resume_counts_replayed_keys_as_duplicates() {
        let tmp = TempDir::new().unwrap();

        let first = MapFetcher::new(&[("1", &body("571000001")), ("2", &body("571000002"))]);
        let (looper, _) = harness(&tmp, first);
        let mut source = CannedSource::new(vec![page(&["1", "2"], 2)]);
        looper.run(&mut source, 10).await.unwrap();

        // Second run replays the same targets plus one new.
        let second = MapFetcher::new(&[
            ("1", &body("571000001")),
            ("2", &body("571000002")),
            ("3", &body("571000003")),
        ]);
        let (looper, store) = harness(&tmp, second);
        let mut source = CannedSource::new(vec![page(&["1", "2", "3"], 2)]);
        let outcome = looper.run(&mut source, 10).await.unwrap();

        assert_eq!(outcome.unique_count, 3);
        assert_eq!(outcome.stats.novel, 1);
        assert_eq!(outcome.stats.duplicates, 2);
        assert_eq!(store.load(Category::Agent).await.unwrap().count(), 3);
    }

    #[tokio::test]
    async fn preloaded_target_skips_discovery() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalCheckpointStore::new(tmp.path()));
        let mut state = HarvestState::empty();
        state.phones = vec![
            phone::normalize("571000001").unwrap(),
            phone::normalize("571000002").unwrap(),
        ];
        store.persist(Category::Agent, &state).await.unwrap();

        let looper = HarvestLoop::new(
            Category::Agent,
            Arc::new(MapFetcher::new(&[])),
            store.clone(),
        );
        let mut source = CannedSource::new(vec![page(&["1"], 2)]);
        let outcome = looper.run(&mut source, 2).await.unwrap();

        assert_eq!(outcome.status, RunStatus::CompletedAtTarget);
        assert_eq!(source.pulled(), 0);
    }

    #[tokio::test]
    async fn stop_flag_checkpoints_and_returns_stopped() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MapFetcher::new(&[("1", &body("571000001"))]);
        let stop = Arc::new(AtomicBool::new(true));
        let store = Arc::new(LocalCheckpointStore::new(tmp.path()));
        let looper = HarvestLoop::new(Category::Agent, Arc::new(fetcher), store.clone())
            .with_stop(stop);

        let mut source = CannedSource::new(vec![page(&["1"], 2)]);
        let outcome = looper.run(&mut source, 10).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Stopped);
        assert_eq!(source.pulled(), 0);
        // Resumable: the checkpoint exists even though nothing was harvested.
        assert_eq!(store.load(Category::Agent).await.unwrap().count(), 0);
    }

    /// Sets the stop flag as a side effect of fetching one target.
    struct TrippingFetcher {
        inner: MapFetcher,
        stop: Arc<AtomicBool>,
        trip_on: String,
    }

    #[async_trait]
    impl TargetFetcher for TrippingFetcher {
        async fn fetch_target(&self, target: &Target) -> std::result::Result<String, FetchError> {
            if target.id == self.trip_on {
                self.stop.store(true, Ordering::SeqCst);
            }
            self.inner.fetch_target(target).await
        }
    }

    #[tokio::test]
    async fn mid_page_stop_does_not_advance_the_cursor() {
        let tmp = TempDir::new().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let fetcher = TrippingFetcher {
            inner: MapFetcher::new(&[
                ("1", &body("571000001")),
                ("2", &body("571000002")),
                ("3", &body("571000003")),
            ]),
            stop: Arc::clone(&stop),
            trip_on: "2".into(),
        };
        let store = Arc::new(LocalCheckpointStore::new(tmp.path()));
        let looper = HarvestLoop::new(Category::Agent, Arc::new(fetcher), store.clone())
            .with_stop(stop);

        let mut source = CannedSource::new(vec![page(&["1", "2", "3"], 2)]);
        let outcome = looper.run(&mut source, 10).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Stopped);
        // Target 1 landed before the stop; the interrupted page's cursor was
        // not recorded, so resume replays it.
        let state = store.load(Category::Agent).await.unwrap();
        assert_eq!(state.count(), 1);
        assert_eq!(state.cursor("brokers-web"), 1);
    }

    #[tokio::test]
    async fn failed_and_empty_targets_cost_only_themselves() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MapFetcher::new(&[
            ("1", &body("571000001")),
            ("2", "<html><body>no numbers here</body></html>"),
            // "3" missing -> fetch fails
        ]);
        let (looper, _) = harness(&tmp, fetcher);
        let mut source = CannedSource::new(vec![page(&["1", "2", "3"], 2)]);

        let outcome = looper.run(&mut source, 10).await.unwrap();

        assert_eq!(outcome.unique_count, 1);
        assert_eq!(outcome.stats.failed_targets, 1);
        assert_eq!(outcome.stats.empty_targets, 1);
        assert_eq!(outcome.status, RunStatus::CompletedWithShortfall(9));
    }

    #[tokio::test]
    async fn malformed_candidates_are_rejected_not_fatal() {
        let tmp = TempDir::new().unwrap();
        // A 9-digit landline (does not start with 5) and a real mobile.
        let fetcher = MapFetcher::new(&[(
            "1",
            r#"{"data": {"phone": "322123456", "mobile": "571000001"}}"#,
        )]);
        let (looper, _) = harness(&tmp, fetcher);
        let mut source = CannedSource::new(vec![page(&["1"], 2)]);

        let outcome = looper.run(&mut source, 10).await.unwrap();

        assert_eq!(outcome.unique_count, 1);
        assert_eq!(outcome.stats.rejected, 1);
    }
}
