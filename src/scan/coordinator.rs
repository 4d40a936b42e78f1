//! The scan coordinator and its termination protocol.

use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::config::ScanConfig;
use super::stats::{ScanReport, ScanState, ScanStats};
use super::ScanError;
use crate::checkpoint::resume_point;
use crate::fetch::RecordLookup;
use crate::filter::NameFilter;
use crate::record::{Record, ScanRange};
use crate::sink::BatchSink;

type LookupOutcome = (i64, Option<Record>);

/// Drives one scan run over `[resume point, end_id]`.
///
/// # Concurrency Model
///
/// - Each lookup runs in its own Tokio task inside a [`JoinSet`]
/// - The set is topped up to `max_workers` before every wait
/// - The coordinator waits on whichever lookup finishes first and routes
///   its result before dispatching more work
/// - Threshold flushes run on the coordinator task while the remaining
///   lookups keep running
///
/// # Termination
///
/// After the range is exhausted, or once the cancellation token fires, no
/// new lookups are dispatched. On interrupt, lookups already in flight get
/// `drain_grace` to complete and are then detached (never aborted). The
/// buffer is then flushed exactly once more.
pub struct ScanCoordinator {
    config: ScanConfig,
    lookup: Arc<dyn RecordLookup>,
    filter: NameFilter,
    sink: BatchSink,
    stats: Arc<ScanStats>,
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("config", &self.config)
            .field("filter", &self.filter)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl ScanCoordinator {
    /// Creates a coordinator after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns the [`ScanConfig::validate`] error for a malformed configuration.
    pub fn new(
        config: ScanConfig,
        lookup: Arc<dyn RecordLookup>,
        filter: NameFilter,
        sink: BatchSink,
    ) -> Result<Self, ScanError> {
        config.validate()?;

        debug!(
            start_id = config.start_id,
            end_id = config.end_id,
            save_every = config.save_every,
            max_workers = config.max_workers,
            drain_grace_ms = config.drain_grace.as_millis(),
            "creating scan coordinator"
        );

        Ok(Self {
            config,
            lookup,
            filter,
            sink,
            stats: Arc::new(ScanStats::new()),
        })
    }

    /// Returns the live counters for this run.
    #[must_use]
    pub fn stats(&self) -> Arc<ScanStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the scan to completion or interrupt.
    ///
    /// Consumes the coordinator, so a finished run cannot be re-entered.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::FinalFlush`] when the final flush fails. Per-id
    /// lookup failures and failed threshold flushes never end the run.
    #[instrument(skip(self, cancel), fields(start_id = self.config.start_id, end_id = self.config.end_id))]
    pub async fn run(self, cancel: CancellationToken) -> Result<ScanReport, ScanError> {
        let configured = ScanRange::new(self.config.start_id, self.config.end_id);

        self.transition(ScanState::Init);
        let resume_from = resume_point(self.sink.store().as_ref(), self.config.start_id).await;
        let range = ScanRange::new(resume_from, self.config.end_id);
        self.stats.set_total(range.len());

        if range.is_empty() {
            info!(resume_from, end_id = self.config.end_id, "range already complete");
        } else {
            self.transition(ScanState::Running);
            info!(
                from = range.start(),
                to = range.end(),
                ids = range.len(),
                max_workers = self.config.max_workers,
                "starting scan"
            );
            self.sweep(range, &cancel).await;
        }

        self.transition(ScanState::Draining);
        let final_flush = self.sink.flush().await;
        let outcome = match final_flush {
            Ok(written) => {
                self.stats.record_flush(written);
                Ok(())
            }
            Err(e) => {
                self.stats.record_failed_flush(e.written);
                Err(e)
            }
        };

        self.transition(ScanState::Done);
        let report = ScanReport::snapshot(
            &self.stats,
            configured,
            resume_from,
            self.sink.pending_len(),
        );

        match outcome {
            Ok(()) => {
                info!(
                    attempted = report.attempted,
                    found = report.found,
                    accepted = report.accepted,
                    committed = report.committed,
                    flushes = report.flushes,
                    failed_flushes = report.failed_flushes,
                    interrupted = report.interrupted,
                    "scan complete"
                );
                Ok(report)
            }
            Err(source) => {
                error!(
                    batch = source.batch,
                    unwritten = source.unwritten,
                    error = %source.source,
                    "final flush failed"
                );
                Err(ScanError::FinalFlush {
                    report: Box::new(report),
                    source,
                })
            }
        }
    }

    /// Dispatches every id in `range` unless interrupted.
    async fn sweep(&self, range: ScanRange, cancel: &CancellationToken) {
        let mut ids = range.ids();
        let mut tasks: JoinSet<LookupOutcome> = JoinSet::new();

        loop {
            if cancel.is_cancelled() {
                self.drain_after_interrupt(&mut tasks).await;
                return;
            }

            while tasks.len() < self.config.max_workers {
                let Some(id) = ids.next() else {
                    break;
                };
                let lookup = Arc::clone(&self.lookup);
                tasks.spawn(async move { (id, lookup.fetch(id).await) });
            }

            let joined = tokio::select! {
                biased;
                () = cancel.cancelled() => continue,
                joined = tasks.join_next() => joined,
            };

            // Empty set after a top-up means the range is exhausted.
            let Some(joined) = joined else {
                return;
            };
            self.complete(joined, true).await;
        }
    }

    async fn drain_after_interrupt(&self, tasks: &mut JoinSet<LookupOutcome>) {
        self.stats.set_interrupted();
        self.transition(ScanState::Draining);
        info!(
            in_flight = tasks.len(),
            grace_ms = self.config.drain_grace.as_millis(),
            "interrupt received, no new lookups will be dispatched"
        );

        let deadline = tokio::time::sleep(self.config.drain_grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    Some(joined) => self.complete(joined, false).await,
                    None => return,
                },
                () = &mut deadline => {
                    warn!(abandoned = tasks.len(), "drain grace elapsed, abandoning in-flight lookups");
                    tasks.detach_all();
                    return;
                }
            }
        }
    }

    /// Routes one finished lookup through the filter and into the sink, then
    /// flushes if the buffer is at the threshold.
    ///
    /// The threshold is checked after every completion, so records kept by a
    /// failed flush are retried on the next one. Threshold flushes are skipped
    /// while draining; the final flush covers them.
    async fn complete(&self, joined: Result<LookupOutcome, JoinError>, threshold_flush: bool) {
        match joined {
            Ok((id, Some(record))) => {
                self.stats.increment_found();
                if self.filter.accept(&record.display_name) {
                    info!(id, name = %record.display_name, "found record");
                    self.stats.increment_accepted();
                    self.sink.add(record);
                } else {
                    debug!(id, name = %record.display_name, "rejected placeholder name");
                }
            }
            Ok((id, None)) => debug!(id, "no record"),
            Err(e) => warn!(error = %e, "lookup task failed"),
        }
        self.stats.increment_completed();

        if threshold_flush && self.sink.pending_len() >= self.config.save_every {
            self.threshold_flush().await;
        }
    }

    async fn threshold_flush(&self) {
        match self.sink.flush().await {
            Ok(written) => self.stats.record_flush(written),
            Err(e) => {
                self.stats.record_failed_flush(e.written);
                warn!(
                    batch = e.batch,
                    written = e.written,
                    unwritten = e.unwritten,
                    error = %e.source,
                    "flush failed, records kept for the next flush"
                );
            }
        }
    }

    fn transition(&self, next: ScanState) {
        let current = self.stats.state();
        if current != next {
            debug!(from = %current, to = %next, "scan state transition");
            self.stats.set_state(next);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::store::{RecordStore, StoreError, StoreErrorKind};

    /// Lookup that answers from a fixed table and counts calls per id.
    struct TableLookup {
        names: BTreeMap<i64, &'static str>,
        calls: Mutex<Vec<i64>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TableLookup {
        fn new(names: &[(i64, &'static str)]) -> Self {
            Self {
                names: names.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordLookup for TableLookup {
        async fn fetch(&self, id: i64) -> Option<Record> {
            self.calls.lock().unwrap().push(id);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.names.get(&id).map(|name| Record::new(id, *name))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<BTreeMap<i64, String>>,
        batch_sizes: Mutex<Vec<usize>>,
        failures_left: AtomicUsize,
    }

    impl MemoryStore {
        fn seeded(ids: &[i64]) -> Self {
            let store = Self::default();
            for id in ids {
                store.rows.lock().unwrap().insert(*id, format!("seed{id}"));
            }
            store
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn upsert(&self, records: &[Record]) -> Result<usize, StoreError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Database {
                    kind: StoreErrorKind::Other,
                    message: "write rejected".to_string(),
                });
            }
            self.batch_sizes.lock().unwrap().push(records.len());
            let mut rows = self.rows.lock().unwrap();
            for record in records {
                rows.insert(record.id, record.display_name.clone());
            }
            Ok(records.len())
        }

        async fn last_committed_id(&self) -> Result<Option<i64>, StoreError> {
            Ok(self.rows.lock().unwrap().keys().next_back().copied())
        }

        async fn record_count(&self) -> Result<u64, StoreError> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }
    }

    fn coordinator(
        config: ScanConfig,
        lookup: &Arc<TableLookup>,
        store: &Arc<MemoryStore>,
    ) -> ScanCoordinator {
        let lookup: Arc<dyn RecordLookup> = Arc::clone(lookup) as Arc<dyn RecordLookup>;
        let store: Arc<dyn RecordStore> = Arc::clone(store) as Arc<dyn RecordStore>;
        ScanCoordinator::new(config, lookup, NameFilter::default(), BatchSink::new(store)).unwrap()
    }

    #[test]
    fn test_coordinator_rejects_invalid_config() {
        let lookup: Arc<dyn RecordLookup> = Arc::new(TableLookup::new(&[]));
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::default());
        let result = ScanCoordinator::new(
            ScanConfig::new(5, 1, 2),
            lookup,
            NameFilter::default(),
            BatchSink::new(store),
        );
        assert!(matches!(result, Err(ScanError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_scan_commits_accepted_records() {
        let lookup = Arc::new(TableLookup::new(&[(1, "Alice"), (3, "Carol"), (5, "Eve")]));
        let store = Arc::new(MemoryStore::default());

        let report = coordinator(ScanConfig::new(1, 5, 2), &lookup, &store)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.attempted, 5);
        assert_eq!(report.found, 3);
        assert_eq!(report.accepted, 3);
        assert_eq!(report.committed, 3);
        assert_eq!(report.pending, 0);
        assert!(!report.interrupted);
        assert_eq!(report.final_state, ScanState::Done);
        assert_eq!(store.batch_sizes.lock().unwrap().iter().sum::<usize>(), 3);

        let rows = store.rows.lock().unwrap().clone();
        assert_eq!(rows.keys().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(rows[&3], "Carol");
    }

    #[tokio::test]
    async fn test_scan_attempts_each_id_once() {
        let lookup = Arc::new(TableLookup::new(&[]));
        let store = Arc::new(MemoryStore::default());

        coordinator(ScanConfig::new(1, 100, 10).with_max_workers(7), &lookup, &store)
            .run(CancellationToken::new())
            .await
            .unwrap();

        let calls = lookup.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 100);
        let unique: HashSet<_> = calls.iter().copied().collect();
        assert_eq!(unique.len(), 100);
        assert!(lookup.peak.load(Ordering::SeqCst) <= 7);
    }

    #[tokio::test]
    async fn test_scan_filters_placeholder_names() {
        let lookup = Arc::new(TableLookup::new(&[
            (1, "Alice"),
            (2, ""),
            (3, "แฟนคลับหมายเลข7"),
        ]));
        let store = Arc::new(MemoryStore::default());

        let report = coordinator(ScanConfig::new(1, 3, 10), &lookup, &store)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.found, 3);
        assert_eq!(report.accepted, 1);
        let rows = store.rows.lock().unwrap().clone();
        assert_eq!(rows.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_scan_resumes_after_last_committed() {
        let lookup = Arc::new(TableLookup::new(&[(4, "Dan"), (5, "Eve")]));
        let store = Arc::new(MemoryStore::seeded(&[1, 2, 3]));

        let report = coordinator(ScanConfig::new(1, 5, 10), &lookup, &store)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.resume_from, 4);
        let mut calls = lookup.calls.lock().unwrap().clone();
        calls.sort_unstable();
        assert_eq!(calls, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_scan_past_end_does_nothing() {
        let lookup = Arc::new(TableLookup::new(&[]));
        let store = Arc::new(MemoryStore::seeded(&[10]));

        let report = coordinator(ScanConfig::new(1, 5, 10), &lookup, &store)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.resume_from, 11);
        assert_eq!(report.attempted, 0);
        assert!(lookup.calls.lock().unwrap().is_empty());
        assert!(store.batch_sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_flushes_nothing_and_succeeds() {
        let lookup = Arc::new(TableLookup::new(&[(1, "Alice")]));
        let store = Arc::new(MemoryStore::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = coordinator(ScanConfig::new(1, 5, 10), &lookup, &store)
            .run(cancel)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.attempted, 0);
        assert!(lookup.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_threshold_flush_is_retried_by_later_completion() {
        let lookup = Arc::new(TableLookup::new(&[(1, "Alice"), (2, "Bob")]));
        let store = Arc::new(MemoryStore::default());
        store.failures_left.store(1, Ordering::SeqCst);

        let report = coordinator(
            ScanConfig::new(1, 2, 1).with_max_workers(1),
            &lookup,
            &store,
        )
        .run(CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(report.failed_flushes, 1);
        assert_eq!(report.committed, 2);
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }

    /// Finds only id 1; when asked for id 3, notes whether id 1 was already stored.
    struct StoreWatchingLookup {
        store: Arc<MemoryStore>,
        stored_before_3: Mutex<Option<bool>>,
    }

    #[async_trait]
    impl RecordLookup for StoreWatchingLookup {
        async fn fetch(&self, id: i64) -> Option<Record> {
            if id == 3 {
                let stored = self.store.rows.lock().unwrap().contains_key(&1);
                *self.stored_before_3.lock().unwrap() = Some(stored);
            }
            (id == 1).then(|| Record::new(1, "Alice"))
        }
    }

    #[tokio::test]
    async fn test_failed_flush_retried_on_next_completion_without_record() {
        let store = Arc::new(MemoryStore::default());
        store.failures_left.store(1, Ordering::SeqCst);
        let lookup = Arc::new(StoreWatchingLookup {
            store: Arc::clone(&store),
            stored_before_3: Mutex::new(None),
        });

        let report = ScanCoordinator::new(
            ScanConfig::new(1, 3, 1).with_max_workers(1),
            Arc::clone(&lookup) as Arc<dyn RecordLookup>,
            NameFilter::default(),
            BatchSink::new(Arc::clone(&store) as Arc<dyn RecordStore>),
        )
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(report.failed_flushes, 1);
        assert_eq!(report.flushes, 1);
        assert_eq!(report.committed, 1);
        // The retry ran when id 2 completed empty, before id 3 was dispatched.
        assert_eq!(*lookup.stored_before_3.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_final_flush_failure_is_an_error() {
        let lookup = Arc::new(TableLookup::new(&[(1, "Alice"), (2, "Bob")]));
        let store = Arc::new(MemoryStore::default());
        store.failures_left.store(usize::MAX, Ordering::SeqCst);

        let err = coordinator(ScanConfig::new(1, 2, 10), &lookup, &store)
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ScanError::FinalFlush { report, source } => {
                assert_eq!(source.unwritten, 2);
                assert_eq!(report.pending, 2);
                assert_eq!(report.committed, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Lookup that answers ids below `hang_from` immediately and never answers the rest.
    struct HangingLookup {
        hang_from: i64,
        answered: AtomicUsize,
        cancel_after: usize,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl RecordLookup for HangingLookup {
        async fn fetch(&self, id: i64) -> Option<Record> {
            if id >= self.hang_from {
                std::future::pending::<()>().await;
            }
            if self.answered.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_after {
                self.cancel.cancel();
            }
            Some(Record::new(id, format!("user{id}")))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_flushes_buffered_records_once() {
        let cancel = CancellationToken::new();
        let lookup: Arc<dyn RecordLookup> = Arc::new(HangingLookup {
            hang_from: 5,
            answered: AtomicUsize::new(0),
            cancel_after: 4,
            cancel: cancel.clone(),
        });
        let store = Arc::new(MemoryStore::default());
        let sink = BatchSink::new(Arc::clone(&store) as Arc<dyn RecordStore>);

        let config = ScanConfig::new(1, 50, 10)
            .with_max_workers(8)
            .with_drain_grace(Duration::from_millis(200));
        let report = ScanCoordinator::new(config, lookup, NameFilter::default(), sink)
            .unwrap()
            .run(cancel)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.accepted, 4);
        assert_eq!(report.committed, 4);
        assert_eq!(*store.batch_sizes.lock().unwrap(), vec![4]);
        assert_eq!(
            store.rows.lock().unwrap().keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }
}
