//! Resumable batch processor: drives a unit of work over every row once,
//! persisting each result so an interrupted run can pick up where it left off.

use std::collections::HashSet;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::ProcessorError;
use crate::models::{
    BatchReport, CheckpointInfo, ProcessingConfig, RowId, RunRecord, RunSummary, WorkItem,
};
use crate::services::store::OutputStore;
use crate::services::work::UnitOfWork;
use crate::utils::retry::{RetryConfig, RetryResult, with_retry};

/// Settings for one processor run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Rows per batch; progress reporting only.
    pub batch_size: usize,
    /// Rows processed between checkpoint writes.
    pub checkpoint_every: usize,
    pub retry: RetryConfig,
}

impl ProcessorConfig {
    pub fn new(batch_size: usize, checkpoint_every: usize) -> Self {
        Self {
            batch_size,
            checkpoint_every,
            retry: RetryConfig::default(),
        }
    }

    pub fn from_settings(processing: &ProcessingConfig, retry: &RetryConfig) -> Self {
        Self {
            batch_size: processing.batch_size,
            checkpoint_every: processing.checkpoint_every,
            retry: retry.clone(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Progress callbacks. All methods default to no-ops.
pub trait RunObserver {
    fn on_start(&mut self, _pending: u64, _skipped: u64) {}
    fn on_record(&mut self, _record: &RunRecord) {}
    fn on_batch(&mut self, _report: &BatchReport) {}
    fn on_checkpoint(&mut self, _checkpoint: &CheckpointInfo) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    config: ProcessorConfig,
    cancellation: CancellationToken,
}

impl BatchProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self, ProcessorError> {
        if config.batch_size == 0 {
            return Err(ProcessorError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if config.checkpoint_every == 0 {
            return Err(ProcessorError::InvalidConfig(
                "checkpoint_every must be positive".to_string(),
            ));
        }
        Ok(Self {
            config,
            cancellation: CancellationToken::new(),
        })
    }

    /// Stop the run when `token` is cancelled.
    ///
    /// The in-flight row is abandoned, a checkpoint of every recorded result
    /// is written, and the run returns [`ProcessorError::Interrupted`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub async fn run<W, S>(
        &self,
        items: &[WorkItem],
        work: &W,
        store: &mut S,
    ) -> Result<RunSummary, ProcessorError>
    where
        W: UnitOfWork + ?Sized,
        S: OutputStore + ?Sized,
    {
        self.run_with_observer(items, work, store, &mut NoopObserver)
            .await
    }

    /// Process every item whose row id has no stored result yet.
    ///
    /// Per-row failures are recorded as failed results; only store errors
    /// and cancellation abort the run. Before an abort, a last checkpoint of
    /// everything recorded so far is attempted.
    pub async fn run_with_observer<W, S>(
        &self,
        items: &[WorkItem],
        work: &W,
        store: &mut S,
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary, ProcessorError>
    where
        W: UnitOfWork + ?Sized,
        S: OutputStore + ?Sized,
    {
        if items.is_empty() {
            return Err(ProcessorError::EmptyInput);
        }

        let start_time = Instant::now();
        let mut results = store.load_records()?;
        let mut done: HashSet<RowId> = results.iter().map(|r| r.row).collect();

        let pending: Vec<&WorkItem> = items.iter().filter(|i| !done.contains(&i.row())).collect();
        let total_batches = pending.len().div_ceil(self.config.batch_size) as u64;

        let mut summary = RunSummary {
            rows_total: items.len() as u64,
            rows_skipped_already_done: (items.len() - pending.len()) as u64,
            ..Default::default()
        };

        tracing::info!(
            total = items.len(),
            pending = pending.len(),
            skipped = summary.rows_skipped_already_done,
            batches = total_batches,
            "starting run"
        );
        observer.on_start(pending.len() as u64, summary.rows_skipped_already_done);

        let mut since_checkpoint = 0usize;
        let mut last_checkpoint_covers_all = false;

        for (batch_index, batch) in pending.chunks(self.config.batch_size).enumerate() {
            let batch_number = batch_index as u64 + 1;
            let mut report = BatchReport {
                batch: batch_number,
                total_batches,
                first_row: batch[0].row(),
                last_row: batch[batch.len() - 1].row(),
                rows: 0,
                succeeded: 0,
                failed: 0,
            };
            tracing::debug!(batch = batch_number, total_batches, rows = batch.len(), "starting batch");

            for item in batch {
                // Duplicate row ids in the input are recorded once.
                if done.contains(&item.row()) {
                    summary.rows_skipped_already_done += 1;
                    continue;
                }

                let record = tokio::select! {
                    biased;
                    _ = self.cancellation.cancelled() => {
                        tracing::warn!(row = %item.row(), "run interrupted, saving checkpoint");
                        self.final_save(store, &results, observer);
                        return Err(ProcessorError::Interrupted);
                    }
                    record = self.process_item(work, item) => record,
                };

                if let Err(e) = store.append(&record) {
                    tracing::error!(row = %item.row(), error = %e, "failed to persist result");
                    self.final_save(store, &results, observer);
                    return Err(e.into());
                }

                done.insert(record.row);
                summary.rows_processed += 1;
                report.rows += 1;
                if record.is_success() {
                    summary.rows_succeeded += 1;
                    report.succeeded += 1;
                } else {
                    summary.rows_failed += 1;
                    report.failed += 1;
                }
                observer.on_record(&record);
                results.push(record);
                since_checkpoint += 1;
                last_checkpoint_covers_all = false;

                if since_checkpoint >= self.config.checkpoint_every {
                    let info = store.checkpoint(&results)?;
                    observer.on_checkpoint(&info);
                    summary.checkpoints_written += 1;
                    since_checkpoint = 0;
                    last_checkpoint_covers_all = true;
                }
            }

            summary.batches += 1;
            tracing::info!(
                batch = report.batch,
                total_batches,
                rows = report.rows,
                succeeded = report.succeeded,
                failed = report.failed,
                success_rate = format!("{:.2}%", report.success_rate()),
                "batch complete"
            );
            observer.on_batch(&report);
        }

        if !last_checkpoint_covers_all {
            let info = store.checkpoint(&results)?;
            observer.on_checkpoint(&info);
            summary.checkpoints_written += 1;
        }

        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            processed = summary.rows_processed,
            succeeded = summary.rows_succeeded,
            failed = summary.rows_failed,
            skipped = summary.rows_skipped_already_done,
            duration_ms = summary.duration_ms,
            "run complete"
        );
        Ok(summary)
    }

    /// Run the unit of work for one item through the retry policy.
    async fn process_item<W>(&self, work: &W, item: &WorkItem) -> RunRecord
    where
        W: UnitOfWork + ?Sized,
    {
        match with_retry(&self.config.retry, || work.process(item)).await {
            RetryResult::Success { value, attempts } => {
                tracing::debug!(row = %item.row(), attempts, "row succeeded");
                RunRecord::success(item, value, attempts)
            }
            RetryResult::Failed {
                last_error,
                attempts,
            } => {
                tracing::warn!(
                    row = %item.row(),
                    attempts,
                    kind = %last_error.kind(),
                    error = %last_error,
                    "row failed"
                );
                RunRecord::failure(item, &last_error, attempts)
            }
        }
    }

    fn final_save<S>(&self, store: &mut S, results: &[RunRecord], observer: &mut dyn RunObserver)
    where
        S: OutputStore + ?Sized,
    {
        match store.checkpoint(results) {
            Ok(info) => observer.on_checkpoint(&info),
            Err(e) => tracing::error!(error = %e, "final checkpoint failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, WorkError};
    use crate::models::{ErrorKind, Fields, RecordStatus, WorkOutput};
    use crate::services::store::JsonlStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn items(n: u64) -> Vec<WorkItem> {
        (1..=n)
            .map(|row| {
                let mut fields = Fields::new();
                fields.insert("text".into(), json!(format!("speech {row}")));
                WorkItem::new(row, fields)
            })
            .collect()
    }

    fn config(batch_size: usize, checkpoint_every: usize) -> ProcessorConfig {
        ProcessorConfig::new(batch_size, checkpoint_every).with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
    }

    /// Echoes the row text and counts calls per row.
    #[derive(Default)]
    struct Echo {
        calls: Mutex<Vec<RowId>>,
    }

    #[async_trait]
    impl UnitOfWork for Echo {
        async fn process(&self, item: &WorkItem) -> Result<WorkOutput, WorkError> {
            self.calls.lock().unwrap().push(item.row());
            Ok(WorkOutput::new(item.text("text").unwrap_or_default()))
        }
    }

    /// Fails with a scripted error sequence per row, then succeeds.
    struct Scripted {
        script: Mutex<HashMap<RowId, Vec<WorkError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: Vec<(u64, Vec<WorkError>)>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().map(|(r, e)| (RowId(r), e)).collect()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl UnitOfWork for Scripted {
        async fn process(&self, item: &WorkItem) -> Result<WorkOutput, WorkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if let Some(errors) = script.get_mut(&item.row())
                && !errors.is_empty()
            {
                return Err(errors.remove(0));
            }
            Ok(WorkOutput::new("ok"))
        }
    }

    /// JSONL store that fails every append after `limit` successful ones.
    struct Crashing {
        inner: JsonlStore,
        limit: usize,
        appended: usize,
    }

    impl OutputStore for Crashing {
        fn load_records(&self) -> Result<Vec<RunRecord>, StoreError> {
            self.inner.load_records()
        }

        fn append(&mut self, record: &RunRecord) -> Result<(), StoreError> {
            if self.appended >= self.limit {
                return Err(StoreError::io(
                    self.inner.results_path(),
                    std::io::Error::other("disk full"),
                ));
            }
            self.appended += 1;
            self.inner.append(record)
        }

        fn checkpoint(&mut self, records: &[RunRecord]) -> Result<CheckpointInfo, StoreError> {
            self.inner.checkpoint(records)
        }
    }

    /// Answers rows up to `after` immediately and hangs on the rest.
    struct Stalls {
        after: u64,
    }

    #[async_trait]
    impl UnitOfWork for Stalls {
        async fn process(&self, item: &WorkItem) -> Result<WorkOutput, WorkError> {
            if item.row().0 > self.after {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(WorkOutput::new("ok"))
        }
    }

    #[derive(Default)]
    struct Recorder {
        checkpoints: Vec<u64>,
        batches: Vec<BatchReport>,
        records: Vec<RowId>,
    }

    impl RunObserver for Recorder {
        fn on_record(&mut self, record: &RunRecord) {
            self.records.push(record.row);
        }

        fn on_batch(&mut self, report: &BatchReport) {
            self.batches.push(report.clone());
        }

        fn on_checkpoint(&mut self, checkpoint: &CheckpointInfo) {
            self.checkpoints.push(checkpoint.records);
        }
    }

    fn rows(records: &[RunRecord]) -> Vec<u64> {
        records.iter().map(|r| r.row.0).collect()
    }

    #[test]
    fn test_rejects_non_positive_settings() {
        assert!(BatchProcessor::new(ProcessorConfig::new(0, 3)).is_err());
        assert!(BatchProcessor::new(ProcessorConfig::new(3, 0)).is_err());
        assert!(BatchProcessor::new(ProcessorConfig::new(1, 1)).is_ok());
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(3, 3)).unwrap();
        let result = processor.run(&[], &Echo::default(), &mut store).await;
        assert!(matches!(result, Err(ProcessorError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_seven_rows_checkpoint_every_three() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(3, 3)).unwrap();
        let mut recorder = Recorder::default();

        let summary = processor
            .run_with_observer(&items(7), &Echo::default(), &mut store, &mut recorder)
            .await
            .unwrap();

        assert_eq!(summary.rows_processed, 7);
        assert_eq!(summary.rows_failed, 0);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.checkpoints_written, 3);
        assert_eq!(recorder.checkpoints, vec![3, 6, 7]);
        assert_eq!(recorder.batches.len(), 3);
        assert_eq!(recorder.batches[2].rows, 1);

        let stored = store.read_log().unwrap();
        assert_eq!(rows(&stored), vec![1, 2, 3, 4, 5, 6, 7]);

        let (_, latest) = store.latest_checkpoint().unwrap().unwrap();
        assert_eq!(rows(&JsonlStore::read_checkpoint(&latest).unwrap()), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(store.list_checkpoints().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_no_duplicate_final_checkpoint_on_exact_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(3, 3)).unwrap();

        let summary = processor.run(&items(6), &Echo::default(), &mut store).await.unwrap();
        assert_eq!(summary.checkpoints_written, 2);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(config(2, 2)).unwrap();
        let input = items(5);

        let mut store = JsonlStore::open(dir.path()).unwrap();
        processor.run(&input, &Echo::default(), &mut store).await.unwrap();

        let echo = Echo::default();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let summary = processor.run(&input, &echo, &mut store).await.unwrap();

        assert_eq!(summary.rows_skipped_already_done, input.len() as u64);
        assert_eq!(summary.rows_processed, 0);
        assert!(echo.calls.lock().unwrap().is_empty());
        assert_eq!(store.read_log().unwrap().len(), 5);

        // The closing checkpoint still holds the whole result set.
        let (_, latest) = store.latest_checkpoint().unwrap().unwrap();
        assert_eq!(JsonlStore::read_checkpoint(&latest).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_crash_then_resume_has_one_result_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(config(3, 3)).unwrap();
        let input = items(10);

        let mut crashing = Crashing {
            inner: JsonlStore::open(dir.path()).unwrap(),
            limit: 4,
            appended: 0,
        };
        let err = processor
            .run(&input, &Echo::default(), &mut crashing)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Store(_)));

        // Checkpoint after row 3 plus the last-chance save of rows 1-4.
        let (_, latest) = crashing.inner.latest_checkpoint().unwrap().unwrap();
        assert_eq!(rows(&JsonlStore::read_checkpoint(&latest).unwrap()), vec![1, 2, 3, 4]);

        let echo = Echo::default();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let summary = processor.run(&input, &echo, &mut store).await.unwrap();

        assert_eq!(summary.rows_skipped_already_done, 4);
        assert_eq!(summary.rows_processed, 6);
        assert_eq!(
            echo.calls.lock().unwrap().iter().map(|r| r.0).collect::<Vec<_>>(),
            vec![5, 6, 7, 8, 9, 10]
        );

        let stored = store.read_log().unwrap();
        assert_eq!(rows(&stored), (1..=10).collect::<Vec<_>>());

        let (_, latest) = store.latest_checkpoint().unwrap().unwrap();
        assert_eq!(rows(&JsonlStore::read_checkpoint(&latest).unwrap()), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_checkpoints_everything_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let token = CancellationToken::new();
        let processor = BatchProcessor::new(config(3, 3))
            .unwrap()
            .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        });
        let err = processor
            .run(&items(10), &Stalls { after: 5 }, &mut store)
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, ProcessorError::Interrupted));

        let log = store.read_log().unwrap();
        assert_eq!(rows(&log), vec![1, 2, 3, 4, 5]);
        let (_, latest) = store.latest_checkpoint().unwrap().unwrap();
        assert_eq!(rows(&JsonlStore::read_checkpoint(&latest).unwrap()), rows(&log));

        let echo = Echo::default();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let summary = BatchProcessor::new(config(3, 3))
            .unwrap()
            .run(&items(10), &echo, &mut store)
            .await
            .unwrap();
        assert_eq!(summary.rows_skipped_already_done, 5);
        assert_eq!(echo.calls.lock().unwrap().first(), Some(&RowId(6)));
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint_when_log_is_lost() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(config(2, 2)).unwrap();
        let input = items(5);

        let mut store = JsonlStore::open(dir.path()).unwrap();
        processor.run(&input[..4], &Echo::default(), &mut store).await.unwrap();
        std::fs::remove_file(store.results_path()).unwrap();

        let echo = Echo::default();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let summary = processor.run(&input, &echo, &mut store).await.unwrap();
        assert_eq!(summary.rows_skipped_already_done, 4);
        assert_eq!(*echo.calls.lock().unwrap(), vec![RowId(5)]);
    }

    #[tokio::test]
    async fn test_results_keep_input_order_under_retries() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(4, 100)).unwrap();
        let work = Scripted::new(vec![
            (2, vec![WorkError::Transient("timeout".into())]),
            (
                5,
                vec![
                    WorkError::Transient("timeout".into()),
                    WorkError::Transient("502".into()),
                ],
            ),
        ]);

        processor.run(&items(8), &work, &mut store).await.unwrap();
        assert_eq!(rows(&store.read_log().unwrap()), (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_transient_twice_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(5, 5)).unwrap();
        let work = Scripted::new(vec![(
            1,
            vec![
                WorkError::Transient("timeout".into()),
                WorkError::RateLimited {
                    message: "429".into(),
                    retry_after: Some(Duration::from_millis(5)),
                },
            ],
        )]);

        let summary = processor.run(&items(1), &work, &mut store).await.unwrap();
        assert_eq!(summary.rows_succeeded, 1);
        assert_eq!(work.calls.load(Ordering::SeqCst), 3);

        let stored = store.read_log().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, RecordStatus::Success);
        assert_eq!(stored[0].attempts, 3);
        assert!(stored[0].error.is_none());
    }

    #[tokio::test]
    async fn test_transient_exhaustion_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(5, 5)).unwrap();
        let work = Scripted::new(vec![(
            2,
            (0..10).map(|_| WorkError::Transient("503".into())).collect(),
        )]);

        let summary = processor.run(&items(3), &work, &mut store).await.unwrap();
        assert_eq!(summary.rows_failed, 1);
        assert_eq!(summary.rows_succeeded, 2);

        let stored = store.read_log().unwrap();
        let marker = stored[1].error.as_ref().unwrap();
        assert_eq!(marker.kind, ErrorKind::Transient);
        assert_eq!(stored[1].attempts, 4);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(3, 4)).unwrap();
        let work = Scripted::new(vec![(5, vec![WorkError::Permanent("rejected".into())])]);

        let summary = processor.run(&items(10), &work, &mut store).await.unwrap();
        assert_eq!(summary.rows_processed, 10);
        assert_eq!(summary.rows_failed, 1);
        assert_eq!(work.calls.load(Ordering::SeqCst), 10, "no retry for permanent errors");

        let stored = store.read_log().unwrap();
        assert_eq!(stored.len(), 10);
        for record in &stored {
            if record.row == RowId(5) {
                assert_eq!(record.status, RecordStatus::Failed);
                assert_eq!(record.error.as_ref().unwrap().kind, ErrorKind::Permanent);
                assert_eq!(record.attempts, 1);
            } else {
                assert_eq!(record.status, RecordStatus::Success);
            }
        }
    }

    #[tokio::test]
    async fn test_unclassified_error_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(2, 2)).unwrap();
        let work = Scripted::new(vec![(1, vec![WorkError::from(anyhow::anyhow!("boom"))])]);

        processor.run(&items(2), &work, &mut store).await.unwrap();
        assert_eq!(work.calls.load(Ordering::SeqCst), 2);
        let stored = store.read_log().unwrap();
        assert_eq!(stored[0].error.as_ref().unwrap().kind, ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_failed_rows_are_not_retried_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(config(2, 2)).unwrap();
        let input = items(3);

        let mut store = JsonlStore::open(dir.path()).unwrap();
        let work = Scripted::new(vec![(2, vec![WorkError::Permanent("bad".into())])]);
        processor.run(&input, &work, &mut store).await.unwrap();

        let echo = Echo::default();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let summary = processor.run(&input, &echo, &mut store).await.unwrap();
        assert_eq!(summary.rows_processed, 0);
        assert!(echo.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_row_ids_are_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(10, 10)).unwrap();
        let mut input = items(3);
        input.push(input[1].clone());

        let summary = processor.run(&input, &Echo::default(), &mut store).await.unwrap();
        assert_eq!(summary.rows_processed, 3);
        assert_eq!(summary.rows_skipped_already_done, 1);
        assert_eq!(rows(&store.read_log().unwrap()), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_observer_sees_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let processor = BatchProcessor::new(config(2, 10)).unwrap();
        let mut recorder = Recorder::default();

        processor
            .run_with_observer(&items(5), &Echo::default(), &mut store, &mut recorder)
            .await
            .unwrap();
        assert_eq!(
            recorder.records,
            vec![RowId(1), RowId(2), RowId(3), RowId(4), RowId(5)]
        );
        assert_eq!(recorder.batches[0].first_row, RowId(1));
        assert_eq!(recorder.batches[0].last_row, RowId(2));
        assert_eq!(recorder.checkpoints, vec![5]);
    }
}
