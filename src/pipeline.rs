use crate::chunker::BatchChunker;
use crate::domain::{Cutoff, PartitionKey};
use crate::eligibility::EligibilityFinder;
use crate::error::PurgeError;
use crate::purger::{PartitionFailure, PartitionOutcome, PartitionPurger};
use crate::store::{MAX_BATCH_SIZE, TableStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

type PartitionResult = Result<PartitionOutcome, PartitionFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub batch_size: usize,
    /// Number of workers purging partitions at the same time.
    pub max_parallelism: usize,
    /// Partitions waiting for a worker before dispatch blocks.
    pub queue_capacity: usize,
    pub dry_run: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            max_parallelism: 16,
            queue_capacity: 100,
            dry_run: false,
        }
    }
}

/// Result of one purge run.
#[derive(Debug)]
pub struct PurgeSummary {
    pub run_id: Uuid,
    pub cutoff: Cutoff,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub eligible_partition_count: usize,
    pub total_records_discovered: usize,
    pub total_records_deleted: usize,
    pub batches_issued: usize,
    pub failures: Vec<PartitionFailure>,
    /// Eligible partitions never started because the run was cancelled.
    pub skipped_partitions: usize,
    /// Cancellation cut the run short: a partition was skipped or stopped
    /// before it was exhausted.
    pub cancelled: bool,
    pub dry_run: bool,
}

impl PurgeSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled && self.skipped_partitions == 0
    }
}

/// Discovers eligible partitions once, then purges them on a fixed pool of
/// workers fed through a bounded queue.
pub struct PurgePipeline {
    finder: EligibilityFinder,
    purger: Arc<PartitionPurger>,
    options: PipelineOptions,
}

impl PurgePipeline {
    pub fn new(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        sentinel_row_key: impl Into<String>,
        options: PipelineOptions,
    ) -> Self {
        let table = table.into();
        let finder = EligibilityFinder::new(Arc::clone(&store), table.clone(), sentinel_row_key);
        let purger = PartitionPurger::new(store, table, BatchChunker::new(options.batch_size))
            .dry_run(options.dry_run);

        Self {
            finder,
            purger: Arc::new(purger),
            options,
        }
    }

    /// Runs both phases. Fails only when discovery fails; partition failures
    /// are collected in the summary without stopping sibling partitions.
    pub async fn run(
        &self,
        cutoff: Cutoff,
        cancel: CancellationToken,
    ) -> Result<PurgeSummary, PurgeError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("Purge run", %run_id, %cutoff);
        self.run_inner(run_id, cutoff, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        cutoff: Cutoff,
        cancel: CancellationToken,
    ) -> Result<PurgeSummary, PurgeError> {
        let started_at = Utc::now();
        tracing::info!(
            max_parallelism = self.options.max_parallelism,
            queue_capacity = self.options.queue_capacity,
            batch_size = self.options.batch_size,
            dry_run = self.options.dry_run,
            "Starting purge run"
        );

        let eligible = self.finder.find_eligible_partitions(cutoff).await?;
        let eligible_partition_count = eligible.partitions.len();

        let (sender, receiver) = mpsc::channel::<PartitionKey>(self.options.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (results, mut finished) = mpsc::unbounded_channel::<PartitionResult>();

        let mut workers = JoinSet::new();
        for worker_id in 0..self.options.max_parallelism.max(1) {
            let receiver = Arc::clone(&receiver);
            let purger = Arc::clone(&self.purger);
            let cancel = cancel.clone();
            let results = results.clone();
            let span = tracing::info_span!("Purge worker", worker_id);
            workers.spawn(worker_loop(receiver, purger, cutoff, cancel, results).instrument(span));
        }
        drop(receiver);
        drop(results);

        let dispatched = dispatch(eligible.partitions, sender, cancel.clone()).await;
        tracing::debug!(dispatched, "Dispatch finished");

        // Results arrive as each partition finishes, so a worker that dies
        // takes nothing already reported with it.
        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        while let Some(result) = finished.recv().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(failure) => failures.push(failure),
            }
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error.message = %e, "Purge worker terminated abnormally");
            }
        }

        let skipped_partitions =
            eligible_partition_count.saturating_sub(outcomes.len() + failures.len());
        let cancelled = cancel.is_cancelled()
            && (skipped_partitions > 0 || outcomes.iter().any(|o| o.cancelled));
        let summary = PurgeSummary {
            run_id,
            cutoff,
            started_at,
            completed_at: Utc::now(),
            eligible_partition_count,
            total_records_discovered: eligible.records_discovered,
            total_records_deleted: outcomes.iter().map(|o| o.records_deleted).sum::<usize>()
                + failures.iter().map(|f| f.records_deleted).sum::<usize>(),
            batches_issued: outcomes.iter().map(|o| o.batches_issued).sum::<usize>()
                + failures.iter().map(|f| f.batches_issued).sum::<usize>(),
            skipped_partitions,
            failures,
            cancelled,
            dry_run: self.options.dry_run,
        };

        tracing::info!(
            eligible_partitions = summary.eligible_partition_count,
            total_records_discovered = summary.total_records_discovered,
            total_records_deleted = summary.total_records_deleted,
            batches_issued = summary.batches_issued,
            failed_partitions = summary.failures.len(),
            skipped_partitions = summary.skipped_partitions,
            cancelled = summary.cancelled,
            duration_ms = (summary.completed_at - summary.started_at).num_milliseconds(),
            "Purge run completed"
        );
        Ok(summary)
    }
}

/// Queues partitions for the workers, waiting whenever the queue is full.
/// Stops early on cancellation or once no worker is left to receive.
/// Returns how many partitions were queued.
async fn dispatch<I>(
    partitions: I,
    sender: mpsc::Sender<PartitionKey>,
    cancel: CancellationToken,
) -> usize
where
    I: IntoIterator<Item = PartitionKey>,
{
    let mut dispatched = 0;
    for partition in partitions {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Purge run cancelled, no further partitions dispatched");
                break;
            }
            sent = sender.send(partition) => {
                if sent.is_err() {
                    tracing::error!("Every purge worker has stopped, dispatch aborted");
                    break;
                }
                dispatched += 1;
            }
        }
    }
    dispatched
}

async fn worker_loop(
    receiver: Arc<Mutex<mpsc::Receiver<PartitionKey>>>,
    purger: Arc<PartitionPurger>,
    cutoff: Cutoff,
    cancel: CancellationToken,
    results: mpsc::UnboundedSender<PartitionResult>,
) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                partition = receiver.recv() => partition,
            }
        };
        let Some(partition) = next else {
            break;
        };

        let result = purge_in_task(&purger, partition, cutoff, &cancel).await;
        if results.send(result).is_err() {
            break;
        }
    }
}

/// Purges one partition on its own task, so a panic fails that partition
/// instead of the worker. Deletions made before a panic are not counted.
async fn purge_in_task(
    purger: &Arc<PartitionPurger>,
    partition: PartitionKey,
    cutoff: Cutoff,
    cancel: &CancellationToken,
) -> PartitionResult {
    let task = {
        let purger = Arc::clone(purger);
        let partition = partition.clone();
        let cancel = cancel.clone();
        tokio::spawn(
            async move { purger.purge_partition(&partition, cutoff, &cancel).await }
                .in_current_span(),
        )
    };

    match task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(
                partition = %partition,
                error.message = %e,
                "Partition purge task terminated abnormally"
            );
            Err(PartitionFailure {
                partition: partition.clone(),
                records_deleted: 0,
                batches_issued: 0,
                cause: PurgeError::TaskAborted {
                    partition,
                    message: e.to_string(),
                },
            })
        }
    }
}
