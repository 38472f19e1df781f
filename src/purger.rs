use crate::chunker::BatchChunker;
use crate::domain::{Comparison, Condition, Cutoff, Field, Filter, PartitionKey, Projection};
use crate::error::PurgeError;
use crate::scanner::PagedScanner;
use crate::store::TableStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutcome {
    pub partition: PartitionKey,
    /// In dry-run mode, the records that would have been deleted.
    pub records_deleted: usize,
    pub batches_issued: usize,
    /// The run was cancelled before this partition was exhausted.
    pub cancelled: bool,
}

impl PartitionOutcome {
    fn new(partition: PartitionKey) -> Self {
        Self {
            partition,
            records_deleted: 0,
            batches_issued: 0,
            cancelled: false,
        }
    }
}

/// A partition whose purge stopped on an error.
#[derive(Debug)]
pub struct PartitionFailure {
    pub partition: PartitionKey,
    /// Records removed by the batches that succeeded before the failure.
    pub records_deleted: usize,
    pub batches_issued: usize,
    pub cause: PurgeError,
}

pub struct PartitionPurger {
    store: Arc<dyn TableStore>,
    table: String,
    chunker: BatchChunker,
    dry_run: bool,
}

impl PartitionPurger {
    pub fn new(store: Arc<dyn TableStore>, table: impl Into<String>, chunker: BatchChunker) -> Self {
        Self {
            store,
            table: table.into(),
            chunker,
            dry_run: false,
        }
    }

    /// Scan and count candidates without issuing deletes.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Every record of the partition strictly older than the cutoff,
    /// whatever its row key.
    pub fn filter(partition: &PartitionKey, cutoff: Cutoff) -> Filter {
        Filter::new(Condition::text(
            Field::PartitionKey,
            Comparison::Equal,
            partition.as_ref(),
        ))
        .and(Condition::instant(
            Field::Timestamp,
            Comparison::LessThan,
            cutoff.instant(),
        ))
    }

    /// Deletes the partition's stale records page by page, one batch per chunk.
    ///
    /// The next page is fetched only after every batch of the current page
    /// succeeded. The first failed batch ends the partition. Cancellation is
    /// checked before each store call, so an issued batch always completes.
    #[tracing::instrument(
        name = "Purging partition",
        skip(self, cancel),
        fields(table = %self.table, partition = %partition, cutoff = %cutoff, dry_run = self.dry_run)
    )]
    pub async fn purge_partition(
        &self,
        partition: &PartitionKey,
        cutoff: Cutoff,
        cancel: &CancellationToken,
    ) -> Result<PartitionOutcome, PartitionFailure> {
        let mut outcome = PartitionOutcome::new(partition.clone());

        match self.purge_pages(partition, cutoff, cancel, &mut outcome).await {
            Ok(()) => {
                tracing::info!(
                    records_deleted = outcome.records_deleted,
                    batches_issued = outcome.batches_issued,
                    cancelled = outcome.cancelled,
                    "Partition purge completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    records_deleted = outcome.records_deleted,
                    batches_issued = outcome.batches_issued,
                    "Partition purge failed"
                );
                Err(PartitionFailure {
                    partition: outcome.partition,
                    records_deleted: outcome.records_deleted,
                    batches_issued: outcome.batches_issued,
                    cause: e,
                })
            }
        }
    }

    async fn purge_pages(
        &self,
        partition: &PartitionKey,
        cutoff: Cutoff,
        cancel: &CancellationToken,
        outcome: &mut PartitionOutcome,
    ) -> Result<(), PurgeError> {
        let mut scanner = PagedScanner::new(
            Arc::clone(&self.store),
            self.table.clone(),
            Self::filter(partition, cutoff),
            Projection::columns([Field::PartitionKey, Field::RowKey]),
        );
        let mut chunk_index = 0;

        loop {
            if cancel.is_cancelled() && !scanner.is_finished() {
                outcome.cancelled = true;
                return Ok(());
            }
            let Some(page) = scanner.next_page().await? else {
                return Ok(());
            };

            let keys = page
                .into_iter()
                .filter_map(|record| {
                    let key = record.into_key();
                    if key.is_none() {
                        tracing::warn!("Skipping a record returned without its row key");
                    }
                    key
                })
                .filter(|key| key.partition_key == partition.as_ref());

            for chunk in self.chunker.chunk(keys) {
                if self.dry_run {
                    outcome.records_deleted += chunk.len();
                    continue;
                }
                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    return Ok(());
                }

                self.store
                    .batch_delete(&self.table, chunk.keys())
                    .await
                    .map_err(|source| PurgeError::BatchDeleteFailed {
                        partition: partition.clone(),
                        chunk_index,
                        source,
                    })?;

                outcome.records_deleted += chunk.len();
                outcome.batches_issued += 1;
                tracing::debug!(chunk_index, batch_len = chunk.len(), "Batch deleted");
                chunk_index += 1;
            }
        }
    }
}
