use crate::domain::{Comparison, Condition, Cutoff, Field, Filter, PartitionKey, Projection};
use crate::error::PurgeError;
use crate::scanner::PagedScanner;
use crate::store::TableStore;
use futures::TryStreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Partitions holding a sentinel at or before the cutoff.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EligiblePartitions {
    pub partitions: BTreeSet<PartitionKey>,
    /// Sentinel records observed, duplicates included.
    pub records_discovered: usize,
}

pub struct EligibilityFinder {
    store: Arc<dyn TableStore>,
    table: String,
    sentinel_row_key: String,
}

impl EligibilityFinder {
    pub fn new(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        sentinel_row_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            sentinel_row_key: sentinel_row_key.into(),
        }
    }

    /// Matches the sentinel row key with an inclusive cutoff comparison.
    pub fn filter(&self, cutoff: Cutoff) -> Filter {
        Filter::new(Condition::text(
            Field::RowKey,
            Comparison::Equal,
            self.sentinel_row_key.clone(),
        ))
        .and(Condition::instant(
            Field::Timestamp,
            Comparison::LessThanOrEqual,
            cutoff.instant(),
        ))
    }

    #[tracing::instrument(
        name = "Finding eligible partitions",
        skip(self),
        fields(table = %self.table, sentinel = %self.sentinel_row_key, cutoff = %cutoff)
    )]
    pub async fn find_eligible_partitions(
        &self,
        cutoff: Cutoff,
    ) -> Result<EligiblePartitions, PurgeError> {
        let scanner = PagedScanner::new(
            Arc::clone(&self.store),
            self.table.clone(),
            self.filter(cutoff),
            Projection::columns([Field::PartitionKey]),
        );

        let eligible = scanner
            .into_records()
            .try_fold(EligiblePartitions::default(), |mut eligible, record| async move {
                eligible.records_discovered += 1;
                eligible
                    .partitions
                    .insert(PartitionKey::from(record.partition_key));
                Ok(eligible)
            })
            .await?;

        tracing::info!(
            records_discovered = eligible.records_discovered,
            eligible_partitions = eligible.partitions.len(),
            "Eligible partitions discovered"
        );
        Ok(eligible)
    }
}
