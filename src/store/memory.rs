use super::{ContinuationToken, Page, StoreError, TableStore, check_batch};
use crate::domain::{EntityKey, Filter, Projection, Record};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

type Table = BTreeMap<(String, String), Record>;

/// A table store held in process memory.
///
/// Records are ordered by `(PartitionKey, RowKey)`, pages hold at most
/// `page_size` records and batches are applied all-or-nothing.
pub struct InMemoryTableStore {
    tables: Mutex<HashMap<String, Table>>,
    page_size: usize,
}

impl InMemoryTableStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub async fn create_table(&self, table: &str) {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default();
    }

    /// Inserts or replaces a record, creating the table if needed. Records
    /// written without a timestamp get the current time.
    pub async fn upsert(&self, table: &str, mut record: Record) -> Result<(), StoreError> {
        let Some(row_key) = record.row_key.clone() else {
            return Err(StoreError::Rejected {
                status: 400,
                message: "record has no row key".into(),
            });
        };
        record.timestamp.get_or_insert_with(Utc::now);

        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .insert((record.partition_key.clone(), row_key), record);
        Ok(())
    }

    pub async fn contains(&self, table: &str, key: &EntityKey) -> bool {
        self.tables.lock().await.get(table).is_some_and(|t| {
            t.contains_key(&(key.partition_key.clone(), key.row_key.clone()))
        })
    }

    /// Keys of every record in the table, in store order.
    pub async fn keys(&self, table: &str) -> Vec<EntityKey> {
        self.tables
            .lock()
            .await
            .get(table)
            .map(|t| {
                t.keys()
                    .map(|(pk, rk)| EntityKey::new(pk.clone(), rk.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn table_not_found(table: &str) -> StoreError {
        StoreError::Rejected {
            status: 404,
            message: format!("table `{table}` does not exist"),
        }
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn scan(
        &self,
        table: &str,
        filter: &Filter,
        projection: &Projection,
        continuation: Option<&ContinuationToken>,
    ) -> Result<Page, StoreError> {
        let tables = self.tables.lock().await;
        let rows = tables.get(table).ok_or_else(|| Self::table_not_found(table))?;

        let start = continuation.map(|token| {
            (
                token.next_partition_key.clone(),
                token.next_row_key.clone().unwrap_or_default(),
            )
        });
        let mut matching = rows
            .range(start.unwrap_or_default()..)
            .filter(|(_, record)| filter.matches(record));

        let records: Vec<Record> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(_, record)| projection.apply(record))
            .collect();
        let continuation = matching.next().map(|((pk, rk), _)| ContinuationToken {
            next_partition_key: pk.clone(),
            next_row_key: Some(rk.clone()),
        });

        Ok(Page {
            records,
            continuation,
        })
    }

    async fn batch_delete(&self, table: &str, keys: &[EntityKey]) -> Result<(), StoreError> {
        check_batch(keys)?;
        let mut tables = self.tables.lock().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| Self::table_not_found(table))?;

        let row_keys: Vec<(String, String)> = keys
            .iter()
            .map(|k| (k.partition_key.clone(), k.row_key.clone()))
            .collect();
        if let Some((partition_key, row_key)) = row_keys.iter().find(|k| !rows.contains_key(*k)) {
            return Err(StoreError::EntityNotFound {
                partition_key: partition_key.clone(),
                row_key: row_key.clone(),
            });
        }

        for key in &row_keys {
            rows.remove(key);
        }
        Ok(())
    }
}
