mod http;
mod memory;

pub use http::HttpTableClient;
pub use memory::InMemoryTableStore;

use crate::domain::{EntityKey, Filter, Projection, Record};
use async_trait::async_trait;

/// Largest number of operations the store accepts in one atomic batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Opaque cursor naming where the next page of a query resumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    pub next_partition_key: String,
    pub next_row_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// `None` once the query is exhausted.
    pub continuation: Option<ContinuationToken>,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error("store rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("entity ({partition_key}, {row_key}) does not exist")]
    EntityNotFound {
        partition_key: String,
        row_key: String,
    },

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Client operations the purge core needs from a partitioned table store.
///
/// Implementations are shared across workers and must tolerate concurrent calls.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Fetches one page of records matching `filter`.
    async fn scan(
        &self,
        table: &str,
        filter: &Filter,
        projection: &Projection,
        continuation: Option<&ContinuationToken>,
    ) -> Result<Page, StoreError>;

    /// Deletes every named record atomically. `keys` must share one partition
    /// and hold at most [`MAX_BATCH_SIZE`] entries.
    async fn batch_delete(&self, table: &str, keys: &[EntityKey]) -> Result<(), StoreError>;
}

/// Rejects batches the store would refuse as a whole.
pub(crate) fn check_batch(keys: &[EntityKey]) -> Result<(), StoreError> {
    let Some(first) = keys.first() else {
        return Err(StoreError::InvalidBatch("batch is empty".into()));
    };
    if keys.len() > MAX_BATCH_SIZE {
        return Err(StoreError::InvalidBatch(format!(
            "batch holds {} operations, the limit is {MAX_BATCH_SIZE}",
            keys.len()
        )));
    }
    if keys.iter().any(|k| k.partition_key != first.partition_key) {
        return Err(StoreError::InvalidBatch(
            "batch spans more than one partition".into(),
        ));
    }
    Ok(())
}
