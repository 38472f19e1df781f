use crate::domain::PartitionKey;
use crate::store::StoreError;

#[derive(thiserror::Error)]
pub enum PurgeError {
    #[error(
        "scan of table `{table}` failed after {pages_fetched} page(s) and {records_seen} record(s)"
    )]
    ScanFailed {
        table: String,
        pages_fetched: usize,
        records_seen: usize,
        #[source]
        source: StoreError,
    },

    #[error("batch delete of chunk {chunk_index} in partition `{partition}` failed")]
    BatchDeleteFailed {
        partition: PartitionKey,
        chunk_index: usize,
        #[source]
        source: StoreError,
    },

    #[error("purge task for partition `{partition}` terminated abnormally: {message}")]
    TaskAborted {
        partition: PartitionKey,
        message: String,
    },
}

impl std::fmt::Debug for PurgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

pub fn error_chain_fmt(
    e: &dyn std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{e}")?;

    let mut current = e.source();
    while let Some(cause) = current {
        // `{:#?}` prints each cause with Debug, plain `{:?}` with Display
        if f.alternate() {
            writeln!(f, "Caused by:\n\t{cause:?}")?;
        } else {
            writeln!(f, "Caused by:\n\t{cause}")?;
        }
        current = cause.source();
    }
    Ok(())
}
