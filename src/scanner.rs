use crate::domain::{Filter, Projection, Record};
use crate::error::PurgeError;
use crate::store::{ContinuationToken, TableStore};
use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;

/// Walks every page of one filtered query.
///
/// A scanner is single-use: it ends when the store stops returning a
/// continuation token, or after the first failed page fetch.
pub struct PagedScanner {
    store: Arc<dyn TableStore>,
    table: String,
    filter: Filter,
    projection: Projection,
    continuation: Option<ContinuationToken>,
    finished: bool,
    pages_fetched: usize,
    records_seen: usize,
}

impl PagedScanner {
    pub fn new(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        filter: Filter,
        projection: Projection,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            filter,
            projection,
            continuation: None,
            finished: false,
            pages_fetched: 0,
            records_seen: 0,
        }
    }

    /// Fetches the next page, or `None` once the query is exhausted.
    ///
    /// Pages may be empty while a continuation token is still returned.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Record>>, PurgeError> {
        if self.finished {
            return Ok(None);
        }

        let result = self
            .store
            .scan(
                &self.table,
                &self.filter,
                &self.projection,
                self.continuation.as_ref(),
            )
            .await;
        let page = match result {
            Ok(page) => page,
            Err(source) => {
                self.finished = true;
                return Err(PurgeError::ScanFailed {
                    table: self.table.clone(),
                    pages_fetched: self.pages_fetched,
                    records_seen: self.records_seen,
                    source,
                });
            }
        };

        self.pages_fetched += 1;
        self.records_seen += page.records.len();
        self.finished = page.continuation.is_none();
        self.continuation = page.continuation;
        tracing::trace!(
            table = %self.table,
            pages_fetched = self.pages_fetched,
            page_len = page.records.len(),
            "Fetched page"
        );

        Ok(Some(page.records))
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn records_seen(&self) -> usize {
        self.records_seen
    }

    /// No further page will be requested from the store.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Flattens the remaining pages into a lazy stream of records.
    pub fn into_records(self) -> impl Stream<Item = Result<Record, PurgeError>> + Send {
        stream::try_unfold(self, |mut scanner| async move {
            let page = scanner.next_page().await?;
            Ok::<_, PurgeError>(page.map(|records| {
                let records = stream::iter(records.into_iter().map(Ok::<_, PurgeError>));
                (records, scanner)
            }))
        })
        .try_flatten()
    }
}
