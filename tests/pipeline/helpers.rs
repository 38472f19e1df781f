use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tablepurge::configuration::TelemetrySettings;
use tablepurge::domain::{
    Comparison, Cutoff, EntityKey, Field, Filter, FilterValue, Projection, Record,
};
use tablepurge::pipeline::{PipelineOptions, PurgePipeline, PurgeSummary};
use tablepurge::store::{ContinuationToken, InMemoryTableStore, Page, StoreError, TableStore};
use tablepurge::telemetry;
use tokio_util::sync::CancellationToken;

pub const TABLE: &str = "transactionlog";
pub const SENTINEL: &str = "WATERMARK";

static TRACING: OnceLock<()> = OnceLock::new();

pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let settings = TelemetrySettings {
            name: "test".into(),
            level: "debug".into(),
        };

        if std::env::var("TEST_LOG").is_ok() {
            telemetry::init_subscriber(telemetry::get_subscriber(&settings, std::io::stdout));
        } else {
            telemetry::init_subscriber(telemetry::get_subscriber(&settings, std::io::sink));
        };
    });
}

/// Day `D + offset`, where `D` is the cutoff used throughout the suite.
pub fn day(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap() + TimeDelta::days(offset)
}

pub fn cutoff() -> Cutoff {
    Cutoff::at(day(0))
}

/// An in-memory store that records every batch, tracks concurrent calls and
/// injects faults on demand.
pub struct TestStore {
    pub inner: InMemoryTableStore,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_discovery: AtomicBool,
    failing_scans: Mutex<HashSet<String>>,
    failing_batches: Mutex<HashMap<String, usize>>,
    batch_attempts: Mutex<HashMap<String, usize>>,
    batches: Mutex<Vec<Vec<EntityKey>>>,
    panicking_batches: Mutex<HashSet<String>>,
    seed_on_first_purge: Mutex<Vec<Record>>,
    cancel_after_batch: Mutex<Option<CancellationToken>>,
}

impl TestStore {
    /// Pages of three records, so most scans span several pages.
    pub fn new() -> Arc<Self> {
        Self::with(3, Duration::ZERO)
    }

    /// Every store call sleeps for `delay` before reaching the inner store.
    pub fn with(page_size: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryTableStore::new(page_size),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail_discovery: AtomicBool::new(false),
            failing_scans: Mutex::new(HashSet::new()),
            failing_batches: Mutex::new(HashMap::new()),
            batch_attempts: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
            panicking_batches: Mutex::new(HashSet::new()),
            seed_on_first_purge: Mutex::new(Vec::new()),
            cancel_after_batch: Mutex::new(None),
        })
    }

    pub async fn seed(&self, partition_key: &str, row_key: &str, timestamp: DateTime<Utc>) {
        self.inner
            .upsert(TABLE, Record::new(partition_key, row_key, timestamp))
            .await
            .expect("Failed to seed record");
    }

    pub async fn contains(&self, partition_key: &str, row_key: &str) -> bool {
        self.inner
            .contains(TABLE, &EntityKey::new(partition_key, row_key))
            .await
    }

    pub async fn keys(&self) -> Vec<EntityKey> {
        self.inner.keys(TABLE).await
    }

    pub fn fail_discovery(&self) {
        self.fail_discovery.store(true, Ordering::SeqCst);
    }

    pub fn fail_scans_of(&self, partition_key: &str) {
        self.failing_scans
            .lock()
            .unwrap()
            .insert(partition_key.to_string());
    }

    /// Fails the `ordinal`-th (zero-based) batch attempted for the partition.
    pub fn fail_batch(&self, partition_key: &str, ordinal: usize) {
        self.failing_batches
            .lock()
            .unwrap()
            .insert(partition_key.to_string(), ordinal);
    }

    /// Panics on every batch attempted for the partition.
    pub fn panic_on_batches_of(&self, partition_key: &str) {
        self.panicking_batches
            .lock()
            .unwrap()
            .insert(partition_key.to_string());
    }

    /// Writes `records` when the first partition scan arrives, after
    /// discovery has finished.
    pub fn seed_during_first_purge(&self, records: Vec<Record>) {
        *self.seed_on_first_purge.lock().unwrap() = records;
    }

    /// Cancels `token` once the next successful batch has been applied.
    pub fn cancel_after_next_batch(&self, token: CancellationToken) {
        *self.cancel_after_batch.lock().unwrap() = Some(token);
    }

    pub fn batches(&self) -> Vec<Vec<EntityKey>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batches_for(&self, partition_key: &str) -> Vec<Vec<EntityKey>> {
        self.batches()
            .into_iter()
            .filter(|b| b[0].partition_key == partition_key)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn partition_of(filter: &Filter) -> Option<String> {
    filter
        .conditions()
        .iter()
        .find_map(|c| match (&c.field, &c.comparison, &c.value) {
            (Field::PartitionKey, Comparison::Equal, FilterValue::Text(pk)) => Some(pk.clone()),
            _ => None,
        })
}

#[async_trait]
impl TableStore for TestStore {
    async fn scan(
        &self,
        table: &str,
        filter: &Filter,
        projection: &Projection,
        continuation: Option<&ContinuationToken>,
    ) -> Result<Page, StoreError> {
        self.enter().await;
        let partition = partition_of(filter);
        if partition.is_some() {
            let pending = std::mem::take(&mut *self.seed_on_first_purge.lock().unwrap());
            for record in pending {
                self.inner
                    .upsert(TABLE, record)
                    .await
                    .expect("Failed to seed record mid-run");
            }
        }
        let should_fail = match partition {
            Some(pk) => self.failing_scans.lock().unwrap().contains(&pk),
            None => self.fail_discovery.load(Ordering::SeqCst),
        };
        let result = if should_fail {
            Err(StoreError::Unavailable("injected scan fault".into()))
        } else {
            self.inner.scan(table, filter, projection, continuation).await
        };
        self.exit();
        result
    }

    async fn batch_delete(&self, table: &str, keys: &[EntityKey]) -> Result<(), StoreError> {
        let should_panic = self
            .panicking_batches
            .lock()
            .unwrap()
            .contains(&keys[0].partition_key);
        if should_panic {
            panic!("injected panic in batch for `{}`", keys[0].partition_key);
        }
        self.enter().await;
        self.batches.lock().unwrap().push(keys.to_vec());

        let partition_key = keys[0].partition_key.clone();
        let ordinal = {
            let mut attempts = self.batch_attempts.lock().unwrap();
            let counter = attempts.entry(partition_key.clone()).or_insert(0);
            *counter += 1;
            *counter - 1
        };
        let should_fail = self.failing_batches.lock().unwrap().get(&partition_key) == Some(&ordinal);

        let result = if should_fail {
            Err(StoreError::Rejected {
                status: 409,
                message: "injected batch conflict".into(),
            })
        } else {
            self.inner.batch_delete(table, keys).await
        };
        if result.is_ok() {
            if let Some(token) = self.cancel_after_batch.lock().unwrap().take() {
                token.cancel();
            }
        }
        self.exit();
        result
    }
}

pub fn pipeline(store: &Arc<TestStore>, options: PipelineOptions) -> PurgePipeline {
    init_tracing();
    let store: Arc<dyn TableStore> = store.clone();
    PurgePipeline::new(store, TABLE, SENTINEL, options)
}

/// Batch size two, four workers.
pub fn small_batches() -> PipelineOptions {
    PipelineOptions {
        batch_size: 2,
        max_parallelism: 4,
        queue_capacity: 8,
        dry_run: false,
    }
}

pub async fn run(store: &Arc<TestStore>, options: PipelineOptions) -> PurgeSummary {
    pipeline(store, options)
        .run(cutoff(), CancellationToken::new())
        .await
        .expect("Purge run failed")
}
