use crate::helpers::{self, SENTINEL, TestStore, day};
use std::time::Duration;
use tablepurge::domain::PartitionKey;
use tablepurge::error::PurgeError;
use tablepurge::pipeline::PipelineOptions;
use tokio_util::sync::CancellationToken;

async fn seed_partition(store: &TestStore, partition_key: &str) {
    store.seed(partition_key, SENTINEL, day(0)).await;
    for row_key in ["r1", "r2", "r3", "r4", "r5"] {
        store.seed(partition_key, row_key, day(-2)).await;
    }
}

#[tokio::test]
async fn failed_batch_stops_its_partition_but_not_the_others() {
    let store = TestStore::with(100, Duration::ZERO);
    seed_partition(&store, "P1").await;
    seed_partition(&store, "P2").await;
    store.fail_batch("P1", 1);

    let summary = helpers::run(&store, helpers::small_batches()).await;

    // first chunk of P1 persisted, the failed one and everything after it did not
    assert!(!store.contains("P1", "r1").await);
    assert!(!store.contains("P1", "r2").await);
    for row_key in ["r3", "r4", "r5"] {
        assert!(store.contains("P1", row_key).await);
    }
    assert_eq!(store.batches_for("P1").len(), 2);

    for row_key in ["r1", "r2", "r3", "r4", "r5"] {
        assert!(!store.contains("P2", row_key).await);
    }

    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.partition, PartitionKey::from("P1"));
    assert_eq!(failure.records_deleted, 2);
    assert_eq!(failure.batches_issued, 1);
    assert!(matches!(
        failure.cause,
        PurgeError::BatchDeleteFailed { chunk_index: 1, .. }
    ));
    assert_eq!(summary.total_records_deleted, 7);
    // one batch from P1 before the failure, three from P2
    assert_eq!(summary.batches_issued, 4);
}

#[tokio::test]
async fn partition_scan_failure_is_isolated() {
    let store = TestStore::new();
    seed_partition(&store, "P1").await;
    seed_partition(&store, "P2").await;
    store.fail_scans_of("P2");

    let summary = helpers::run(&store, helpers::small_batches()).await;

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].partition, PartitionKey::from("P2"));
    assert!(matches!(
        summary.failures[0].cause,
        PurgeError::ScanFailed { .. }
    ));
    assert_eq!(summary.total_records_deleted, 5);
    assert!(store.contains("P2", "r1").await);
}

#[tokio::test]
async fn discovery_failure_aborts_the_whole_run() {
    let store = TestStore::new();
    seed_partition(&store, "P1").await;
    store.fail_discovery();

    let outcome = helpers::pipeline(&store, helpers::small_batches())
        .run(helpers::cutoff(), CancellationToken::new())
        .await;

    assert!(matches!(outcome, Err(PurgeError::ScanFailed { .. })));
    assert!(store.batches().is_empty());
    assert_eq!(store.keys().await.len(), 6);
}

#[tokio::test]
async fn rerun_after_a_partial_failure_finishes_the_purge() {
    let store = TestStore::with(100, Duration::ZERO);
    seed_partition(&store, "P1").await;
    store.fail_batch("P1", 1);

    let first = helpers::run(&store, helpers::small_batches()).await;
    let second = helpers::run(&store, helpers::small_batches()).await;

    assert_eq!(first.failures.len(), 1);
    assert!(second.is_success());
    assert_eq!(second.total_records_deleted, 3);
    assert_eq!(store.keys().await.len(), 1);
}

#[tokio::test]
async fn panicking_partition_is_reported_and_earlier_work_still_counts() {
    let store = TestStore::with(100, Duration::ZERO);
    for i in 0..10 {
        let pk = format!("P{i}");
        store.seed(&pk, SENTINEL, day(0)).await;
        store.seed(&pk, "r1", day(-2)).await;
        store.seed(&pk, "r2", day(-2)).await;
    }
    store.panic_on_batches_of("P9");
    let options = PipelineOptions {
        max_parallelism: 1,
        ..helpers::small_batches()
    };

    let summary = helpers::run(&store, options).await;

    assert_eq!(summary.total_records_deleted, 18);
    assert_eq!(summary.batches_issued, 9);
    assert_eq!(summary.skipped_partitions, 0);
    assert!(!summary.cancelled);
    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].partition, PartitionKey::from("P9"));
    assert!(matches!(
        summary.failures[0].cause,
        PurgeError::TaskAborted { .. }
    ));
    assert!(store.contains("P9", "r1").await);
    // ten sentinels at the cutoff plus P9's two records
    assert_eq!(store.keys().await.len(), 12);
}

#[tokio::test]
async fn worker_keeps_going_after_a_partition_panics() {
    let store = TestStore::with(100, Duration::ZERO);
    for pk in ["P1", "P2", "P3"] {
        seed_partition(&store, pk).await;
    }
    store.panic_on_batches_of("P1");
    let options = PipelineOptions {
        max_parallelism: 1,
        ..helpers::small_batches()
    };

    let summary = helpers::run(&store, options).await;

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].partition, PartitionKey::from("P1"));
    assert_eq!(summary.total_records_deleted, 10);
    assert!(!store.contains("P3", "r5").await);
}
