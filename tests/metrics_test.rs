//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::future::Future;
use std::sync::Arc;

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use spillway::telemetry;
use spillway::{
    Bucket, Entry, ListOperation, MemoryStore, StreamOptions, WriteOperation,
};

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a metric name and, optionally, one label.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            label.is_none_or(|(k, v)| {
                key.key()
                    .labels()
                    .any(|l| l.key() == k && l.value() == v)
            })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Run `f` on a fresh single-threaded runtime with a local recorder.
///
/// Pumps run on spawned tasks; a current-thread runtime keeps them on the
/// thread the local recorder is installed on.
fn recorded<F>(f: impl FnOnce() -> F) -> SnapshotVec
where
    F: Future<Output = ()>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
            .block_on(f())
    });

    snapshotter.snapshot().into_vec()
}

fn memory_bucket(store: Arc<MemoryStore>) -> Bucket {
    Bucket::builder().store(store).build().unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn successful_writes_record_metrics() {
    let snapshot = recorded(|| async {
        let bucket = memory_bucket(Arc::new(MemoryStore::new()));
        bucket
            .write_async([
                WriteOperation::block("a", "1"),
                WriteOperation::block("b", "2"),
            ])
            .await
            .unwrap();
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::OPERATIONS_TOTAL, Some(("status", "ok"))),
        2
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::OPERATIONS_TOTAL, Some(("kind", "write"))),
        2
    );
    assert!(
        has_histogram(&snapshot, telemetry::OPERATION_DURATION_SECONDS),
        "expected a duration histogram entry"
    );
}

#[test]
fn failed_load_records_error_status() {
    let snapshot = recorded(|| async {
        let bucket = memory_bucket(Arc::new(MemoryStore::new()));
        let result = bucket
            .load_async(["missing"], bucket.output_options::<String>())
            .await;
        assert!(result.is_err());
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::OPERATIONS_TOTAL, Some(("status", "error"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::OPERATIONS_TOTAL, Some(("kind", "load"))),
        1
    );
}

#[test]
fn listing_records_pages_and_entries() {
    let snapshot = recorded(|| async {
        let store = Arc::new(MemoryStore::new().with_page_size(2));
        for key in ["a", "b", "c", "d", "e"] {
            store.insert(key, "v");
        }
        let bucket = memory_bucket(store);
        let entries = bucket
            .list_async(None, bucket.output_options::<Entry>())
            .await
            .unwrap();
        assert_eq!(entries.len(), 5);
    });

    assert_eq!(counter_total(&snapshot, telemetry::PAGES_FETCHED_TOTAL, None), 3);
    assert_eq!(counter_total(&snapshot, telemetry::ENTRIES_EMITTED_TOTAL, None), 5);
    // one listing, settled once
    assert_eq!(
        counter_total(&snapshot, telemetry::OPERATIONS_TOTAL, Some(("kind", "list"))),
        1
    );
}

#[test]
fn paused_output_records_poll_delays() {
    let snapshot = recorded(|| async {
        let store = Arc::new(MemoryStore::new().with_page_size(2));
        for key in ["a", "b", "c"] {
            store.insert(key, "v");
        }
        let bucket = Bucket::builder()
            .store(store)
            .concurrency(1)
            .build()
            .unwrap();

        let streams = bucket.list_streams(StreamOptions::new(), StreamOptions::new().max_buffer(2));
        streams.input.push(ListOperation::all()).unwrap();
        streams.input.end();

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        streams.output.drain();
        streams.output.resume();
        streams.output.wait_for_end().await;
    });

    assert!(counter_total(&snapshot, telemetry::PUMP_POLLS_TOTAL, Some(("reason", "paused"))) >= 2);
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let bucket = memory_bucket(Arc::new(MemoryStore::new()));
    bucket
        .write_async([WriteOperation::block("k", "v")])
        .await
        .unwrap();
}
