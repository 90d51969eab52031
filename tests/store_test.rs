//! Tests for the bundled stores and the timeout decorator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use spillway::{
    Bucket, ContinuationToken, Entry, FsStore, ObjectStore, Page, Result, SpillwayError,
    TimeoutStore, WriteMode, WriteOperation,
};

// ============================================================================
// FsStore
// ============================================================================

#[tokio::test]
async fn fs_store_writes_reads_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path()).unwrap();

    store
        .put_or_delete(WriteMode::Block, "nested/dir/a.txt", Some("alpha"))
        .await
        .unwrap();
    assert_eq!(store.get_content("nested/dir/a.txt").await.unwrap(), "alpha");
    assert!(dir.path().join("nested/dir/a.txt").is_file());

    // append recreates
    store
        .put_or_delete(WriteMode::Append, "nested/dir/a.txt", Some("beta"))
        .await
        .unwrap();
    assert_eq!(store.get_content("nested/dir/a.txt").await.unwrap(), "beta");

    store
        .put_or_delete(WriteMode::Delete, "nested/dir/a.txt", None)
        .await
        .unwrap();
    assert!(matches!(
        store.get_content("nested/dir/a.txt").await,
        Err(SpillwayError::NotFound(_))
    ));
    assert!(matches!(
        store
            .put_or_delete(WriteMode::Delete, "nested/dir/a.txt", None)
            .await,
        Err(SpillwayError::NotFound(_))
    ));
}

#[tokio::test]
async fn fs_store_pages_sorted_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path()).unwrap().with_page_size(2);
    for key in ["b/2", "a/1", "b/1", "c"] {
        store
            .put_or_delete(WriteMode::Block, key, Some(key))
            .await
            .unwrap();
    }

    let first = store.fetch_page(None, None).await.unwrap();
    let names: Vec<_> = first.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a/1", "b/1"]);
    assert_eq!(first.entries[0].content_length, 3);

    let token = first.continuation_token.unwrap();
    let second = store.fetch_page(None, Some(&token)).await.unwrap();
    let names: Vec<_> = second.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["b/2", "c"]);
    assert!(second.continuation_token.is_none());

    let under_b = store.fetch_page(Some("b/"), None).await.unwrap();
    assert_eq!(under_b.entries.len(), 2);
}

#[tokio::test]
async fn fs_store_behind_a_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path()).unwrap().with_page_size(1));
    let bucket = Bucket::builder().store(store).build().unwrap();

    bucket
        .write_async([
            WriteOperation::block("x/1", "one"),
            WriteOperation::block("x/2", "two"),
            WriteOperation::block("y/1", "three"),
        ])
        .await
        .unwrap();

    let entries = bucket
        .list_async(Some("x/"), bucket.output_options::<Entry>())
        .await
        .unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["x/1", "x/2"]);

    assert!(matches!(
        bucket.create("../escape", "no").await,
        Err(SpillwayError::InvalidInput(_))
    ));
}

// ============================================================================
// TimeoutStore
// ============================================================================

/// Store whose every call takes `delay`.
struct SlowStore {
    delay: Duration,
    calls: AtomicU32,
}

#[async_trait]
impl ObjectStore for SlowStore {
    fn name(&self) -> &str {
        "slow"
    }

    async fn fetch_page(
        &self,
        _prefix: Option<&str>,
        _token: Option<&ContinuationToken>,
    ) -> Result<Page> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Page::last(vec![Entry::new("k", 1)]))
    }

    async fn put_or_delete(&self, _mode: WriteMode, _key: &str, _content: Option<&str>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn get_content(&self, key: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(key.to_string())
    }
}

fn slow(delay: Duration) -> Arc<SlowStore> {
    Arc::new(SlowStore {
        delay,
        calls: AtomicU32::new(0),
    })
}

#[tokio::test(start_paused = true)]
async fn timeout_store_passes_fast_calls_through() {
    let store = TimeoutStore::new(slow(Duration::from_millis(10)), Duration::from_secs(1));
    assert_eq!(store.name(), "slow");
    assert_eq!(store.get_content("k").await.unwrap(), "k");
    assert_eq!(store.fetch_page(None, None).await.unwrap().entries.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_store_fails_slow_calls() {
    let inner = slow(Duration::from_secs(30));
    let store = TimeoutStore::new(inner.clone(), Duration::from_secs(2));

    let err = store.get_content("k").await.unwrap_err();
    assert!(matches!(err, SpillwayError::Timeout(d) if d == Duration::from_secs(2)));
    assert!(err.is_transient());
    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn bucket_call_timeout_rejects_stalled_writes() {
    let bucket = Bucket::builder()
        .store(slow(Duration::from_secs(60)))
        .call_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let op = WriteOperation::block("k", "v");
    let err = bucket.write_async([op.clone()]).await.unwrap_err();
    assert!(err.is_transient());
    let cause = op.deferred().outcome().unwrap().unwrap_err();
    assert!(matches!(*cause, SpillwayError::Timeout(_)));
}

#[test]
fn builder_rejects_missing_store_and_bad_options() {
    assert!(matches!(
        Bucket::builder().build(),
        Err(SpillwayError::NoStore)
    ));
    assert!(matches!(
        Bucket::builder()
            .store(slow(Duration::ZERO))
            .concurrency(0)
            .build(),
        Err(SpillwayError::Configuration(_))
    ));
    assert!(matches!(
        Bucket::builder()
            .store(slow(Duration::ZERO))
            .max_buffer(0)
            .build(),
        Err(SpillwayError::Configuration(_))
    ));
}
