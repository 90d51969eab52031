//! Tests for load pumps and direct store calls.

use std::sync::Arc;

use spillway::{
    Bucket, LoadOperation, MemoryStore, SpillwayError, StreamEvent, StreamOptions, StreamState,
};

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert("a.json", r#"{"n":1}"#);
    store.insert("b.json", r#"{"n":2}"#);
    store.insert("c.txt", "plain");
    store
}

fn bucket(store: Arc<MemoryStore>) -> Bucket {
    Bucket::builder().store(store).build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn loads_resolve_with_raw_content() {
    let bucket = bucket(seeded_store());

    let streams = bucket.load_streams(
        StreamOptions::new(),
        StreamOptions::with_transform(|content: String| Some(content.len())),
    );
    let a = LoadOperation::new("a.json");
    let c = LoadOperation::new("c.txt");
    streams.input.push(a.clone()).unwrap();
    streams.input.push(c.clone()).unwrap();
    streams.input.end();
    streams.output.wait_for_end().await;

    assert_eq!(a.deferred().wait().await.unwrap(), r#"{"n":1}"#);
    assert_eq!(c.deferred().wait().await.unwrap(), "plain");

    let mut lengths = streams.output.drain();
    lengths.sort();
    assert_eq!(lengths, vec![5, 7]);
}

#[tokio::test(start_paused = true)]
async fn missing_key_rejects_and_reports() {
    let bucket = bucket(seeded_store());

    let streams = bucket.load_streams(StreamOptions::new(), StreamOptions::new());
    let mut events = streams.output.events();
    let missing = LoadOperation::new("nope");
    let present = LoadOperation::new("a.json");
    streams.input.push(missing.clone()).unwrap();
    streams.input.push(present.clone()).unwrap();
    streams.input.end();
    streams.output.wait_for_end().await;

    let err = missing.deferred().outcome().unwrap().unwrap_err();
    assert!(matches!(&*err, SpillwayError::NotFound(key) if key == "nope"));
    assert!(present.deferred().outcome().unwrap().is_ok());
    assert_eq!(streams.output.len(), 1);

    let errors = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, StreamEvent::Error { .. }))
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test(start_paused = true)]
async fn load_async_parses_through_output_transform() {
    let bucket = bucket(seeded_store());

    let mut values = bucket
        .load_async(
            ["a.json", "b.json"],
            StreamOptions::with_try_transform(|content: String| {
                let value: serde_json::Value = serde_json::from_str(&content)?;
                Ok(value["n"].as_u64())
            }),
        )
        .await
        .unwrap();
    values.sort();
    assert_eq!(values, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn output_transform_error_rejects_the_load() {
    let bucket = bucket(seeded_store());

    let err = bucket
        .load_async(
            ["c.txt"],
            StreamOptions::with_try_transform(|content: String| {
                let value: serde_json::Value = serde_json::from_str(&content)?;
                Ok(Some(value))
            }),
        )
        .await
        .unwrap_err();

    match err {
        SpillwayError::OperationFailed { source, .. } => {
            assert!(matches!(*source, SpillwayError::Json(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn load_returns_an_ending_stream() {
    let bucket = bucket(seeded_store());

    let output = bucket.load(["a.json", "b.json", "c.txt"], bucket.output_options::<String>());
    output.wait_for_end().await;
    assert_eq!(output.state(), StreamState::Ended);
    assert_eq!(output.len(), 3);
}

#[tokio::test]
async fn direct_calls_round_through_the_store() {
    let store = seeded_store();
    let bucket = bucket(store.clone());

    bucket.create("new.txt", "hello").await.unwrap();
    assert_eq!(bucket.get("new.txt").await.unwrap(), "hello");

    bucket.append("log.txt", Some("line")).await.unwrap();
    assert_eq!(store.get("log.txt").as_deref(), Some("line"));

    bucket.delete("c.txt").await.unwrap();
    assert!(matches!(
        bucket.get("c.txt").await,
        Err(SpillwayError::NotFound(_))
    ));
    assert!(matches!(
        bucket.delete("c.txt").await,
        Err(SpillwayError::NotFound(_))
    ));
}
