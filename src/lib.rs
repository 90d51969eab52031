//! Spillway - backpressure-aware streaming over object stores
//!
//! This crate moves work between buffered streams with a bounded
//! concurrent pump. Producers push into a [`WriteableStream`], a pump runs
//! store calls with at most `concurrency` in flight, and results land in a
//! [`ReadableStream`] that pauses its producer when its buffer fills up.
//! Every queued operation carries a [`Deferred`] that settles exactly once.
//!
//! # Listing Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spillway::{Bucket, FsStore, StreamOptions};
//!
//! #[tokio::main]
//! async fn main() -> spillway::Result<()> {
//!     let bucket = Bucket::builder()
//!         .store(Arc::new(FsStore::new("/srv/objects")?))
//!         .concurrency(4)
//!         .build()?;
//!
//!     let names = bucket
//!         .list_async(Some("logs/"), StreamOptions::with_transform(|e: spillway::Entry| Some(e.name)))
//!         .await?;
//!
//!     for name in names {
//!         println!("{name}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Writes
//!
//! Receipts are subject to the output's `max_buffer` like any other items,
//! so drain them (here with `into_stream`) or the pump pauses once they
//! pile up.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures_util::StreamExt;
//! use spillway::{Bucket, MemoryStore, StreamOptions, WriteOperation};
//!
//! #[tokio::main]
//! async fn main() -> spillway::Result<()> {
//!     let bucket = Bucket::builder().store(Arc::new(MemoryStore::new())).build()?;
//!
//!     let streams = bucket.write_streams(StreamOptions::new(), StreamOptions::new());
//!     let receipts = streams.output.into_stream();
//!     for i in 0..100 {
//!         let op = WriteOperation::block(format!("items/{i}"), i.to_string());
//!         op.deferred().catch(|e| eprintln!("write failed: {e}"));
//!         streams.input.push(op)?;
//!     }
//!     streams.input.end();
//!     let written = receipts.count().await;
//!     println!("{written} objects written");
//!     Ok(())
//! }
//! ```

pub mod bucket;
pub mod config;
pub mod deferred;
pub mod error;
pub mod pump;
pub mod store;
pub mod stream;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use bucket::{Bucket, BucketBuilder, ListStreams, LoadStreams, WriteStreams};
pub use config::EngineConfig;
pub use deferred::{Deferred, Settlement};
pub use error::{Result, SpillwayError};
pub use pump::{PageWalker, Pump, PumpOptions, Work};
pub use store::{FsStore, MemoryStore, ObjectStore, TimeoutStore};
pub use stream::{
    Endpoint, PipeTarget, ReadableStream, StreamEvent, StreamOptions, StreamState, WriteableStream,
};
pub use version::PKG_VERSION;

// Re-export all types
pub use types::{
    ContinuationToken, Entry, ListOperation, LoadOperation, Operation, OperationId, Page,
    WriteMode, WriteOperation, WriteReceipt,
};
