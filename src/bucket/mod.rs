//! Stream-based convenience API over one object store.
//!
//! A [`Bucket`] pairs an input [`WriteableStream`] of operations with an
//! output [`ReadableStream`] of results and drives them with a pump running
//! on a spawned task:
//!
//! - **write**: block/append/delete operations in, [`WriteReceipt`]s out
//! - **load**: keys in, contents out
//! - **list**: listing requests in, [`Entry`]s out, page by page
//!
//! The `*_async` helpers wrap the streaming forms for callers that just want
//! a `Vec`. They stop producing once the output pauses, so results are
//! bounded by the output's `max_buffer` plus whatever was already in flight.

mod builder;

use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use regex::Regex;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace, warn};

use crate::deferred::Deferred;
use crate::pump::{PageWalker, Pump, PumpOptions, Work, pass_gate, settle};
use crate::store::ObjectStore;
use crate::stream::{
    Endpoint, Gate, ReadableStream, StreamOptions, StreamState, WriteableStream,
};
use crate::telemetry;
use crate::types::{
    ContinuationToken, Entry, ListOperation, LoadOperation, Operation, OperationId, WriteMode,
    WriteOperation, WriteReceipt,
};
use crate::{Result, SpillwayError};

pub use builder::BucketBuilder;

/// Input and output of a write pump.
pub struct WriteStreams<T, U> {
    pub input: WriteableStream<T, WriteOperation>,
    pub output: ReadableStream<WriteReceipt, U>,
}

/// Input and output of a load pump.
pub struct LoadStreams<T, U> {
    pub input: WriteableStream<T, LoadOperation>,
    pub output: ReadableStream<String, U>,
}

/// Input and output of a listing pump.
pub struct ListStreams<T, U> {
    pub input: WriteableStream<T, ListOperation>,
    pub output: ReadableStream<Entry, U>,
    walker: Arc<PageWalker>,
}

impl<T, U> ListStreams<T, U> {
    /// Pagination state of this listing pump.
    pub fn walker(&self) -> &PageWalker {
        &self.walker
    }
}

/// Streaming access to one object store.
///
/// Every `*_streams` method spawns its pump with `tokio::spawn` and so must
/// be called within a tokio runtime.
#[derive(Clone)]
pub struct Bucket {
    store: Arc<dyn ObjectStore>,
    pump: PumpOptions,
    max_buffer: usize,
}

impl Bucket {
    /// Create a new builder for configuring the bucket.
    pub fn builder() -> BucketBuilder {
        BucketBuilder::new()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn pump_options(&self) -> &PumpOptions {
        &self.pump
    }

    /// Identity output options using this bucket's `max_buffer`.
    pub fn output_options<T: 'static>(&self) -> StreamOptions<T, T> {
        StreamOptions::new().max_buffer(self.max_buffer)
    }

    // ========================================================================
    // Write
    // ========================================================================

    /// Start a write pump. Push operations into `input`, then end it.
    ///
    /// Operations run oldest first. Each success pushes a receipt to
    /// `output`; each failure rejects the operation and is reported on
    /// `output`'s error channel.
    ///
    /// Receipts count against `out_options`' `max_buffer`. A caller that
    /// only watches deferreds must still drain `output` (or pass an
    /// unbounded `max_buffer`, as [`write`](Self::write) does), otherwise
    /// the pump pauses for good once the buffer fills.
    pub fn write_streams<T, U>(
        &self,
        in_options: StreamOptions<T, WriteOperation>,
        out_options: StreamOptions<WriteReceipt, U>,
    ) -> WriteStreams<T, U>
    where
        T: 'static,
        U: Clone + Send + 'static,
    {
        let input = WriteableStream::new(in_options);
        let output = ReadableStream::new(out_options);

        let store = Arc::clone(&self.store);
        let options = self.pump.clone();
        let (source, sink) = (input.clone(), output.clone());
        tokio::spawn(async move {
            let work = {
                let (source, sink) = (source.clone(), sink.clone());
                move || -> Option<Work> {
                    let op = source.pop_front()?;
                    Some(write_one(Arc::clone(&store), op, sink.clone()).boxed())
                }
            };
            if let Err(e) = sink.process_from(&source, work, &options).await {
                warn!(error = %e, "write pump did not start");
            }
        });

        WriteStreams { input, output }
    }

    /// Queue `operations` on a new write pump and end its input.
    pub fn write<I>(&self, operations: I) -> WriteStreams<WriteOperation, WriteReceipt>
    where
        I: IntoIterator<Item = WriteOperation>,
    {
        let streams =
            self.write_streams(StreamOptions::new(), StreamOptions::new().max_buffer(usize::MAX));
        for op in operations {
            // identity transform cannot fail
            let _ = streams.input.push(op);
        }
        streams.input.end();
        streams
    }

    /// Run `operations` to completion.
    ///
    /// Returns every receipt, or the first failure in submission order.
    pub async fn write_async<I>(&self, operations: I) -> Result<Vec<WriteReceipt>>
    where
        I: IntoIterator<Item = WriteOperation>,
    {
        let operations: Vec<WriteOperation> = operations.into_iter().collect();
        let deferreds: Vec<_> = operations
            .iter()
            .map(|op| (op.id(), op.deferred().clone()))
            .collect();

        let streams = self.write(operations);
        streams.output.wait_for_end().await;
        first_failure(&deferreds)?;
        Ok(streams.output.drain())
    }

    /// Create or replace `key` with `content`.
    pub async fn create(&self, key: &str, content: &str) -> Result<()> {
        self.store
            .put_or_delete(WriteMode::Block, key, Some(content))
            .await
    }

    /// Recreate `key` as an appendable object, then append `content`.
    pub async fn append(&self, key: &str, content: Option<&str>) -> Result<()> {
        self.store.put_or_delete(WriteMode::Append, key, content).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.put_or_delete(WriteMode::Delete, key, None).await
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Start a load pump. Push operations into `input`, then end it.
    ///
    /// Each loaded content is pushed through `output`'s transform; the
    /// operation's deferred resolves with the raw content.
    pub fn load_streams<T, U>(
        &self,
        in_options: StreamOptions<T, LoadOperation>,
        out_options: StreamOptions<String, U>,
    ) -> LoadStreams<T, U>
    where
        T: 'static,
        U: Clone + Send + 'static,
    {
        let input = WriteableStream::new(in_options);
        let output = ReadableStream::new(out_options);

        let store = Arc::clone(&self.store);
        let options = self.pump.clone();
        let (source, sink) = (input.clone(), output.clone());
        tokio::spawn(async move {
            let work = {
                let (source, sink) = (source.clone(), sink.clone());
                move || -> Option<Work> {
                    let op = source.pop_front()?;
                    Some(load_one(Arc::clone(&store), op, sink.clone()).boxed())
                }
            };
            if let Err(e) = sink.process_from(&source, work, &options).await {
                warn!(error = %e, "load pump did not start");
            }
        });

        LoadStreams { input, output }
    }

    /// Load every key in `keys`.
    pub fn load<I, K, U>(&self, keys: I, out_options: StreamOptions<String, U>) -> ReadableStream<String, U>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        U: Clone + Send + 'static,
    {
        self.load_operations(keys.into_iter().map(LoadOperation::new), out_options)
            .1
    }

    fn load_operations<I, U>(
        &self,
        operations: I,
        out_options: StreamOptions<String, U>,
    ) -> (Vec<(OperationId, Deferred<String>)>, ReadableStream<String, U>)
    where
        I: IntoIterator<Item = LoadOperation>,
        U: Clone + Send + 'static,
    {
        let streams = self.load_streams(StreamOptions::new(), out_options);
        let mut deferreds = Vec::new();
        for op in operations {
            deferreds.push((op.id(), op.deferred().clone()));
            let _ = streams.input.push(op);
        }
        streams.input.end();
        (deferreds, streams.output)
    }

    /// Load every key in `keys` and collect the (transformed) contents, in
    /// completion order, up to the output's `max_buffer`.
    pub async fn load_async<I, K, U>(
        &self,
        keys: I,
        out_options: StreamOptions<String, U>,
    ) -> Result<Vec<U>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        U: Clone + Send + 'static,
    {
        let (deferreds, output) =
            self.load_operations(keys.into_iter().map(LoadOperation::new), out_options);
        let items = collect(&output).await;
        first_failure(&deferreds)?;
        Ok(items)
    }

    /// Read one key directly.
    pub async fn get(&self, key: &str) -> Result<String> {
        self.store.get_content(key).await
    }

    // ========================================================================
    // List
    // ========================================================================

    /// Start a listing pump. Push listing requests into `input`, then end it.
    ///
    /// Pages are fetched as the output drains; a paused output stops new
    /// fetches until resumed, and a canceled one stops them for good (any
    /// listing left unfinished is rejected with [`SpillwayError::Canceled`]).
    pub fn list_streams<T, U>(
        &self,
        in_options: StreamOptions<T, ListOperation>,
        out_options: StreamOptions<Entry, U>,
    ) -> ListStreams<T, U>
    where
        T: 'static,
        U: Clone + Send + 'static,
    {
        let input = WriteableStream::new(in_options);
        let output = ReadableStream::new(out_options);
        let walker = Arc::new(PageWalker::new());

        let store = Arc::clone(&self.store);
        let options = self.pump.clone();
        let (source, sink, pages) = (input.clone(), output.clone(), Arc::clone(&walker));
        tokio::spawn(async move {
            let poll_interval = options.poll_interval;
            let work = {
                let (source, sink, pages) = (source.clone(), sink.clone(), Arc::clone(&pages));
                move || -> Option<Work> {
                    while let Some(op) = source.pop_front() {
                        if !pages.seed(op.clone()) {
                            warn!(operation = %op.id(), "listing queued twice, duplicate dropped");
                            let error = SpillwayError::InvalidInput(format!(
                                "listing {} is already queued",
                                op.id()
                            ));
                            sink.emit_error(Arc::new(error), Some(Operation::List(op)));
                        }
                    }
                    if let Some((op, token)) = pages.next() {
                        return Some(
                            fetch_page(
                                Arc::clone(&store),
                                Arc::clone(&pages),
                                op,
                                token,
                                sink.clone(),
                            )
                            .boxed(),
                        );
                    }
                    // a fetch in flight may still re-queue its listing
                    if pages.outstanding() > 0 {
                        return Some(tokio::time::sleep(poll_interval).boxed());
                    }
                    None
                }
            };
            let retiring = ListSink {
                output: &sink,
                pages: &pages,
            };
            if let Err(e) = run_listing(&source, &retiring, work, &options).await {
                warn!(error = %e, "list pump did not start");
                retiring.finish();
            }
        });

        ListStreams {
            input,
            output,
            walker,
        }
    }

    /// List every entry, optionally under `prefix`.
    pub fn list<U>(&self, prefix: Option<&str>, out_options: StreamOptions<Entry, U>) -> ReadableStream<Entry, U>
    where
        U: Clone + Send + 'static,
    {
        self.list_operation(prefix, out_options).1
    }

    fn list_operation<U>(
        &self,
        prefix: Option<&str>,
        out_options: StreamOptions<Entry, U>,
    ) -> (ListOperation, ReadableStream<Entry, U>)
    where
        U: Clone + Send + 'static,
    {
        let streams = self.list_streams(StreamOptions::new(), out_options);
        let op = ListOperation::new(prefix.map(str::to_string));
        let _ = streams.input.push(op.clone());
        streams.input.end();
        (op, streams.output)
    }

    /// List and collect entries, up to the output's `max_buffer`.
    pub async fn list_async<U>(
        &self,
        prefix: Option<&str>,
        out_options: StreamOptions<Entry, U>,
    ) -> Result<Vec<U>>
    where
        U: Clone + Send + 'static,
    {
        let (op, output) = self.list_operation(prefix, out_options);
        let items = collect(&output).await;
        first_failure(&[(op.id(), op.deferred().clone())])?;
        Ok(items)
    }

    /// List entries whose names match `pattern`, optionally under `prefix`.
    pub async fn list_filtered(&self, prefix: Option<&str>, pattern: &Regex) -> Result<Vec<Entry>> {
        let pattern = pattern.clone();
        let options = StreamOptions::with_transform(move |entry: Entry| {
            pattern.is_match(&entry.name).then_some(entry)
        })
        .max_buffer(self.max_buffer);
        self.list_async(prefix, options).await
    }
}

/// Output of a listing pump that rejects unfinished listings before it
/// ends, so every deferred has settled by the time `End` is observed.
struct ListSink<'a, U> {
    output: &'a ReadableStream<Entry, U>,
    pages: &'a PageWalker,
}

impl<U> Endpoint for ListSink<'_, U>
where
    U: Clone + Send + 'static,
{
    fn state(&self) -> StreamState {
        self.output.state()
    }

    fn gate(&self) -> Option<Gate> {
        Endpoint::gate(self.output)
    }

    fn finish(&self) {
        let abandoned = self.pages.abandon();
        if abandoned > 0 {
            debug!(abandoned, "unfinished listings rejected after output stopped");
        }
        self.output.finish();
    }

    fn emit_error(&self, error: Arc<SpillwayError>, operation: Option<Operation>) {
        self.output.emit_error(error, operation);
    }
}

async fn run_listing<F>(
    source: &dyn Endpoint,
    sink: &dyn Endpoint,
    work: F,
    options: &PumpOptions,
) -> Result<()>
where
    F: FnMut() -> Option<Work> + Send,
{
    options.validate()?;
    pass_gate(source).await;
    pass_gate(sink).await;
    Pump::pass_through(source, sink, options).run(work).await
}

async fn write_one<U>(
    store: Arc<dyn ObjectStore>,
    op: WriteOperation,
    sink: ReadableStream<WriteReceipt, U>,
) where
    U: Clone + Send + 'static,
{
    let started = Instant::now();
    let outcome = match (op.mode(), op.content()) {
        (WriteMode::Block, None) => Err(SpillwayError::InvalidInput(format!(
            "block write to {} has no content",
            op.key()
        ))),
        (mode, content) => store.put_or_delete(mode, op.key(), content).await,
    };
    let outcome = outcome.and_then(|()| {
        sink.push(WriteReceipt {
            id: op.id(),
            mode: op.mode(),
            key: op.key().to_string(),
        })
        .map(|_| ())
    });
    settle(
        started,
        outcome,
        op.deferred(),
        || Operation::Write(op.clone()),
        &sink,
    );
}

async fn load_one<U>(store: Arc<dyn ObjectStore>, op: LoadOperation, sink: ReadableStream<String, U>)
where
    U: Clone + Send + 'static,
{
    let started = Instant::now();
    let outcome = match store.get_content(op.key()).await {
        Ok(content) => sink.push(content.clone()).map(|_| content),
        Err(e) => Err(e),
    };
    settle(
        started,
        outcome,
        op.deferred(),
        || Operation::Load(op.clone()),
        &sink,
    );
}

/// Fetch one page of a listing and either re-queue it or retire it.
///
/// A failed page is terminal for its listing; it is never retried.
async fn fetch_page<U>(
    store: Arc<dyn ObjectStore>,
    pages: Arc<PageWalker>,
    op: ListOperation,
    token: Option<ContinuationToken>,
    sink: ReadableStream<Entry, U>,
) where
    U: Clone + Send + 'static,
{
    let started = Instant::now();
    let outcome = async {
        let page = store.fetch_page(op.prefix(), token.as_ref()).await?;
        metrics::counter!(telemetry::PAGES_FETCHED_TOTAL).increment(1);
        metrics::counter!(telemetry::ENTRIES_EMITTED_TOTAL).increment(page.entries.len() as u64);
        for entry in page.entries {
            sink.push(entry)?;
        }
        Ok::<_, SpillwayError>(page.continuation_token)
    }
    .await;

    match outcome {
        Ok(Some(next)) => {
            trace!(operation = %op.id(), "listing continues");
            pages.advance(op.id(), next);
        }
        Ok(None) => {
            settle(started, Ok(()), op.deferred(), || Operation::List(op.clone()), &sink);
            pages.complete(op.id());
        }
        Err(error) => {
            settle(started, Err(error), op.deferred(), || Operation::List(op.clone()), &sink);
            pages.complete(op.id());
        }
    }
}

/// Wait for `output` to end, canceling it as soon as it pauses, then take
/// its buffer.
async fn collect<T, U>(output: &ReadableStream<T, U>) -> Vec<U>
where
    T: 'static,
    U: Clone + Send + 'static,
{
    let mut events = output.events();
    loop {
        match output.state() {
            StreamState::Ended => break,
            StreamState::Paused => output.cancel(),
            _ => {}
        }
        match events.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
    output.drain()
}

/// First rejection in submission order, ignoring operations that never ran
/// or were dropped by a cancel.
fn first_failure<V>(deferreds: &[(OperationId, Deferred<V>)]) -> Result<()>
where
    V: Clone + Send + 'static,
{
    for (id, deferred) in deferreds {
        if let Some(Err(source)) = deferred.outcome() {
            if matches!(*source, SpillwayError::Canceled) {
                continue;
            }
            return Err(SpillwayError::OperationFailed { id: *id, source });
        }
    }
    Ok(())
}
