//! Operation descriptors queued into input streams.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::deferred::Deferred;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an operation.
///
/// Pagination cursors are keyed by this id, so an operation keeps its
/// identity across re-queues while its cursor advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// How a write touches its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Create or replace the whole object.
    Block,
    /// Create or replace an appendable object, then append the content if any.
    Append,
    Delete,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Block => "block",
            WriteMode::Append => "append",
            WriteMode::Delete => "delete",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block, append or delete against one key.
#[derive(Debug, Clone)]
pub struct WriteOperation {
    id: OperationId,
    mode: WriteMode,
    key: String,
    content: Option<String>,
    deferred: Deferred<()>,
}

impl WriteOperation {
    pub fn new(mode: WriteMode, key: impl Into<String>, content: Option<String>) -> Self {
        Self {
            id: OperationId::next(),
            mode,
            key: key.into(),
            content,
            deferred: Deferred::new(),
        }
    }

    pub fn block(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(WriteMode::Block, key, Some(content.into()))
    }

    pub fn append(key: impl Into<String>, content: Option<String>) -> Self {
        Self::new(WriteMode::Append, key, content)
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(WriteMode::Delete, key, None)
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn deferred(&self) -> &Deferred<()> {
        &self.deferred
    }
}

/// Fetch the content stored under one key.
///
/// The deferred resolves with the raw content, before any output transform.
#[derive(Debug, Clone)]
pub struct LoadOperation {
    id: OperationId,
    key: String,
    deferred: Deferred<String>,
}

impl LoadOperation {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: OperationId::next(),
            key: key.into(),
            deferred: Deferred::new(),
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn deferred(&self) -> &Deferred<String> {
        &self.deferred
    }
}

/// Enumerate every entry under an optional prefix, page by page.
#[derive(Debug, Clone)]
pub struct ListOperation {
    id: OperationId,
    prefix: Option<String>,
    deferred: Deferred<()>,
}

impl ListOperation {
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            id: OperationId::next(),
            prefix,
            deferred: Deferred::new(),
        }
    }

    pub fn all() -> Self {
        Self::new(None)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::new(Some(prefix.into()))
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn deferred(&self) -> &Deferred<()> {
        &self.deferred
    }
}

/// Any queued operation. Carried on error events so a handler can retry it.
#[derive(Debug, Clone)]
pub enum Operation {
    Write(WriteOperation),
    Load(LoadOperation),
    List(ListOperation),
}

impl Operation {
    pub fn id(&self) -> OperationId {
        match self {
            Operation::Write(op) => op.id(),
            Operation::Load(op) => op.id(),
            Operation::List(op) => op.id(),
        }
    }

    /// Metric/log label for the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Write(_) => "write",
            Operation::Load(_) => "load",
            Operation::List(_) => "list",
        }
    }

    /// The key or prefix the operation targets; empty for an unprefixed list.
    pub fn target(&self) -> &str {
        match self {
            Operation::Write(op) => op.key(),
            Operation::Load(op) => op.key(),
            Operation::List(op) => op.prefix().unwrap_or_default(),
        }
    }
}

impl From<WriteOperation> for Operation {
    fn from(op: WriteOperation) -> Self {
        Operation::Write(op)
    }
}

impl From<LoadOperation> for Operation {
    fn from(op: LoadOperation) -> Self {
        Operation::Load(op)
    }
}

impl From<ListOperation> for Operation {
    fn from(op: ListOperation) -> Self {
        Operation::List(op)
    }
}
