//! Listing results and write receipts.

use serde::{Deserialize, Serialize};

use super::{OperationId, WriteMode};

/// Opaque server-issued cursor for the next page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One object in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub content_length: u64,
}

impl Entry {
    pub fn new(name: impl Into<String>, content_length: u64) -> Self {
        Self {
            name: name.into(),
            content_length,
        }
    }
}

/// One page of a listing as returned by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub entries: Vec<Entry>,
    /// Present when more pages follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<ContinuationToken>,
}

impl Page {
    pub fn last(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            continuation_token: None,
        }
    }

    pub fn more(entries: Vec<Entry>, token: ContinuationToken) -> Self {
        Self {
            entries,
            continuation_token: Some(token),
        }
    }
}

/// Emitted on a write pump's output for every write that succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub id: OperationId,
    pub mode: WriteMode,
    pub key: String,
}
