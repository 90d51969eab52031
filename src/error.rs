//! Spillway error types

use std::sync::Arc;
use std::time::Duration;

use crate::types::OperationId;

/// Spillway error types
#[derive(Debug, thiserror::Error)]
pub enum SpillwayError {
    // Store errors
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    // Stream errors
    #[error("transform failed: {0}")]
    Transform(String),

    #[error("stream canceled")]
    Canceled,

    /// A queued operation settled with an error; the shared cause is kept.
    #[error("operation {id} failed: {source}")]
    OperationFailed {
        id: OperationId,
        #[source]
        source: Arc<SpillwayError>,
    },

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("no store configured")]
    NoStore,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SpillwayError {
    /// Whether a store failure is worth retrying by the caller.
    ///
    /// The engine itself never retries; this only classifies errors surfaced
    /// through deferreds and error events.
    pub fn is_transient(&self) -> bool {
        match self {
            SpillwayError::Timeout(_) => true,
            SpillwayError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            SpillwayError::OperationFailed { source, .. } => source.is_transient(),
            SpillwayError::Store(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout") || msg.contains("connection") || msg.contains("503")
            }
            _ => false,
        }
    }
}

/// Result type alias for Spillway operations
pub type Result<T> = std::result::Result<T, SpillwayError>;
