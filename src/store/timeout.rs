//! Per-call deadline decorator for stores.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::ObjectStore;
use crate::types::{ContinuationToken, Page, WriteMode};
use crate::{Result, SpillwayError};

/// Decorator that fails any store call running longer than `timeout` with
/// [`SpillwayError::Timeout`].
///
/// Without it a stalled call holds its pump slot indefinitely.
pub struct TimeoutStore {
    inner: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

async fn with_timeout<T, F>(timeout: Duration, store: &str, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                store,
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "store call timed out"
            );
            Err(SpillwayError::Timeout(timeout))
        }
    }
}

#[async_trait]
impl ObjectStore for TimeoutStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_page(
        &self,
        prefix: Option<&str>,
        token: Option<&ContinuationToken>,
    ) -> Result<Page> {
        with_timeout(
            self.timeout,
            self.inner.name(),
            "fetch_page",
            self.inner.fetch_page(prefix, token),
        )
        .await
    }

    async fn put_or_delete(&self, mode: WriteMode, key: &str, content: Option<&str>) -> Result<()> {
        with_timeout(
            self.timeout,
            self.inner.name(),
            "put_or_delete",
            self.inner.put_or_delete(mode, key, content),
        )
        .await
    }

    async fn get_content(&self, key: &str) -> Result<String> {
        with_timeout(
            self.timeout,
            self.inner.name(),
            "get_content",
            self.inner.get_content(key),
        )
        .await
    }
}
