//! In-memory store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{DEFAULT_PAGE_SIZE, ObjectStore, paginate};
use crate::types::{ContinuationToken, Entry, Page, WriteMode};
use crate::{Result, SpillwayError};

/// Sorted in-memory key/value store with configurable page size.
///
/// Useful as a stand-in for a remote store in tests and demos.
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, String>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Entries per listing page (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, key: impl Into<String>, content: impl Into<String>) {
        self.lock().insert(key.into(), content.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_page(
        &self,
        prefix: Option<&str>,
        token: Option<&ContinuationToken>,
    ) -> Result<Page> {
        let objects = self.lock();
        let entries = objects
            .iter()
            .map(|(name, content)| Entry::new(name.clone(), content.len() as u64));
        Ok(paginate(entries, prefix, token, self.page_size))
    }

    async fn put_or_delete(&self, mode: WriteMode, key: &str, content: Option<&str>) -> Result<()> {
        let mut objects = self.lock();
        match mode {
            WriteMode::Block => {
                let content = content.ok_or_else(|| {
                    SpillwayError::InvalidInput(format!("block write to {key} has no content"))
                })?;
                objects.insert(key.to_string(), content.to_string());
            }
            // an append recreates the object, then appends
            WriteMode::Append => {
                objects.insert(key.to_string(), content.unwrap_or_default().to_string());
            }
            WriteMode::Delete => {
                objects
                    .remove(key)
                    .ok_or_else(|| SpillwayError::NotFound(key.to_string()))?;
            }
        }
        Ok(())
    }

    async fn get_content(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| SpillwayError::NotFound(key.to_string()))
    }
}
