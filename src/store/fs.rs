//! Directory-backed store.
//!
//! Keys are `/`-separated paths relative to the root directory. Listing
//! walks the whole tree and pages over the sorted key set, so it suits
//! local mirrors and tests rather than very large trees.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use super::{DEFAULT_PAGE_SIZE, ObjectStore, paginate};
use crate::types::{ContinuationToken, Entry, Page, WriteMode};
use crate::{Result, SpillwayError};

pub struct FsStore {
    root: PathBuf,
    page_size: usize,
}

impl FsStore {
    /// Store rooted at `root`. The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SpillwayError::Configuration(format!(
                "store root {root:?} is not a directory"
            )));
        }
        Ok(Self {
            root,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Entries per listing page (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, refusing anything that escapes it.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(SpillwayError::InvalidInput(format!("invalid key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }

    async fn walk(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut reader = fs::read_dir(&dir).await?;
            while let Some(item) = reader.next_entry().await? {
                let file_type = item.file_type().await?;
                let path = item.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let Some(key) = self.key_for(&path) else {
                        continue;
                    };
                    let len = item.metadata().await?.len();
                    entries.push(Entry::new(key, len));
                }
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        Some(parts?.join("/"))
    }
}

fn not_found(key: &str) -> impl FnOnce(io::Error) -> SpillwayError + '_ {
    move |e| {
        if e.kind() == io::ErrorKind::NotFound {
            SpillwayError::NotFound(key.to_string())
        } else {
            SpillwayError::Io(e)
        }
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn fetch_page(
        &self,
        prefix: Option<&str>,
        token: Option<&ContinuationToken>,
    ) -> Result<Page> {
        let entries = self.walk().await?;
        Ok(paginate(entries, prefix, token, self.page_size))
    }

    async fn put_or_delete(&self, mode: WriteMode, key: &str, content: Option<&str>) -> Result<()> {
        let path = self.path_for(key)?;
        trace!(key, mode = mode.as_str(), path = %path.display(), "fs write");

        if mode == WriteMode::Delete {
            return fs::remove_file(&path).await.map_err(not_found(key));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        match mode {
            WriteMode::Block => {
                let content = content.ok_or_else(|| {
                    SpillwayError::InvalidInput(format!("block write to {key} has no content"))
                })?;
                fs::write(&path, content).await?;
            }
            _ => {
                // recreate, then append
                let mut file = fs::File::create(&path).await?;
                if let Some(content) = content {
                    file.write_all(content.as_bytes()).await?;
                }
                file.flush().await?;
            }
        }
        Ok(())
    }

    async fn get_content(&self, key: &str) -> Result<String> {
        let path = self.path_for(key)?;
        fs::read_to_string(&path).await.map_err(not_found(key))
    }
}
