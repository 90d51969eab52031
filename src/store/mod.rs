//! Object store collaborators.
//!
//! The stream engine never talks to a storage service directly. Everything
//! goes through [`ObjectStore`], which exposes the three primitives the
//! pumps need: fetching one listing page, writing or deleting one key, and
//! reading one key.
//!
//! Stores are expected to be shared, remote and rate limited. The pump's
//! concurrency bound is the only protection the engine adds; retry and
//! backoff on throttling belong inside a store implementation. An optional
//! per-call deadline is available through [`TimeoutStore`].

mod fs;
mod memory;
mod timeout;

use async_trait::async_trait;

use crate::Result;
use crate::types::{ContinuationToken, Entry, Page, WriteMode};

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use timeout::TimeoutStore;

/// Default number of entries per listing page for the bundled stores.
pub const DEFAULT_PAGE_SIZE: usize = 5000;

/// The storage service the pumps delegate I/O to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store name for logging/debugging.
    fn name(&self) -> &str;

    /// Fetch one page of entries under `prefix`.
    ///
    /// `token` is `None` for the first page. A returned page without a
    /// continuation token is the last one.
    async fn fetch_page(
        &self,
        prefix: Option<&str>,
        token: Option<&ContinuationToken>,
    ) -> Result<Page>;

    /// Write (`Block`, `Append`) or remove (`Delete`) one key.
    async fn put_or_delete(&self, mode: WriteMode, key: &str, content: Option<&str>) -> Result<()>;

    /// Read the content stored under `key`.
    async fn get_content(&self, key: &str) -> Result<String>;
}

/// Cut one page out of a sorted entry sequence.
///
/// The continuation token is the last name on the page; the next page
/// starts strictly after it.
pub(crate) fn paginate<I>(
    sorted: I,
    prefix: Option<&str>,
    token: Option<&ContinuationToken>,
    page_size: usize,
) -> Page
where
    I: IntoIterator<Item = Entry>,
{
    let page_size = page_size.max(1);
    let mut remaining = sorted
        .into_iter()
        .filter(|entry| prefix.is_none_or(|p| entry.name.starts_with(p)))
        .filter(|entry| token.is_none_or(|t| entry.name.as_str() > t.as_str()))
        .peekable();

    let entries: Vec<Entry> = remaining.by_ref().take(page_size).collect();
    let continuation_token = match (remaining.peek(), entries.last()) {
        (Some(_), Some(last)) => Some(ContinuationToken::new(last.name.clone())),
        _ => None,
    };
    Page {
        entries,
        continuation_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(names: &[&str]) -> Vec<Entry> {
        names.iter().map(|n| Entry::new(*n, 1)).collect()
    }

    #[test]
    fn paginate_walks_with_tokens() {
        let all = entries(&["a/1", "a/2", "a/3", "b/1"]);

        let first = paginate(all.clone(), Some("a/"), None, 2);
        assert_eq!(first.entries, entries(&["a/1", "a/2"]));
        let token = first.continuation_token.unwrap();

        let second = paginate(all, Some("a/"), Some(&token), 2);
        assert_eq!(second.entries, entries(&["a/3"]));
        assert!(second.continuation_token.is_none());
    }

    #[test]
    fn exact_page_boundary_has_no_token() {
        let page = paginate(entries(&["x", "y"]), None, None, 2);
        assert_eq!(page.entries.len(), 2);
        assert!(page.continuation_token.is_none());
    }
}
