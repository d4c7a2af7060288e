use std::fmt;
use std::sync::Arc;

/// The key of a cached value in the remote store.
///
/// A value owns two more keys next to it: one holding the duration of its last computation,
/// see [`delta_key`](Self::delta_key), and the single-flight lock, see
/// [`lock_key`](Self::lock_key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    key: Arc<str>,
}

impl CacheKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self { key: key.into() }
    }

    /// Creates the key for one page of search results.
    ///
    /// `query` is expected to be normalized already.
    pub fn for_search(query: &str, page: u32) -> Self {
        Self::new(format!("{query}:{page}"))
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The key holding the computation cost, in milliseconds.
    pub fn delta_key(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.key)
    }

    /// The key of the single-flight lock marker.
    pub fn lock_key(&self) -> String {
        format!("{}:lock", self.key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}
