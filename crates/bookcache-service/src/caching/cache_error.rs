use thiserror::Error;

/// An error that prevents the cached path from producing a value.
///
/// None of these are fatal. The [`CircuitBreaker`](super::CircuitBreaker) counts each of them
/// as a failure and answers the call through its fallback instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A call to the remote store failed or timed out.
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(String),
    /// The recomputation run by the lock holder failed.
    ///
    /// The leader does not return this directly, it falls through to the follower retries
    /// in the hope that another writer supplied a value in the meantime.
    #[error("recomputation failed: {0}")]
    RecomputeFailed(String),
    /// No value showed up in the store while waiting for another caller's recomputation.
    #[error("no cached value after {attempts} retries")]
    CacheExhausted { attempts: u32 },
    /// The stored payload could not be decoded.
    ///
    /// This is not treated as a miss, since recomputing would paper over corrupt entries.
    #[error("malformed cache payload: {0}")]
    DeserializeFailed(String),
}

impl CacheError {
    /// A short name for metric tags.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::RecomputeFailed(_) => "recompute_failed",
            Self::CacheExhausted { .. } => "cache_exhausted",
            Self::DeserializeFailed(_) => "deserialize_failed",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::DeserializeFailed(err.to_string())
    }
}

/// The outcome of a cached computation.
pub type CacheEntry<T = ()> = Result<T, CacheError>;
