use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::{CacheEntry, CacheKey, RemoteStore};

/// Proof of holding a single-flight lock.
///
/// Only the holder of the token can release the lock again. A token that is never released
/// stops guarding its key once the lock's TTL elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LockToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A per-key mutual exclusion marker in the shared store.
///
/// The marker lives at [`CacheKey::lock_key`] and guards the recomputation of its key across
/// all processes sharing the store.
#[derive(Debug, Clone)]
pub struct SingleFlightLock {
    store: Arc<dyn RemoteStore>,
}

impl SingleFlightLock {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Tries to take the lock for `key` for at most `ttl`.
    ///
    /// Returns `None` if somebody else holds it, which is a regular outcome and not an error.
    pub async fn acquire(&self, key: &CacheKey, ttl: Duration) -> CacheEntry<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self
            .store
            .set_if_absent(&key.lock_key(), token.as_str(), ttl)
            .await?;

        if acquired {
            metric!(counter("caches.lock.acquired") += 1);
            Ok(Some(token))
        } else {
            metric!(counter("caches.lock.contended") += 1);
            tracing::debug!(key = %key, "Recomputation lock held elsewhere");
            Ok(None)
        }
    }

    /// Releases the lock for `key` if it is still held with `token`.
    ///
    /// Returns whether the lock was removed. Store failures are logged and otherwise ignored,
    /// the lock then expires on its own.
    pub async fn release(&self, key: &CacheKey, token: &LockToken) -> bool {
        match self
            .store
            .compare_and_delete(&key.lock_key(), token.as_str())
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(key = %key, "Recomputation lock expired before it was released");
                metric!(counter("caches.lock.lost") += 1);
                false
            }
            Err(err) => {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    key = %key,
                    "Failed to release recomputation lock",
                );
                false
            }
        }
    }
}
