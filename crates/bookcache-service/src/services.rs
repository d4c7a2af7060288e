//! The book search service, cached and guarded by a circuit breaker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

use crate::caching::{
    CacheKey, CircuitBreaker, CircuitBreakerConfig, CircuitState, PerCacheConfig,
    PerCacheManager, RemoteStore, create_store,
};
use crate::config::Config;
use crate::search::{SearchAdapter, SearchBookResponse, create_adapter};

#[derive(Debug)]
struct SearchServiceInner {
    cache: PerCacheManager,
    breaker: CircuitBreaker,
    adapter: Arc<dyn SearchAdapter>,
    upstream_requests: AtomicUsize,
}

/// Answers book searches from the cache, falling back to the upstream when the cache fails.
#[derive(Debug, Clone)]
pub struct SearchService {
    inner: Arc<SearchServiceInner>,
}

impl SearchService {
    /// Creates the store and the upstream adapter from the configuration.
    pub async fn create(config: &Config) -> Result<Self> {
        let store = create_store(&config.store).await?;
        let adapter = create_adapter(&config.upstream)?;
        tracing::info!(
            upstream = adapter.name(),
            beta = config.cache.beta,
            max_follower_wait = ?config.cache.max_follower_wait(),
            "Search service ready",
        );
        Ok(Self::new(
            store,
            adapter,
            config.cache.clone(),
            config.circuit_breaker,
        ))
    }

    pub fn new(
        store: Arc<dyn RemoteStore>,
        adapter: Arc<dyn SearchAdapter>,
        cache: PerCacheConfig,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        let inner = SearchServiceInner {
            cache: PerCacheManager::new(store, cache),
            breaker: CircuitBreaker::new("search_cache", breaker),
            adapter,
            upstream_requests: AtomicUsize::new(0),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Searches one page of books for an already normalized query.
    ///
    /// Cache failures of any kind are absorbed by the breaker, which answers straight from the
    /// upstream instead. Only upstream failures of that direct call reach the caller.
    pub async fn search(&self, query: &str, page: u32) -> Result<SearchBookResponse> {
        let key = CacheKey::for_search(query, page);
        let cache = &self.inner.cache;
        let key = &key;

        self.inner
            .breaker
            .execute(
                move || async move {
                    cache
                        .get(key, move || self.fetch(query, page))
                        .await
                        .inspect_err(|err| {
                            metric!(counter("caches.error") += 1, "kind" => err.kind());
                        })
                },
                move || self.fetch(query, page),
            )
            .await
    }

    async fn fetch(&self, query: &str, page: u32) -> Result<SearchBookResponse> {
        self.inner.upstream_requests.fetch_add(1, Ordering::Relaxed);
        metric!(
            counter("upstream.requests") += 1,
            "upstream" => self.inner.adapter.name(),
        );
        self.inner.adapter.search(query, page).await
    }

    /// The number of requests sent to the upstream since startup.
    pub fn upstream_requests(&self) -> usize {
        self.inner.upstream_requests.load(Ordering::Relaxed)
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.inner.breaker.state()
    }

    pub fn breaker_failures(&self) -> u32 {
        self.inner.breaker.failure_count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::future::join_all;

    use super::*;
    use crate::caching::{CacheRecord, MemoryStore, StoreError};
    use crate::search::{GeneratedConfig, GeneratedSearchAdapter};

    #[derive(Debug)]
    struct DownStore;

    #[async_trait]
    impl RemoteStore for DownStore {
        async fn atomic_read(&self, _: &CacheKey, _: &str) -> Result<CacheRecord, StoreError> {
            Err(StoreError::Timeout)
        }

        async fn atomic_write(
            &self,
            _: &CacheKey,
            _: &str,
            _: &str,
            _: Duration,
            _: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Timeout)
        }

        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Timeout)
        }

        async fn compare_and_delete(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Timeout)
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    fn adapter() -> Arc<dyn SearchAdapter> {
        Arc::new(GeneratedSearchAdapter::new(GeneratedConfig {
            min_latency: Duration::from_millis(50),
            max_latency: Duration::from_millis(50),
        }))
    }

    fn cache_config() -> PerCacheConfig {
        PerCacheConfig {
            follower_retry_attempts: 10,
            follower_base_backoff: Duration::from_millis(20),
            follower_max_jitter: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_repeated_search_is_cached() {
        bookcache_test::setup();
        let service = SearchService::new(
            Arc::new(MemoryStore::new(100)),
            adapter(),
            cache_config(),
            CircuitBreakerConfig::default(),
        );

        let first = service.search("java", 1).await.unwrap();
        let second = service.search("java", 1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.upstream_requests(), 1);

        service.search("java", 2).await.unwrap();
        assert_eq!(service.upstream_requests(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_searches_single_upstream_call() {
        bookcache_test::setup();
        let service = SearchService::new(
            Arc::new(MemoryStore::new(100)),
            adapter(),
            cache_config(),
            CircuitBreakerConfig::default(),
        );

        let results = join_all((0..20).map(|_| service.search("spring", 1))).await;
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert_eq!(result.as_ref().unwrap(), first);
        }
        assert_eq!(service.upstream_requests(), 1);
        assert_eq!(service.breaker_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_store_outage_falls_back() {
        bookcache_test::setup();
        let service = SearchService::new(
            Arc::new(DownStore),
            adapter(),
            cache_config(),
            CircuitBreakerConfig {
                max_failures: 2,
                open_duration: None,
            },
        );

        for page in 1..=5 {
            let response = service.search("redis", page).await.unwrap();
            assert_eq!(response.page_info.page, page);
        }

        assert_eq!(service.upstream_requests(), 5);
        assert_eq!(service.breaker_state(), CircuitState::Open);
        assert_eq!(service.breaker_failures(), 3);
    }

    #[test]
    fn test_debug_names_adapter() {
        let service = SearchService::new(
            Arc::new(MemoryStore::new(10)),
            adapter(),
            cache_config(),
            CircuitBreakerConfig::default(),
        );
        let debug = format!("{service:?}");
        assert!(debug.contains("GeneratedSearchAdapter"), "{debug}");
        assert!(debug.contains("MemoryStore"), "{debug}");
    }
}
