use std::sync::Arc;
use std::time::Duration;

use bookcache_service::caching::{CircuitBreakerConfig, PerCacheConfig, RemoteStore};
use bookcache_service::search::{GeneratedConfig, GeneratedSearchAdapter};
use bookcache_service::services::SearchService;

/// Creates one service instance on top of a shared store.
///
/// The upstream takes 100ms, and followers wait up to a second for a leader.
pub fn instance(store: Arc<dyn RemoteStore>) -> SearchService {
    let upstream = GeneratedSearchAdapter::new(GeneratedConfig {
        min_latency: Duration::from_millis(100),
        max_latency: Duration::from_millis(100),
    });
    let cache = PerCacheConfig {
        follower_retry_attempts: 20,
        follower_base_backoff: Duration::from_millis(40),
        follower_max_jitter: Duration::from_millis(10),
        ..Default::default()
    };
    SearchService::new(
        store,
        Arc::new(upstream),
        cache,
        CircuitBreakerConfig::default(),
    )
}
