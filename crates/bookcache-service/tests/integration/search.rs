use std::sync::Arc;

use bookcache_service::caching::{CircuitState, MemoryStore};
use futures::future::join_all;

use crate::utils::instance;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instances_share_one_recomputation() {
    bookcache_test::setup();
    let store = Arc::new(MemoryStore::new(100));
    let instances = [instance(store.clone()), instance(store.clone())];

    let searches = (0..40).map(|i| {
        let service = instances[i % 2].clone();
        tokio::spawn(async move { service.search("python", 1).await })
    });
    let results = join_all(searches).await;

    let first = results[0].as_ref().unwrap().as_ref().unwrap();
    for result in &results {
        assert_eq!(result.as_ref().unwrap().as_ref().unwrap(), first);
    }

    let upstream: usize = instances.iter().map(|s| s.upstream_requests()).sum();
    assert_eq!(upstream, 1);
    assert!(instances.iter().all(|s| s.breaker_state() == CircuitState::Closed));
}

#[tokio::test]
async fn test_pages_are_cached_separately() {
    bookcache_test::setup();
    let service = instance(Arc::new(MemoryStore::new(100)));

    let first = service.search("java", 1).await.unwrap();
    let second = service.search("java", 2).await.unwrap();
    assert_eq!(first.page_info.page, 1);
    assert_eq!(second.page_info.page, 2);
    assert_eq!(service.upstream_requests(), 2);

    assert_eq!(service.search("java", 1).await.unwrap(), first);
    assert_eq!(service.upstream_requests(), 2);
}
