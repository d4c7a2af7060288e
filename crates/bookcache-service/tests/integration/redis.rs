use std::sync::Arc;
use std::time::Duration;

use bookcache_service::caching::{RedisStoreConfig, RemoteStore, StoreConfig, create_store};
use futures::future::join_all;

use crate::utils::instance;

async fn redis_store() -> Arc<dyn RemoteStore> {
    let config = StoreConfig::Redis(RedisStoreConfig {
        url: bookcache_test::redis_url().unwrap(),
        connect_timeout: Duration::from_secs(1),
        command_timeout: Duration::from_secs(1),
    });
    create_store(&config).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_single_flight_across_instances() {
    bookcache_test::redis_or_skip!();
    bookcache_test::setup();

    // every instance has its own connection, like separate processes would
    let instances = [
        instance(redis_store().await),
        instance(redis_store().await),
        instance(redis_store().await),
    ];
    let query = format!("redis{}", uuid::Uuid::new_v4().simple());

    let searches = (0..30).map(|i| {
        let service = instances[i % 3].clone();
        let query = query.clone();
        tokio::spawn(async move { service.search(&query, 1).await })
    });
    let results = join_all(searches).await;

    let first = results[0].as_ref().unwrap().as_ref().unwrap();
    for result in &results {
        assert_eq!(result.as_ref().unwrap().as_ref().unwrap(), first);
    }

    let upstream: usize = instances.iter().map(|s| s.upstream_requests()).sum();
    assert_eq!(upstream, 1);
}
