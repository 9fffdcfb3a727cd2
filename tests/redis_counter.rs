//! Runs against a live Redis. Set `MOVIEHUB_TEST_REDIS_DSN` and pass `--ignored`:
//!
//! $ MOVIEHUB_TEST_REDIS_DSN=redis://127.0.0.1:6379 cargo test --test redis_counter -- --ignored

use futures_util::future::join_all;
use moviehub::application_impl::*;
use moviehub::application_port::*;
use moviehub::domain_port::*;
use moviehub::infra_redis::*;
use std::sync::Arc;
use uuid::Uuid;

async fn store() -> Option<RedisCounterStore> {
    let dsn = std::env::var("MOVIEHUB_TEST_REDIS_DSN").ok()?;
    let client = redis::Client::open(dsn.as_str()).unwrap();
    let manager = client.get_connection_manager().await.unwrap();
    // Fresh prefix per run.
    let prefix = format!("moviehub-test-{}", Uuid::new_v4().simple());
    Some(RedisCounterStore::new(manager, prefix))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires a running redis (MOVIEHUB_TEST_REDIS_DSN)"]
async fn concurrent_increments_are_counted_once_each() {
    let Some(store) = store().await else {
        return;
    };
    let counter = Arc::new(RealVisitorCounter::new(Arc::new(store), "api_visits"));
    assert_eq!(counter.read().await.unwrap(), 0);

    let handles = (0..500).map(|_| {
        let counter = counter.clone();
        tokio::spawn(async move { counter.increment().await })
    });
    let mut returned: Vec<i64> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(counter.read().await.unwrap(), 500);
    returned.sort_unstable();
    assert_eq!(returned, (1..=500).collect::<Vec<i64>>());

    counter.reset().await.unwrap();
    assert_eq!(counter.read().await.unwrap(), 0);
    assert_eq!(counter.increment().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires a running redis (MOVIEHUB_TEST_REDIS_DSN)"]
async fn keys_are_scoped_by_prefix() {
    let Some(scoped) = store().await else {
        return;
    };
    assert_eq!(scoped.get("visits").await.unwrap(), None);
    scoped.set("visits", 41).await.unwrap();
    assert_eq!(scoped.incr("visits").await.unwrap(), 42);
    assert_eq!(scoped.get("other").await.unwrap(), None);

    let Some(neighbour) = store().await else {
        return;
    };
    assert_eq!(neighbour.get("visits").await.unwrap(), None);
}
