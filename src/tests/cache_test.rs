use crate::services::QueryCache;
use crate::tests::common::{FakeExecutor, FakePlanRetriever, FakeStatistics, TestApp, users_seq_scan};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn test_app() -> TestApp {
    TestApp::new(FakePlanRetriever::new(users_seq_scan()), FakeStatistics::default())
}

#[tokio::test]
async fn test_repeated_query_is_served_from_cache() {
    let app = test_app();
    let sql = "SELECT id FROM users WHERE status = $1";

    let first = app.cache.execute_with_cache(sql, &[json!("active")], None).await.unwrap();
    let second = app.cache.execute_with_cache(sql, &[json!("active")], None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(app.executor.calls(), 1);

    let stats = app.cache.get_stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
    assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_misses_are_recorded_in_analyzer_history() {
    let app = test_app();
    let sql = "SELECT id FROM users WHERE status = $1";

    app.cache.execute_with_cache(sql, &[json!("active")], None).await.unwrap();
    app.cache.execute_with_cache(sql, &[json!("active")], None).await.unwrap();
    app.cache.execute_with_cache(sql, &[json!("disabled")], None).await.unwrap();

    let history = app.analyzer.get_query_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].total_executions, 2);
}

#[tokio::test]
async fn test_parameters_are_part_of_the_key() {
    let app = test_app();
    let sql = "SELECT * FROM orders WHERE user_id = $1";

    let a = app.cache.execute_with_cache(sql, &[json!(1)], None).await.unwrap();
    let b = app.cache.execute_with_cache(sql, &[json!(2)], None).await.unwrap();

    assert_ne!(a, b);
    assert_eq!(app.executor.calls(), 2);
    assert_eq!(app.cache.len(), 2);
}

#[tokio::test]
async fn test_failed_execution_is_not_cached() {
    let app = test_app();

    assert!(app.cache.execute_with_cache("SELECT broken", &[], None).await.is_err());
    assert!(app.cache.execute_with_cache("SELECT broken", &[], None).await.is_err());

    assert_eq!(app.executor.calls(), 2);
    assert!(app.cache.is_empty());
    assert!(app.analyzer.get_query_history().is_empty());
}

#[tokio::test]
async fn test_expired_entry_is_executed_again() {
    let app = test_app();
    let ttl = Some(Duration::from_millis(30));

    app.cache.execute_with_cache("SELECT 1", &[], ttl).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    app.cache.execute_with_cache("SELECT 1", &[], ttl).await.unwrap();

    assert_eq!(app.executor.calls(), 2);
    let stats = app.cache.get_stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.evictions, 1);
}

#[tokio::test]
async fn test_capacity_evicts_least_recently_used() {
    let executor = Arc::new(FakeExecutor::default());
    let cache = QueryCache::new(executor.clone(), 3, Duration::from_secs(60));

    for i in 0..3 {
        cache.execute_with_cache(&format!("SELECT {}", i), &[], None).await.unwrap();
    }
    // touch 0 so that 1 is the least recently used
    cache.execute_with_cache("SELECT 0", &[], None).await.unwrap();
    cache.execute_with_cache("SELECT 3", &[], None).await.unwrap();

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get_stats().evictions, 1);

    let calls = executor.calls();
    cache.execute_with_cache("SELECT 0", &[], None).await.unwrap();
    assert_eq!(executor.calls(), calls);
    cache.execute_with_cache("SELECT 1", &[], None).await.unwrap();
    assert_eq!(executor.calls(), calls + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_respect_capacity() {
    let executor = Arc::new(FakeExecutor::with_delay(Duration::from_millis(5)));
    let cache = Arc::new(QueryCache::new(executor.clone(), 8, Duration::from_secs(60)));

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache.execute_with_cache(&format!("SELECT {}", i % 32), &[], None).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(cache.len() <= 8);
    let stats = cache.get_stats();
    assert_eq!(stats.hits + stats.misses, 64);
    assert_eq!(stats.misses as usize, executor.calls());
}

#[tokio::test]
async fn test_invalidate_by_pattern() {
    let app = test_app();
    app.cache.execute_with_cache("SELECT 1", &[], None).await.unwrap();
    app.cache.execute_with_cache("SELECT 2", &[], None).await.unwrap();
    app.cache.set("report:daily", json!({ "rows": 10 }), None);
    app.cache.set("report:weekly", json!({ "rows": 70 }), None);

    assert_eq!(app.cache.invalidate_by_pattern("report:d*"), 1);
    assert_eq!(app.cache.invalidate_by_pattern("query:*"), 2);
    assert_eq!(app.cache.invalidate_by_pattern("nothing-*"), 0);

    assert_eq!(app.cache.get("report:weekly"), Some(json!({ "rows": 70 })));
    assert_eq!(app.cache.len(), 1);
}
