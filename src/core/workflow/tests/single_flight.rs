use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use crate::core::error::WorkflowError;
use crate::core::workflow::SentimentInitCache;

#[tokio::test]
async fn concurrent_callers_share_one_attempt() {
    let cache = SentimentInitCache::new();
    let attempts = Arc::new(AtomicUsize::new(0));

    let run = || {
        let attempts = attempts.clone();
        cache.run(move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            // Dwell so the other callers arrive while this is in flight.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(json!({ "total_score": 52 }))
        })
    };

    let (a, b, c) = tokio::join!(run(), run(), run());
    assert_eq!(a.unwrap(), json!({ "total_score": 52 }));
    assert_eq!(b.unwrap(), json!({ "total_score": 52 }));
    assert_eq!(c.unwrap(), json!({ "total_score": 52 }));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cached_value_short_circuits_later_calls() {
    let cache = SentimentInitCache::new();
    let attempts = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!({ "total_score": 52 })) }
            })
            .await
            .unwrap();
        assert_eq!(value, json!({ "total_score": 52 }));
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(), Some(json!({ "total_score": 52 })));
}

#[tokio::test]
async fn failures_are_not_cached_and_a_retry_runs_fresh() {
    let cache = SentimentInitCache::new();

    let err = cache
        .run(|| async {
            Err(WorkflowError::Timeout {
                workflow: "市场情绪分析初始化".to_string(),
            })
        })
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(cache.get(), None);

    // The failed attempt left nothing in flight; the retry runs and caches.
    let value = cache
        .run(|| async { Ok(json!({ "total_score": 60 })) })
        .await
        .unwrap();
    assert_eq!(value, json!({ "total_score": 60 }));
    assert_eq!(cache.get(), Some(json!({ "total_score": 60 })));
}

#[tokio::test]
async fn every_joined_caller_sees_the_shared_failure() {
    let cache = SentimentInitCache::new();
    let attempts = Arc::new(AtomicUsize::new(0));

    let run = || {
        let attempts = attempts.clone();
        cache.run(move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(WorkflowError::Transport("connection refused".to_string()))
        })
    };

    let (a, b) = tokio::join!(run(), run());
    assert!(a.is_err());
    assert!(b.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reset_discards_the_cached_value() {
    let cache = SentimentInitCache::new();
    cache
        .run(|| async { Ok(json!({ "total_score": 52 })) })
        .await
        .unwrap();
    assert!(cache.get().is_some());

    cache.reset();
    assert_eq!(cache.get(), None);

    let value = cache
        .run(|| async { Ok(json!({ "total_score": 70 })) })
        .await
        .unwrap();
    assert_eq!(value, json!({ "total_score": 70 }));
}
