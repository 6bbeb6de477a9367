use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use esox_lazypool::{Pool, PoolConfiguration, PoolError};
use parking_lot::Mutex;
use tokio::task::yield_now;

fn counting_pool(limit: usize) -> Pool<u64> {
    Pool::<u64>::new(limit, |seq: u64| async move { Ok::<_, std::io::Error>(seq) }).unwrap()
}

#[tokio::test]
async fn queued_borrow_receives_returned_item() {
    let pool = counting_pool(2);

    let first = pool.borrow().await.unwrap();
    let second = pool.borrow().await.unwrap();
    assert_eq!((*first, *second), (1, 2));

    let p = pool.clone();
    let queued = tokio::spawn(async move { p.borrow().await });
    while pool.waiting_count() == 0 {
        yield_now().await;
    }

    assert!(pool.give_back(Arc::clone(&first)));
    let third = queued.await.unwrap().unwrap();
    assert_eq!(*third, 1);

    assert!(pool.give_back(second));
    assert!(pool.give_back(third));
    assert_eq!(pool.idle_count(), 2);

    let reused = pool.borrow().await.unwrap();
    assert!(*reused == 1 || *reused == 2);
    assert_eq!(pool.get_metrics().total_constructed, 2);
}

#[tokio::test]
async fn unknown_item_is_rejected() {
    let pool = counting_pool(2);
    assert!(!pool.give_back(Arc::new(4)));

    let metrics = pool.get_metrics();
    assert_eq!(metrics.invalid_returns, 1);
    assert_eq!(metrics.active_items, 0);
    assert_eq!(metrics.idle_items, 0);
}

#[tokio::test]
async fn failed_construction_can_be_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let pool = Pool::<String>::new(1, move |seq: u64| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                return Err(std::io::Error::other("backend unavailable"));
            }
            Ok(format!("conn-{seq}"))
        }
    })
    .unwrap();

    match pool.borrow().await {
        Err(PoolError::Construction { sequence, source }) => {
            assert_eq!(sequence, 1);
            assert_eq!(source.to_string(), "backend unavailable");
        }
        other => panic!("expected construction failure, got {other:?}"),
    }
    assert_eq!(pool.active_count(), 0);

    let conn = pool.borrow().await.unwrap();
    assert_eq!(conn.as_str(), "conn-2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_limit_is_rejected() {
    let config = PoolConfiguration::new().with_limit(0);
    let result = Pool::<u64>::with_config(config, |seq: u64| async move {
        Ok::<_, std::io::Error>(seq)
    });
    assert!(matches!(result, Err(PoolError::InvalidLimit)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_borrowers_never_share_items() {
    const LIMIT: usize = 3;
    let pool = Pool::<u64>::new(LIMIT, |seq: u64| async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok::<_, std::io::Error>(seq)
    })
    .unwrap();
    let held = Arc::new(Mutex::new(HashSet::new()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let held = Arc::clone(&held);
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                let item = pool.borrow().await.unwrap();
                assert!(held.lock().insert(*item), "item {} lent twice", *item);
                assert!(pool.active_count() <= LIMIT);
                yield_now().await;
                assert!(held.lock().remove(&*item));
                assert!(pool.give_back(item));
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let metrics = pool.get_metrics();
    assert!(metrics.total_constructed <= LIMIT);
    assert_eq!(metrics.total_borrowed, 400);
    assert_eq!(metrics.total_returned, 400);
    assert_eq!(metrics.active_items, 0);
    assert_eq!(metrics.waiting_borrowers, 0);
    assert_eq!(metrics.idle_items, metrics.total_constructed);
}
