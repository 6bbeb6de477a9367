//! Basic usage of the lazy pool

use esox_lazypool::{Pool, PoolConfiguration};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "esox_lazypool=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== EsoxSolutions.LazyPool - Basic Examples ===\n");

    // Example 1: Lazy construction
    lazy_construction().await;

    // Example 2: Queueing and hand-off
    queueing_and_handoff().await;
}

async fn lazy_construction() {
    println!("1. Lazy Construction:");
    let pool = Pool::<String>::new(2, |seq: u64| async move {
        println!("   Creating connection #{}...", seq);
        Ok::<_, std::io::Error>(format!("conn-{}", seq))
    })
    .unwrap();

    let conn = pool.borrow().await.unwrap();
    println!("   Borrowed: {}", conn);
    pool.give_back(conn);

    {
        let conn = pool.lease().await.unwrap();
        println!("   Leased again without construction: {}", *conn);
    }

    println!("   Idle after return: {}", pool.idle_count());
    println!();
}

async fn queueing_and_handoff() {
    println!("2. Queueing and Hand-off:");
    let config = PoolConfiguration::new().with_limit(1).with_name("demo");
    let pool = Pool::<u64>::with_config(config, |seq: u64| async move {
        Ok::<_, std::io::Error>(seq)
    })
    .unwrap();

    let held = pool.borrow().await.unwrap();
    println!("   Holding item {}", held);

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move {
        let item = waiter_pool.borrow().await.unwrap();
        println!("   Waiter got item {}", item);
        waiter_pool.give_back(item);
    });

    sleep(Duration::from_millis(50)).await;
    println!("   Waiting borrowers: {}", pool.waiting_count());
    pool.give_back(held);
    waiter.await.unwrap();

    for (key, value) in pool.export_metrics() {
        println!("   {}: {}", key, value);
    }
}
