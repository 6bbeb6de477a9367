//! # EsoxSolutions.LazyPool
//!
//! Bounded, lazily-populated async resource pool for Rust.
//!
//! ## Features
//!
//! - Items built on demand by an async factory, never more than `limit` active
//! - Most-recently-returned idle items reused first
//! - Borrowers queued in FIFO order once the pool is at capacity
//! - Returned items handed straight to the oldest waiting borrower
//! - Factory failures release their capacity instead of leaking it
//! - Automatic return of items via RAII (`Pool::lease`)
//! - Pool warm-up/pre-population
//! - Metrics snapshot and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_lazypool::Pool;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let pool = Pool::<String>::new(2, |seq: u64| async move {
//!     Ok::<_, std::io::Error>(format!("Item {seq}"))
//! })
//! .unwrap();
//!
//! let item = pool.borrow().await.unwrap();
//! println!("Got: {}", item);
//! assert!(pool.give_back(item));
//!
//! {
//!     let leased = pool.lease().await.unwrap();
//!     println!("Leased: {}", *leased);
//!     // Item automatically returned when `leased` goes out of scope
//! }
//! # }
//! ```

mod pool;
mod config;
mod factory;
mod metrics;
mod errors;

pub use pool::{Pool, PooledItem};
pub use config::PoolConfiguration;
pub use factory::ItemFactory;
pub use metrics::PoolMetrics;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use errors::{FactoryError, PoolError, PoolResult};
