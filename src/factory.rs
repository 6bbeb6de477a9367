//! Item factories

use std::future::Future;

use async_trait::async_trait;

use crate::errors::FactoryError;

/// Builds items for a pool on demand.
///
/// `sequence` starts at 1 and grows by one for every construction attempt,
/// failed or not, so a factory never sees the same number twice.
///
/// Any `Fn(u64) -> impl Future<Output = Result<T, E>>` is a factory:
///
/// ```
/// use esox_lazypool::Pool;
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = Pool::<String>::new(2, |seq: u64| async move {
///     Ok::<_, std::io::Error>(format!("conn-{seq}"))
/// })
/// .unwrap();
///
/// let conn = pool.borrow().await.unwrap();
/// assert_eq!(conn.as_str(), "conn-1");
/// # }
/// ```
#[async_trait]
pub trait ItemFactory<T>: Send + Sync {
    async fn create(&self, sequence: u64) -> Result<T, FactoryError>;
}

#[async_trait]
impl<T, E, F, Fut> ItemFactory<T> for F
where
    T: Send + 'static,
    E: Into<FactoryError> + 'static,
    F: Fn(u64) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    async fn create(&self, sequence: u64) -> Result<T, FactoryError> {
        (self)(sequence).await.map_err(Into::into)
    }
}
