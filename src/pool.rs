//! Core lazy pool implementation

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::factory::ItemFactory;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;
use crate::metrics::{MetricsTracker, PoolMetrics};

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Identity of a pooled item: the address of its `Arc` allocation.
///
/// The pool keeps a clone of every item on loan, so an address cannot be
/// reused while the item is tracked.
type ItemKey = usize;

fn item_key<T>(item: &Arc<T>) -> ItemKey {
    Arc::as_ptr(item) as *const () as usize
}

/// What a queued borrower is woken with.
enum Grant<T> {
    /// A returned item, still on loan.
    Item(Arc<T>),
    /// A released construction slot; `active` already counts it.
    Slot,
}

struct PoolState<T> {
    active: usize,
    idle: Vec<Arc<T>>,
    waiters: VecDeque<oneshot::Sender<Grant<T>>>,
}

impl<T> PoolState<T> {
    /// Queued borrowers whose future is still alive
    fn live_waiters(&self) -> usize {
        self.waiters.iter().filter(|tx| !tx.is_closed()).count()
    }
}

struct PoolInner<T> {
    config: PoolConfiguration,
    factory: Box<dyn ItemFactory<T>>,
    state: Mutex<PoolState<T>>,
    on_loan: DashMap<ItemKey, Arc<T>>,
    next_sequence: AtomicU64,
    metrics: MetricsTracker,
}

impl<T> PoolInner<T> {
    /// Record `item` as on loan. Callers hold the state lock.
    fn lend(&self, item: &Arc<T>) {
        self.on_loan.insert(item_key(item), Arc::clone(item));
    }

    /// Pass an on-loan item to the oldest live waiter, or park it in `idle`.
    ///
    /// Returns `true` when the item was handed off.
    fn settle(&self, state: &mut PoolState<T>, mut item: Arc<T>) -> bool {
        while let Some(waiter) = state.waiters.pop_front() {
            let Err(Grant::Item(back)) = waiter.send(Grant::Item(item)) else {
                trace!(pool = %self.config.name, "item handed off to waiting borrower");
                return true;
            };
            item = back;
        }

        self.on_loan.remove(&item_key(&item));
        state.active -= 1;
        state.idle.push(item);
        false
    }

    fn give_back(&self, item: Arc<T>) -> bool {
        let mut state = self.state.lock();
        if !self.on_loan.contains_key(&item_key(&item)) {
            drop(state);
            MetricsTracker::record(&self.metrics.invalid_returns);
            warn!(pool = %self.config.name, "rejected return of an item that is not on loan");
            return false;
        }

        let handed_off = self.settle(&mut state, item);
        drop(state);

        MetricsTracker::record(&self.metrics.total_returned);
        if handed_off {
            MetricsTracker::record(&self.metrics.total_handoffs);
        }
        true
    }

    /// Give up a reserved slot. The oldest live waiter inherits it and
    /// constructs in our place; with no waiter the slot is freed.
    fn release_slot(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(Grant::Slot).is_ok() {
                trace!(pool = %self.config.name, "construction slot passed to waiting borrower");
                return;
            }
        }
        state.active -= 1;
    }

    /// Build one item on an already reserved slot.
    async fn construct(&self, mut slot: SlotReservation<'_, T>) -> PoolResult<Arc<T>> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        debug!(pool = %self.config.name, sequence, "constructing item");

        match self.factory.create(sequence).await {
            Ok(item) => {
                let item = Arc::new(item);
                {
                    let _state = self.state.lock();
                    self.lend(&item);
                }
                slot.armed = false;
                MetricsTracker::record(&self.metrics.total_constructed);
                debug!(pool = %self.config.name, sequence, "item constructed");
                Ok(item)
            }
            Err(source) => {
                MetricsTracker::record(&self.metrics.construction_failures);
                warn!(
                    pool = %self.config.name,
                    sequence,
                    error = %source,
                    "item construction failed"
                );
                drop(slot);
                Err(PoolError::construction(sequence, source))
            }
        }
    }
}

/// A unit of `active` capacity held by an in-flight construction.
///
/// Dropping it while armed, on factory failure or because the borrow
/// future was dropped, releases the slot.
struct SlotReservation<'a, T> {
    pool: &'a PoolInner<T>,
    armed: bool,
}

impl<'a, T> SlotReservation<'a, T> {
    fn new(pool: &'a PoolInner<T>) -> Self {
        Self { pool, armed: true }
    }
}

impl<T> Drop for SlotReservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot();
        }
    }
}

/// A queued borrow. If the borrow future is dropped before being granted,
/// the queue entry is pruned and a grant that raced in is given back.
struct Waiting<'a, T> {
    pool: &'a PoolInner<T>,
    rx: Option<oneshot::Receiver<Grant<T>>>,
}

impl<T> Waiting<'_, T> {
    async fn recv(&mut self) -> PoolResult<Grant<T>> {
        let rx = self.rx.as_mut().ok_or(PoolError::Closed)?;
        let grant = rx.await.map_err(|_| PoolError::Closed)?;
        self.rx = None;
        Ok(grant)
    }
}

impl<T> Drop for Waiting<'_, T> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };

        rx.close();
        self.pool.state.lock().waiters.retain(|tx| !tx.is_closed());

        match rx.try_recv() {
            Ok(Grant::Item(item)) => {
                // The return was already counted; only the hand-off is undone
                // when the item ends up idle.
                let handed_off = self.pool.settle(&mut self.pool.state.lock(), item);
                if !handed_off {
                    MetricsTracker::retract(&self.pool.metrics.total_handoffs);
                }
            }
            Ok(Grant::Slot) => self.pool.release_slot(),
            Err(_) => {}
        }
    }
}

/// A borrowed item that gives itself back to the pool when dropped
pub struct PooledItem<T> {
    item: Option<Arc<T>>,
    pool: Pool<T>,
}

impl<T> PooledItem<T> {
    /// Take the item out of the guard without giving it back.
    ///
    /// The item stays on loan; hand it back later with [`Pool::give_back`].
    pub fn detach(mut self) -> Arc<T> {
        self.item.take().expect("Item already detached")
    }
}

impl<T> Deref for PooledItem<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.item.as_deref().expect("Item already detached")
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledItem").field(&self.item).finish()
    }
}

impl<T> Drop for PooledItem<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.inner.give_back(item);
        }
    }
}

/// Bounded pool that builds items lazily and queues borrowers at capacity.
///
/// At most `limit` items are active (not idle) at once. A borrow reuses the
/// most recently returned idle item, otherwise builds a new one while under
/// the limit, otherwise waits in FIFO order for a return. A return goes
/// straight to the oldest waiter when there is one.
///
/// Items are handed out as `Arc<T>`; the pool recognises its own items by
/// allocation identity, never by value.
///
/// # Examples
///
/// ```
/// use esox_lazypool::Pool;
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = Pool::<String>::new(2, |seq: u64| async move {
///     Ok::<_, std::io::Error>(format!("Item {seq}"))
/// })
/// .unwrap();
///
/// let item = pool.borrow().await.unwrap();
/// assert_eq!(item.as_str(), "Item 1");
/// assert!(pool.give_back(item));
/// # }
/// ```
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Pool<T> {
    /// Create a pool that allows `limit` active items.
    ///
    /// Fails with [`PoolError::InvalidLimit`] when `limit` is zero.
    pub fn new<F>(limit: usize, factory: F) -> PoolResult<Self>
    where
        F: ItemFactory<T> + 'static,
    {
        Self::with_config(PoolConfiguration::new().with_limit(limit), factory)
    }

    /// Create a pool from a full configuration
    pub fn with_config<F>(config: PoolConfiguration, factory: F) -> PoolResult<Self>
    where
        F: ItemFactory<T> + 'static,
    {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    active: 0,
                    idle: Vec::with_capacity(config.limit),
                    waiters: VecDeque::new(),
                }),
                config,
                factory: Box::new(factory),
                on_loan: DashMap::new(),
                next_sequence: AtomicU64::new(1),
                metrics: MetricsTracker::new(),
            }),
        })
    }

    /// Borrow an item, waiting for a return if the pool is at capacity.
    ///
    /// Fails only when the factory fails to build the item this call
    /// reserved capacity for; the capacity is released again.
    pub async fn borrow(&self) -> PoolResult<Arc<T>> {
        let inner = &*self.inner;

        let rx = {
            let mut state = inner.state.lock();
            if let Some(item) = state.idle.pop() {
                state.active += 1;
                inner.lend(&item);
                drop(state);
                MetricsTracker::record(&inner.metrics.total_borrowed);
                return Ok(item);
            }

            if state.active < inner.config.limit {
                state.active += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                trace!(pool = %inner.config.name, waiting = state.waiters.len(), "borrow queued");
                Some(rx)
            }
        };

        let item = match rx {
            None => inner.construct(SlotReservation::new(inner)).await?,
            Some(rx) => {
                let mut waiting = Waiting {
                    pool: inner,
                    rx: Some(rx),
                };
                match waiting.recv().await? {
                    Grant::Item(item) => item,
                    Grant::Slot => inner.construct(SlotReservation::new(inner)).await?,
                }
            }
        };

        MetricsTracker::record(&inner.metrics.total_borrowed);
        Ok(item)
    }

    /// Borrow an item wrapped in a guard that gives it back on drop
    pub async fn lease(&self) -> PoolResult<PooledItem<T>> {
        let item = self.borrow().await?;
        Ok(PooledItem {
            item: Some(item),
            pool: self.clone(),
        })
    }

    /// Give a borrowed item back to the pool.
    ///
    /// Returns `false`, changing nothing, when `item` is not currently on
    /// loan from this pool: never borrowed, already returned, or foreign.
    pub fn give_back(&self, item: Arc<T>) -> bool {
        self.inner.give_back(item)
    }

    /// Build up to `count` items ahead of demand and park them as idle.
    ///
    /// Stops early once `limit` items exist. Returns how many were built.
    pub async fn warmup(&self, count: usize) -> PoolResult<usize> {
        let inner = &*self.inner;
        let mut built = 0;

        while built < count {
            {
                let mut state = inner.state.lock();
                if state.active + state.idle.len() >= inner.config.limit {
                    break;
                }
                state.active += 1;
            }

            let item = inner.construct(SlotReservation::new(inner)).await?;
            {
                let mut state = inner.state.lock();
                inner.settle(&mut state, item);
            }
            built += 1;
        }

        debug!(pool = %inner.config.name, built, "warm-up finished");
        Ok(built)
    }

    /// Warm up by the configured `warmup_size`, if any
    pub async fn warmup_configured(&self) -> PoolResult<usize> {
        match self.inner.config.warmup_size {
            Some(count) => self.warmup(count).await,
            None => Ok(0),
        }
    }
}

impl<T> Pool<T> {
    fn state(&self) -> MutexGuard<'_, PoolState<T>> {
        self.inner.state.lock()
    }

    /// Pool name from the configuration
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Maximum number of active items
    pub fn limit(&self) -> usize {
        self.inner.config.limit
    }

    /// Items currently not idle: on loan or being built
    pub fn active_count(&self) -> usize {
        self.state().active
    }

    /// Items parked in the pool awaiting reuse
    pub fn idle_count(&self) -> usize {
        self.state().idle.len()
    }

    /// Borrowers currently queued for an item
    pub fn waiting_count(&self) -> usize {
        self.state().live_waiters()
    }

    /// Items currently held by callers
    pub fn on_loan_count(&self) -> usize {
        self.inner.on_loan.len()
    }

    /// Whether `item` is currently on loan from this pool
    pub fn is_on_loan(&self, item: &Arc<T>) -> bool {
        self.inner.on_loan.contains_key(&item_key(item))
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let (active, idle, waiting) = {
            let state = self.state();
            (state.active, state.idle.len(), state.live_waiters())
        };
        self.inner.metrics.get_metrics(active, idle, waiting, self.limit())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format, labelled with the pool name
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        MetricsExporter::export_prometheus(&self.get_metrics(), self.name(), tags)
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Pool")
            .field("name", &self.inner.config.name)
            .field("limit", &self.inner.config.limit)
            .field("active", &state.active)
            .field("idle", &state.idle.len())
            .field("waiting", &state.live_waiters())
            .finish()
    }
}
