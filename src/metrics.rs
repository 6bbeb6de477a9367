//! Metrics collection and export for lazy pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use crate::errors::{PoolError, PoolResult};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_lazypool::Pool;
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = Pool::<u64>::new(2, |seq: u64| async move {
///     Ok::<_, std::io::Error>(seq)
/// })
/// .unwrap();
///
/// let item = pool.borrow().await.unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_constructed, 1);
/// assert_eq!(metrics.active_items, 1);
///
/// pool.give_back(item);
/// assert_eq!(pool.get_metrics().idle_items, 1);
/// # }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total successful borrows
    pub total_borrowed: usize,

    /// Total accepted returns, hand-offs included
    pub total_returned: usize,

    /// Returns passed straight to a waiting borrower
    pub total_handoffs: usize,

    /// Items built by the factory
    pub total_constructed: usize,

    /// Factory invocations that failed
    pub construction_failures: usize,

    /// Returns rejected because the item was not on loan
    pub invalid_returns: usize,

    /// Current active (non-idle) items
    pub active_items: usize,

    /// Current idle items
    pub idle_items: usize,

    /// Borrowers currently queued
    pub waiting_borrowers: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Active item limit
    pub limit: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_handoffs".to_string(), self.total_handoffs.to_string());
        metrics.insert("total_constructed".to_string(), self.total_constructed.to_string());
        metrics.insert("construction_failures".to_string(), self.construction_failures.to_string());
        metrics.insert("invalid_returns".to_string(), self.invalid_returns.to_string());
        metrics.insert("active_items".to_string(), self.active_items.to_string());
        metrics.insert("idle_items".to_string(), self.idle_items.to_string());
        metrics.insert("waiting_borrowers".to_string(), self.waiting_borrowers.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("limit".to_string(), self.limit.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus any extra `tags`. Tag names
    /// must be valid Prometheus label names.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_lazypool::{MetricsExporter, Pool};
    /// use std::collections::HashMap;
    ///
    /// let pool = Pool::<u64>::new(3, |seq: u64| async move {
    ///     Ok::<_, std::io::Error>(seq)
    /// })
    /// .unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let metrics = pool.get_metrics();
    /// let output = MetricsExporter::export_prometheus(&metrics, "my_pool", Some(&tags)).unwrap();
    /// assert!(output.contains("lazypool_items_active"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let registry = Registry::new();
        let labels = Self::format_labels(pool_name, tags);
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        // Gauge metrics
        let gauges = [
            ("lazypool_items_active", "Current active items", metrics.active_items),
            ("lazypool_items_idle", "Current idle items", metrics.idle_items),
            ("lazypool_borrowers_waiting", "Borrowers currently queued", metrics.waiting_borrowers),
            ("lazypool_limit", "Active item limit", metrics.limit),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(opts(name, help)).map_err(Self::export_error)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(Self::export_error)?;
        }

        let utilization = Gauge::with_opts(opts("lazypool_utilization", "Pool utilization ratio"))
            .map_err(Self::export_error)?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization)).map_err(Self::export_error)?;

        // Counter metrics
        let counters = [
            ("lazypool_borrows_total", "Total successful borrows", metrics.total_borrowed),
            ("lazypool_returns_total", "Total accepted returns", metrics.total_returned),
            (
                "lazypool_handoffs_total",
                "Returns handed to a waiting borrower",
                metrics.total_handoffs,
            ),
            (
                "lazypool_constructions_total",
                "Items built by the factory",
                metrics.total_constructed,
            ),
            (
                "lazypool_construction_failures_total",
                "Failed factory invocations",
                metrics.construction_failures,
            ),
            ("lazypool_invalid_returns_total", "Rejected returns", metrics.invalid_returns),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help)).map_err(Self::export_error)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter)).map_err(Self::export_error)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(Self::export_error)?;
        String::from_utf8(buffer).map_err(|e| PoolError::MetricsExport(e.to_string()))
    }

    fn format_labels(
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        labels
    }

    fn export_error(err: prometheus::Error) -> PoolError {
        PoolError::MetricsExport(err.to_string())
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_borrowed: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub total_handoffs: AtomicUsize,
    pub total_constructed: AtomicUsize,
    pub construction_failures: AtomicUsize,
    pub invalid_returns: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retract(counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get_metrics(
        &self,
        active: usize,
        idle: usize,
        waiting: usize,
        limit: usize,
    ) -> PoolMetrics {
        let utilization = if limit > 0 {
            active as f64 / limit as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_borrowed: self.total_borrowed.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_handoffs: self.total_handoffs.load(Ordering::Relaxed),
            total_constructed: self.total_constructed.load(Ordering::Relaxed),
            construction_failures: self.construction_failures.load(Ordering::Relaxed),
            invalid_returns: self.invalid_returns.load(Ordering::Relaxed),
            active_items: active,
            idle_items: idle,
            waiting_borrowers: waiting,
            utilization,
            limit,
        }
    }
}
