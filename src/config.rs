//! Pool configuration options

use crate::errors::{PoolError, PoolResult};

/// Configuration for lazy pool behavior
///
/// # Examples
///
/// ```
/// use esox_lazypool::PoolConfiguration;
///
/// let config = PoolConfiguration::new()
///     .with_limit(4)
///     .with_name("db")
///     .with_warmup(2);
///
/// assert_eq!(config.limit, 4);
/// assert_eq!(config.name, "db");
/// assert_eq!(config.warmup_size, Some(2));
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration {
    /// Maximum number of items that may be active (not idle) at once
    pub limit: usize,

    /// Name used in log events and as the Prometheus `pool` label
    pub name: String,

    /// Number of items to build eagerly when `Pool::warmup_configured` runs
    pub warmup_size: Option<usize>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            limit: 10,
            name: "pool".to_string(),
            warmup_size: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active item limit
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_lazypool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_limit(3);
    /// assert_eq!(config.limit, 3);
    /// ```
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set warm-up size
    pub fn with_warmup(mut self, size: usize) -> Self {
        self.warmup_size = Some(size);
        self
    }

    /// Check the configuration before a pool is built from it.
    ///
    /// A limit of zero would make every borrow queue forever, so it is
    /// rejected.
    pub fn validate(&self) -> PoolResult<()> {
        if self.limit == 0 {
            return Err(PoolError::InvalidLimit);
        }
        Ok(())
    }
}
