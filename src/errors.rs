//! Error types for the lazy pool

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by an item factory
pub type FactoryError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Pool limit must be at least 1")]
    InvalidLimit,

    #[error("Failed to construct item #{sequence}: {source}")]
    Construction {
        sequence: u64,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    /// A queued borrow's channel closed before a grant arrived. The pool
    /// outlives every borrow, so this indicates a bug in the pool itself.
    #[error("Waiter channel closed before the borrow was granted")]
    Closed,

    #[error("Failed to export metrics: {0}")]
    MetricsExport(String),
}

impl PoolError {
    pub(crate) fn construction(sequence: u64, source: FactoryError) -> Self {
        PoolError::Construction {
            sequence,
            source: Arc::from(source),
        }
    }

    /// Whether this error came from the item factory
    pub fn is_construction(&self) -> bool {
        matches!(self, PoolError::Construction { .. })
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
