//! Usage counter storage.
//!
//! The statistics handler talks to an external atomic key-value store through
//! [`CounterStore`]. The store is shared by every worker serving requests, so
//! [`CounterStore::increment`] must be atomic; everything else may be a plain
//! read or write.
//!
//! - [`keys`]: key layout (namespace prefix, client, function, hour bucket)
//! - [`clock`]: injectable wall clock for bucket labels and expiry
//! - [`memory`]: in-process `DashMap` backend
//! - [`sweeper`]: background purge of expired entries

pub mod clock;
pub mod keys;
pub mod memory;
pub mod sweeper;

#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use keys::KeySpace;
pub use memory::MemoryCounterStore;
pub use sweeper::{BackgroundRunnable, BackgroundWorker, ExpirySweep, SweepTask};

/// A value held by the counter store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    Counter(u64),
    List(Vec<String>),
}

impl StoreValue {
    #[must_use]
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            Self::Counter(n) => Some(*n),
            Self::List(_) => None,
        }
    }

    #[must_use]
    pub fn into_list(self) -> Option<Vec<String>> {
        match self {
            Self::List(items) => Some(items),
            Self::Counter(_) => None,
        }
    }
}

/// Errors from a counter store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    #[error("value at '{key}' is not a {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Protocol of the external counter store.
///
/// Expiry is an absolute Unix timestamp in seconds. Reads of expired keys
/// behave as if the key were absent.
pub trait CounterStore: Send + Sync {
    /// Reads `key`, returning `None` when absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the backend cannot be reached.
    fn get(&self, key: &str) -> Result<Option<StoreValue>, StoreError>;

    /// Writes `key` with no expiry, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the backend cannot be reached.
    fn set(&self, key: &str, value: StoreValue) -> Result<(), StoreError>;

    /// Deletes `key`. Returns `true` if a live value was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the backend cannot be reached.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically adds `step` to the counter at `key` and returns the new
    /// value. An absent key starts at `initial` (and takes `expires_at`)
    /// before the step is applied, so no two concurrent callers can both
    /// observe it as missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WrongType`] if `key` holds a list, or
    /// [`StoreError::Unavailable`] when the backend cannot be reached.
    fn increment(
        &self,
        key: &str,
        step: u64,
        initial: u64,
        expires_at: Option<i64>,
    ) -> Result<u64, StoreError>;
}
