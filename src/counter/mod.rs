//! Race-safe counter records on top of an atomic key-value store.
//!
//! # Usage
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use lambda_visit_counter::counter::{CounterStore, InitOutcome, MemoryStore};
//! use std::time::Duration;
//!
//! let counter = CounterStore::new(MemoryStore::new(), Duration::from_secs(1));
//! assert_eq!(counter.ensure_initialized("site").await?, InitOutcome::Created);
//! assert_eq!(counter.increment("site").await?, 1);
//! assert_eq!(counter.decrement("site").await?, 0);
//! # Ok(())
//! # }
//! ```
//!
//! All mutations are forwarded as single atomic requests to the [`KvStore`].
//! [`CounterStore`] keeps no state besides the store handle, so it can be
//! shared freely between concurrent invocations.

mod memory;
mod store;

#[cfg(feature = "store_aws_sdk")]
#[cfg_attr(docsrs, doc(cfg(feature = "store_aws_sdk")))]
mod aws_sdk;
#[cfg(feature = "store_rusoto")]
#[cfg_attr(docsrs, doc(cfg(feature = "store_rusoto")))]
mod rusoto;

#[cfg(feature = "store_aws_sdk")]
pub use aws_sdk::DynamoDbStore;
pub use memory::MemoryStore;
#[cfg(feature = "store_rusoto")]
pub use rusoto::RusotoDynamoDbStore;
pub use store::{KvStore, StoreError};

use crate::config::TableConfig;
use std::time::Duration;

/// Value a counter starts with
pub const INITIAL_VALUE: i64 = 0;

/// A counter record as stored in the table
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CounterRecord {
    /// Identifier of the tracked entity
    pub key: String,
    /// Current counter value
    pub value: i64,
}

/// Successful outcomes of [`CounterStore::ensure_initialized`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// The record was created by this call
    Created,
    /// The record existed before, nothing was written
    AlreadyExists,
}

/// Builds a store for a table. Invoked once per lambda execution environment.
#[async_trait::async_trait]
pub trait Connect: KvStore + Sized {
    /// Connects to `table` in `region`
    async fn connect(table: &TableConfig, region: &str) -> anyhow::Result<Self>;
}

/// Counter operations on top of a [`KvStore`]
#[derive(Debug, Clone)]
pub struct CounterStore<S> {
    store: S,
    timeout: Duration,
}

impl<S: KvStore> CounterStore<S> {
    /// Creates a new counter store. Each store request is bounded by `timeout`.
    pub const fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Underlying key-value store
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Creates the record `key` with the initial value `0`, unless it
    /// already exists. An existing value is never overwritten.
    pub async fn ensure_initialized(&self, key: &str) -> Result<InitOutcome, StoreError> {
        self.ensure_initialized_within(key, self.timeout).await
    }

    /// Same as [`CounterStore::ensure_initialized`], but fails with
    /// [`StoreError::Timeout`] after `budget` if that is shorter than the
    /// configured timeout.
    pub async fn ensure_initialized_within(
        &self,
        key: &str,
        budget: Duration,
    ) -> Result<InitOutcome, StoreError> {
        let limit = budget.min(self.timeout);
        match Self::bounded(limit, self.store.insert_if_absent(key, INITIAL_VALUE)).await {
            Ok(()) => {
                log::info!("Created counter record {}", key);
                Ok(InitOutcome::Created)
            }
            Err(StoreError::ConditionFailed) => {
                log::info!("Counter record {} already exists", key);
                Ok(InitOutcome::AlreadyExists)
            }
            Err(err) => {
                log::error!("Unable to initialize counter record {}: {}", key, err);
                Err(err)
            }
        }
    }

    /// Adds one to the counter of `key` and returns the new value.
    /// A missing value is treated as `0`.
    pub async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let value = self
            .bounded_by_timeout(self.store.add_with_default(key, INITIAL_VALUE, 1))
            .await
            .map_err(|err| {
                log::error!("Unable to increment counter {}: {}", key, err);
                err
            })?;
        log::info!("Counter {} incremented to {}", key, value);
        Ok(value)
    }

    /// Subtracts one from the counter of `key` and returns the new value.
    ///
    /// Unlike [`CounterStore::increment`] this does not initialize a missing
    /// value; decrementing a counter without value fails.
    pub async fn decrement(&self, key: &str) -> Result<i64, StoreError> {
        let value = self
            .bounded_by_timeout(self.store.add(key, -1))
            .await
            .map_err(|err| {
                log::error!("Unable to decrement counter {}: {}", key, err);
                err
            })?;
        log::info!("Counter {} decremented to {}", key, value);
        Ok(value)
    }

    async fn bounded_by_timeout<T, F>(&self, request: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>> + Send,
    {
        Self::bounded(self.timeout, request).await
    }

    async fn bounded<T, F>(limit: Duration, request: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>> + Send,
    {
        tokio::time::timeout(limit, request)
            .await
            .map_err(|_| StoreError::Timeout(limit))?
    }
}
