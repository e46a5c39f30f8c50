use super::{Connect, CounterRecord, KvStore, StoreError};
use crate::config::TableConfig;
use std::collections::HashMap;
use std::time::Duration;

/// In-process [`KvStore`] with the semantics of the DynamoDB backend.
///
/// Every operation holds the lock for its whole duration, which makes each
/// request atomic. Intended for tests and local runs; failures and latency
/// can be injected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: tokio::sync::Mutex<HashMap<String, i64>>,
    next_failure: tokio::sync::Mutex<Option<StoreError>>,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every request by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next request fail with `err`
    pub async fn fail_next(&self, err: StoreError) {
        *self.next_failure.lock().await = Some(err);
    }

    /// Current counter value of `key`, `None` if the record is missing
    pub async fn value(&self, key: &str) -> Option<i64> {
        self.records.lock().await.get(key).copied()
    }

    /// Snapshot of all records, sorted by key
    pub async fn records(&self) -> Vec<CounterRecord> {
        let mut records: Vec<CounterRecord> = self
            .records
            .lock()
            .await
            .iter()
            .map(|(key, value)| CounterRecord {
                key: key.clone(),
                value: *value,
            })
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Overwrites the counter value of `key`
    pub async fn put(&self, key: &str, value: i64) {
        let _ = self.records.lock().await.insert(key.to_owned(), value);
    }

    async fn prepare(&self) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.next_failure.lock().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn insert_if_absent(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.prepare().await?;
        let mut records = self.records.lock().await;
        if records.contains_key(key) {
            return Err(StoreError::ConditionFailed);
        }
        let _ = records.insert(key.to_owned(), value);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, default: i64) -> Result<i64, StoreError> {
        self.prepare().await?;
        let mut records = self.records.lock().await;
        Ok(*records.entry(key.to_owned()).or_insert(default))
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.prepare().await?;
        let mut records = self.records.lock().await;
        match records.get_mut(key) {
            Some(value) => {
                *value = value.checked_add(delta).ok_or_else(|| {
                    StoreError::Unexpected(format!("Counter {} overflowed", key))
                })?;
                Ok(*value)
            }
            None => Err(StoreError::Unexpected(format!(
                "Counter {} has no value to update",
                key
            ))),
        }
    }
}

#[async_trait::async_trait]
impl Connect for MemoryStore {
    async fn connect(table: &TableConfig, _region: &str) -> anyhow::Result<Self> {
        log::info!("Using in-memory store for table {}", table.name);
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::{KvStore, MemoryStore, StoreError};

    #[tokio::test]
    async fn insert_fails_for_existing_record() {
        let store = MemoryStore::new();
        assert_eq!(store.insert_if_absent("a", 0).await, Ok(()));
        assert_eq!(
            store.insert_if_absent("a", 0).await,
            Err(StoreError::ConditionFailed)
        );
    }

    #[tokio::test]
    async fn set_if_absent_keeps_existing_value() {
        let store = MemoryStore::new();
        store.put("a", 7).await;
        assert_eq!(store.set_if_absent("a", 0).await, Ok(7));
        assert_eq!(store.set_if_absent("b", 0).await, Ok(0));
    }

    #[tokio::test]
    async fn add_requires_a_value() {
        let store = MemoryStore::new();
        assert!(store.add("a", 1).await.is_err());
        store.put("a", i64::MAX).await;
        assert!(store.add("a", 1).await.is_err());
        assert_eq!(store.value("a").await, Some(i64::MAX));
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreError::Unavailable("down".into())).await;
        assert!(store.set_if_absent("a", 0).await.is_err());
        assert_eq!(store.set_if_absent("a", 0).await, Ok(0));
    }
}
