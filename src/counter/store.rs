use std::time::Duration;

/// Errors reported by a [`KvStore`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The precondition of a conditional write did not hold.
    /// For [`KvStore::insert_if_absent`] this means the record already exists.
    #[error("Conditional check failed")]
    ConditionFailed,
    /// The store could not serve the request right now (throttling,
    /// connection failures, internal server errors)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// The store did not answer within the configured timeout
    #[error("Store request timed out after {0:?}")]
    Timeout(Duration),
    /// Any other store error
    #[error("Unexpected store error: {0}")]
    Unexpected(String),
}

impl StoreError {
    /// Whether retrying the same request later may succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Atomic single-key primitives of the external key-value store.
///
/// Every method must be a single atomic request against the store.
/// Implementations must never read a value and write it back.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Inserts a record `key` with `value`. Fails with
    /// [`StoreError::ConditionFailed`] if the record already exists.
    async fn insert_if_absent(&self, key: &str, value: i64) -> Result<(), StoreError>;

    /// Sets the counter of `key` to `default` if it has no value yet and
    /// returns the stored value.
    async fn set_if_absent(&self, key: &str, default: i64) -> Result<i64, StoreError>;

    /// Adds `delta` to the counter of `key` and returns the new value.
    /// Fails if the counter has no value.
    async fn add(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Adds `delta` to the counter of `key`, treating a missing value as
    /// `default`, and returns the new value.
    ///
    /// Stores which support this in one request should override it. The
    /// default falls back to [`KvStore::set_if_absent`] followed by
    /// [`KvStore::add`].
    async fn add_with_default(
        &self,
        key: &str,
        default: i64,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let _ = self.set_if_absent(key, default).await?;
        self.add(key, delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::StoreError;
    use std::time::Duration;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(StoreError::Unavailable("throttled".into()).is_retryable());
        assert!(StoreError::Timeout(Duration::from_millis(10)).is_retryable());
        assert!(!StoreError::ConditionFailed.is_retryable());
        assert!(!StoreError::Unexpected("validation".into()).is_retryable());
    }
}
