use std::sync::Arc;

use thiserror::Error;

use logistiga_core::DomainError;
use logistiga_numbering::{CounterData, DocumentFamily, DocumentNumber, Prefix};

/// Numbering operation error.
///
/// `StorageUnavailable` and `LockTimeout` are **infrastructure** failures; the
/// allocation committed nothing and the caller may retry the whole operation.
/// The remaining variants are deterministic and will fail again on retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NumberingError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("counter lock not acquired in time: {0}")]
    LockTimeout(String),

    #[error("sequence range exhausted for {family} {year}")]
    SequenceExhausted { family: DocumentFamily, year: i32 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("corrupt counter record: {0}")]
    CorruptCounter(String),
}

impl NumberingError {
    /// True for failures where retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::LockTimeout(_))
    }
}

impl From<DomainError> for NumberingError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.detail().to_string())
    }
}

/// Open transaction holding the exclusive lock on one counter record.
///
/// Dropping the transaction without calling `commit` rolls it back and
/// releases the lock.
#[async_trait::async_trait]
pub trait CounterTransaction: Send {
    /// True when `begin` had to create the counter record with defaults.
    fn created(&self) -> bool;

    /// Current counter payload (as staged in this transaction).
    async fn counter(&mut self) -> Result<CounterData, NumberingError>;

    /// Highest sequence among stored documents of `family` numbered under
    /// `prefix`/`year`, soft-deleted documents included.
    async fn max_sequence(
        &mut self,
        family: DocumentFamily,
        prefix: &Prefix,
        year: i32,
    ) -> Result<Option<u32>, NumberingError>;

    /// Whether a stored document of `family` already carries exactly `number`.
    async fn number_exists(
        &mut self,
        family: DocumentFamily,
        number: &DocumentNumber,
    ) -> Result<bool, NumberingError>;

    /// Stage a new counter payload; visible to others only after `commit`.
    async fn save_counter(&mut self, data: &CounterData) -> Result<(), NumberingError>;

    async fn commit(self: Box<Self>) -> Result<(), NumberingError>;
}

/// Storage backing the numbering counters.
///
/// Implementations must:
/// - create the counter record with defaults when `begin` finds none
/// - hold an exclusive lock on the record for the transaction's lifetime
/// - give up with `LockTimeout` when the lock cannot be taken in time
/// - commit all staged writes atomically, or none of them
#[async_trait::async_trait]
pub trait NumberingStore: Send + Sync {
    async fn begin(&self, key: &str) -> Result<Box<dyn CounterTransaction>, NumberingError>;
}

#[async_trait::async_trait]
impl<S> NumberingStore for Arc<S>
where
    S: NumberingStore + ?Sized,
{
    async fn begin(&self, key: &str) -> Result<Box<dyn CounterTransaction>, NumberingError> {
        (**self).begin(key).await
    }
}
