use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, OwnedMutexGuard};

use logistiga_numbering::{CounterData, DocumentFamily, DocumentNumber, Prefix};

use super::r#trait::{CounterTransaction, NumberingError, NumberingStore};

/// Default bound on how long `begin` waits for the counter lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredDocument {
    numero: String,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Records {
    counters: HashMap<String, JsonValue>,
    documents: HashMap<DocumentFamily, Vec<StoredDocument>>,
}

/// In-memory numbering store.
///
/// Intended for tests/dev. A single async mutex plays the role of the row
/// lock, so every counter key is serialized behind it.
#[derive(Debug, Clone)]
pub struct InMemoryNumberingStore {
    records: Arc<Mutex<Records>>,
    available: Arc<AtomicBool>,
    lock_timeout: Duration,
}

impl Default for InMemoryNumberingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNumberingStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Records::default())),
            available: Arc::new(AtomicBool::new(true)),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Register a live document carrying `numero`.
    pub async fn record_document(&self, family: DocumentFamily, numero: impl Into<String>) {
        self.push_document(family, numero.into(), false).await;
    }

    /// Register a soft-deleted document; its number stays reserved.
    pub async fn record_deleted_document(&self, family: DocumentFamily, numero: impl Into<String>) {
        self.push_document(family, numero.into(), true).await;
    }

    /// Numbers of the documents of `family` that are not soft-deleted.
    pub async fn live_documents(&self, family: DocumentFamily) -> Vec<String> {
        self.records
            .lock()
            .await
            .documents
            .get(&family)
            .into_iter()
            .flatten()
            .filter(|doc| !doc.deleted)
            .map(|doc| doc.numero.clone())
            .collect()
    }

    /// Overwrite the raw payload of a counter record.
    pub async fn seed_counter(&self, key: impl Into<String>, data: JsonValue) {
        self.records.lock().await.counters.insert(key.into(), data);
    }

    /// Raw payload of a counter record, if it exists.
    pub async fn counter_payload(&self, key: &str) -> Option<JsonValue> {
        self.records.lock().await.counters.get(key).cloned()
    }

    async fn push_document(&self, family: DocumentFamily, numero: String, deleted: bool) {
        self.records
            .lock()
            .await
            .documents
            .entry(family)
            .or_default()
            .push(StoredDocument { numero, deleted });
    }

    fn ensure_available(&self, operation: &str) -> Result<(), NumberingError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NumberingError::StorageUnavailable(format!(
                "in-memory store offline during {operation}"
            )))
        }
    }
}

#[async_trait::async_trait]
impl NumberingStore for InMemoryNumberingStore {
    async fn begin(&self, key: &str) -> Result<Box<dyn CounterTransaction>, NumberingError> {
        self.ensure_available("begin_transaction")?;

        let guard = tokio::time::timeout(self.lock_timeout, self.records.clone().lock_owned())
            .await
            .map_err(|_| {
                NumberingError::LockTimeout(format!(
                    "counter '{key}' still locked after {:?}",
                    self.lock_timeout
                ))
            })?;

        // Lazily created records only become visible on commit.
        let existing = guard.counters.get(key).cloned();
        let created = existing.is_none();
        let staged = existing.unwrap_or_else(|| CounterData::default().to_json());

        Ok(Box::new(InMemoryCounterTransaction {
            guard,
            key: key.to_string(),
            staged,
            created,
            store: self.clone(),
        }))
    }
}

struct InMemoryCounterTransaction {
    guard: OwnedMutexGuard<Records>,
    key: String,
    staged: JsonValue,
    created: bool,
    store: InMemoryNumberingStore,
}

#[async_trait::async_trait]
impl CounterTransaction for InMemoryCounterTransaction {
    fn created(&self) -> bool {
        self.created
    }

    async fn counter(&mut self) -> Result<CounterData, NumberingError> {
        CounterData::from_json(&self.staged)
            .map_err(|e| NumberingError::CorruptCounter(format!("{}: {}", self.key, e.detail())))
    }

    async fn max_sequence(
        &mut self,
        family: DocumentFamily,
        prefix: &Prefix,
        year: i32,
    ) -> Result<Option<u32>, NumberingError> {
        self.store.ensure_available("max_sequence")?;

        let max = self
            .guard
            .documents
            .get(&family)
            .into_iter()
            .flatten()
            .filter_map(|doc| doc.numero.parse::<DocumentNumber>().ok())
            .filter(|n| n.belongs_to(prefix, year))
            .map(|n| n.sequence())
            .max();

        Ok(max)
    }

    async fn number_exists(
        &mut self,
        family: DocumentFamily,
        number: &DocumentNumber,
    ) -> Result<bool, NumberingError> {
        self.store.ensure_available("number_exists")?;

        let numero = number.to_string();
        Ok(self
            .guard
            .documents
            .get(&family)
            .is_some_and(|docs| docs.iter().any(|doc| doc.numero == numero)))
    }

    async fn save_counter(&mut self, data: &CounterData) -> Result<(), NumberingError> {
        self.store.ensure_available("save_counter")?;
        self.staged = data.to_json();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), NumberingError> {
        self.store.ensure_available("commit_transaction")?;

        let this = *self;
        let mut guard = this.guard;
        guard.counters.insert(this.key, this.staged);
        Ok(())
    }
}
