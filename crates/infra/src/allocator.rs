//! Sequential document-number allocation.
//!
//! `SequentialNumberAllocator` is the only writer of the numbering counter.
//! Every operation runs inside one `CounterTransaction`, so concurrent
//! allocators for the same counter key are serialized by the store's lock and
//! observe each other's committed counters.
//!
//! ## Drift recovery
//!
//! The stored `prochain_numero` is a lower bound only. Each allocation lifts the
//! candidate above the highest sequence already present among stored documents
//! of the same prefix/year, then skips any exact collision, so a counter
//! edited out of band never hands out a number twice.

use chrono::{Datelike, Utc};
use tracing::{info, instrument, warn};

use logistiga_numbering::number::validate_year;
use logistiga_numbering::{
    CounterData, DocumentFamily, DocumentNumber, FamilyCounter, Prefix, following,
    starting_candidate,
};

use crate::numbering::{CounterTransaction, NumberingError, NumberingStore};

/// Key of the counter record used when none is configured.
pub const DEFAULT_COUNTER_KEY: &str = "numerotation";

/// Change to one family's numbering settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterUpdate {
    pub prefix: Option<Prefix>,
    pub next_sequence: Option<u32>,
}

/// Allocates unique, human-readable document numbers.
#[derive(Debug, Clone)]
pub struct SequentialNumberAllocator<S> {
    store: S,
    counter_key: String,
}

impl<S> SequentialNumberAllocator<S>
where
    S: NumberingStore,
{
    pub fn new(store: S) -> Self {
        Self::with_counter_key(store, DEFAULT_COUNTER_KEY)
    }

    pub fn with_counter_key(store: S, counter_key: impl Into<String>) -> Self {
        Self {
            store,
            counter_key: counter_key.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn counter_key(&self) -> &str {
        &self.counter_key
    }

    /// Allocate the next number of `family` for `year` (current UTC year when `None`).
    ///
    /// Advances the family's stored counter to `sequence + 1`. Nothing is
    /// persisted when this returns an error.
    #[instrument(skip(self), fields(counter_key = %self.counter_key), err)]
    pub async fn allocate(
        &self,
        family: DocumentFamily,
        year: Option<i32>,
    ) -> Result<DocumentNumber, NumberingError> {
        let year = resolve_year(year)?;

        let mut tx = self.store.begin(&self.counter_key).await?;
        let mut data = tx.counter().await?;

        let number = next_free_number(&mut *tx, &data, family, year).await?;
        let next = following(number.sequence())
            .ok_or(NumberingError::SequenceExhausted { family, year })?;

        let advanced = data.family(family).with_next_sequence(next)?;
        data.set_family(family, advanced);

        tx.save_counter(&data).await?;
        tx.commit().await?;

        info!(numero = %number, next_sequence = next, "document number allocated");
        Ok(number)
    }

    /// Number `allocate` would return right now. The counter is not advanced.
    #[instrument(skip(self), fields(counter_key = %self.counter_key), err)]
    pub async fn preview(
        &self,
        family: DocumentFamily,
        year: Option<i32>,
    ) -> Result<DocumentNumber, NumberingError> {
        let year = resolve_year(year)?;

        let mut tx = self.store.begin(&self.counter_key).await?;
        let data = tx.counter().await?;
        // Dropping `tx` rolls back and releases the lock.
        next_free_number(&mut *tx, &data, family, year).await
    }

    /// Current numbering settings, creating the counter record if needed.
    ///
    /// An existing record is only read; the transaction is rolled back.
    #[instrument(skip(self), fields(counter_key = %self.counter_key), err)]
    pub async fn settings(&self) -> Result<CounterData, NumberingError> {
        let mut tx = self.store.begin(&self.counter_key).await?;
        let data = tx.counter().await?;
        if tx.created() {
            tx.save_counter(&data).await?;
            tx.commit().await?;
        }
        Ok(data)
    }

    /// Change the prefix and/or next sequence of one family.
    ///
    /// The next sequence may only move forward.
    #[instrument(skip(self), fields(counter_key = %self.counter_key), err)]
    pub async fn configure(
        &self,
        family: DocumentFamily,
        update: CounterUpdate,
    ) -> Result<CounterData, NumberingError> {
        let mut tx = self.store.begin(&self.counter_key).await?;
        let mut data = tx.counter().await?;

        let mut counter: FamilyCounter = data.family(family).clone();
        if let Some(prefix) = update.prefix {
            counter = counter.with_prefix(prefix);
        }
        if let Some(next_sequence) = update.next_sequence {
            counter = counter.with_next_sequence(next_sequence)?;
        }
        data.set_family(family, counter);

        tx.save_counter(&data).await?;
        tx.commit().await?;

        let counter = data.family(family);
        info!(
            prefix = %counter.prefix(),
            next_sequence = counter.next_sequence(),
            "numbering settings updated"
        );
        Ok(data)
    }
}

fn resolve_year(year: Option<i32>) -> Result<i32, NumberingError> {
    let year = year.unwrap_or_else(|| Utc::now().year());
    validate_year(year)?;
    Ok(year)
}

/// First free number for `family`/`year`, starting from the stored counter.
async fn next_free_number(
    tx: &mut dyn CounterTransaction,
    data: &CounterData,
    family: DocumentFamily,
    year: i32,
) -> Result<DocumentNumber, NumberingError> {
    let counter = data.family(family);
    let existing_max = tx.max_sequence(family, counter.prefix(), year).await?;

    let mut candidate = starting_candidate(counter.next_sequence(), existing_max)
        .ok_or(NumberingError::SequenceExhausted { family, year })?;

    if existing_max.is_some_and(|max| max >= counter.next_sequence()) {
        warn!(
            stored_next = counter.next_sequence(),
            existing_max = ?existing_max,
            "counter behind stored documents; lifting candidate"
        );
    }

    loop {
        let number = DocumentNumber::new(counter.prefix().clone(), year, candidate)?;
        if !tx.number_exists(family, &number).await? {
            return Ok(number);
        }
        warn!(numero = %number, "document number already taken; skipping");
        candidate = following(candidate).ok_or(NumberingError::SequenceExhausted { family, year })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numbering::InMemoryNumberingStore;
    use serde_json::json;

    fn allocator() -> SequentialNumberAllocator<InMemoryNumberingStore> {
        SequentialNumberAllocator::new(InMemoryNumberingStore::new())
    }

    #[tokio::test]
    async fn first_allocation_creates_counter_with_defaults() {
        let allocator = allocator();

        let first = allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        assert_eq!(first.to_string(), "DEV-2025-0001");

        let payload = allocator.store().counter_payload("numerotation").await.unwrap();
        assert_eq!(payload["prochain_numero_devis"], json!(2));
        assert_eq!(payload["prefixe_devis"], json!("DEV"));

        let second = allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        assert_eq!(second.to_string(), "DEV-2025-0002");
    }

    #[tokio::test]
    async fn families_share_the_record_but_not_the_sequence() {
        let allocator = allocator();

        allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        let invoice = allocator.allocate(DocumentFamily::Facture, Some(2025)).await.unwrap();

        assert_eq!(invoice.to_string(), "FAC-2025-0001");
    }

    #[tokio::test]
    async fn missing_year_defaults_to_current_year() {
        let allocator = allocator();
        let number = allocator.allocate(DocumentFamily::Ordre, None).await.unwrap();
        assert_eq!(number.year(), Utc::now().year());
        assert_eq!(number.prefix().as_str(), "OT");
    }

    #[tokio::test]
    async fn out_of_range_year_is_rejected() {
        let allocator = allocator();
        let err = allocator.allocate(DocumentFamily::Devis, Some(99)).await.unwrap_err();
        assert!(matches!(err, NumberingError::Validation(_)));
        assert_eq!(allocator.store().counter_payload("numerotation").await, None);
    }

    #[tokio::test]
    async fn drifted_counter_recovers_above_existing_documents() {
        let allocator = allocator();
        allocator
            .store()
            .seed_counter("numerotation", json!({"prochain_numero_facture": 10}))
            .await;
        allocator
            .store()
            .record_document(DocumentFamily::Facture, "FAC-2025-0042")
            .await;

        let number = allocator.allocate(DocumentFamily::Facture, Some(2025)).await.unwrap();
        assert_eq!(number.sequence(), 43);

        let payload = allocator.store().counter_payload("numerotation").await.unwrap();
        assert_eq!(payload["prochain_numero_facture"], json!(44));
    }

    #[tokio::test]
    async fn preview_does_not_advance_the_counter() {
        let allocator = allocator();

        let preview = allocator.preview(DocumentFamily::Avoir, Some(2025)).await.unwrap();
        let allocated = allocator.allocate(DocumentFamily::Avoir, Some(2025)).await.unwrap();
        assert_eq!(preview, allocated);

        let preview = allocator.preview(DocumentFamily::Avoir, Some(2025)).await.unwrap();
        assert_eq!(preview.to_string(), "AV-2025-0002");
        let payload = allocator.store().counter_payload("numerotation").await.unwrap();
        assert_eq!(payload["prochain_numero_avoir"], json!(2));
    }

    #[tokio::test]
    async fn configure_changes_prefix_and_moves_counter_forward() {
        let allocator = allocator();

        let data = allocator
            .configure(
                DocumentFamily::Facture,
                CounterUpdate {
                    prefix: Some(Prefix::new("FA").unwrap()),
                    next_sequence: Some(100),
                },
            )
            .await
            .unwrap();
        assert_eq!(data.family(DocumentFamily::Facture).next_sequence(), 100);

        let number = allocator.allocate(DocumentFamily::Facture, Some(2025)).await.unwrap();
        assert_eq!(number.to_string(), "FA-2025-0100");
    }

    #[tokio::test]
    async fn configure_refuses_to_move_counter_backwards() {
        let allocator = allocator();
        allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();

        let err = allocator
            .configure(
                DocumentFamily::Devis,
                CounterUpdate {
                    prefix: None,
                    next_sequence: Some(1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NumberingError::Validation(_)));

        let settings = allocator.settings().await.unwrap();
        assert_eq!(settings.family(DocumentFamily::Devis).next_sequence(), 3);
    }

    #[tokio::test]
    async fn settings_creates_the_record_lazily() {
        let allocator = SequentialNumberAllocator::with_counter_key(
            InMemoryNumberingStore::new(),
            "numerotation_test",
        );

        let settings = allocator.settings().await.unwrap();
        assert_eq!(settings, CounterData::default());
        assert!(
            allocator
                .store()
                .counter_payload("numerotation_test")
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn settings_leaves_an_existing_record_untouched() {
        let allocator = allocator();
        allocator
            .store()
            .seed_counter(
                "numerotation",
                json!({"prochain_numero_devis": "7", "devise": "XAF"}),
            )
            .await;

        let settings = allocator.settings().await.unwrap();
        assert_eq!(settings.family(DocumentFamily::Devis).next_sequence(), 7);

        // A write would have normalized the legacy string to a number.
        let payload = allocator.store().counter_payload("numerotation").await.unwrap();
        assert_eq!(payload, json!({"prochain_numero_devis": "7", "devise": "XAF"}));
    }

    #[tokio::test]
    async fn exhausted_range_is_an_error_not_a_wrap() {
        let allocator = allocator();
        allocator
            .store()
            .seed_counter(
                "numerotation",
                json!({"prochain_numero_devis": u32::MAX}),
            )
            .await;

        let err = allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap_err();
        assert_eq!(
            err,
            NumberingError::SequenceExhausted {
                family: DocumentFamily::Devis,
                year: 2025
            }
        );
    }

    /// Store whose document scan misses some numbers that the exact lookup
    /// still finds (e.g. rows written with a different column format).
    struct DivergentStore {
        taken: Vec<String>,
    }

    struct DivergentTransaction {
        data: serde_json::Value,
        taken: Vec<String>,
    }

    #[async_trait::async_trait]
    impl NumberingStore for DivergentStore {
        async fn begin(&self, _key: &str) -> Result<Box<dyn CounterTransaction>, NumberingError> {
            Ok(Box::new(DivergentTransaction {
                data: serde_json::Value::Null,
                taken: self.taken.clone(),
            }))
        }
    }

    #[async_trait::async_trait]
    impl CounterTransaction for DivergentTransaction {
        fn created(&self) -> bool {
            self.data.is_null()
        }

        async fn counter(&mut self) -> Result<CounterData, NumberingError> {
            Ok(CounterData::from_json(&self.data)?)
        }

        async fn max_sequence(
            &mut self,
            _family: DocumentFamily,
            _prefix: &Prefix,
            _year: i32,
        ) -> Result<Option<u32>, NumberingError> {
            Ok(None)
        }

        async fn number_exists(
            &mut self,
            _family: DocumentFamily,
            number: &DocumentNumber,
        ) -> Result<bool, NumberingError> {
            Ok(self.taken.contains(&number.to_string()))
        }

        async fn save_counter(&mut self, data: &CounterData) -> Result<(), NumberingError> {
            self.data = data.to_json();
            Ok(())
        }

        async fn commit(self: Box<Self>) -> Result<(), NumberingError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn exact_collisions_are_skipped_until_a_free_number() {
        let allocator = SequentialNumberAllocator::new(DivergentStore {
            taken: vec!["DEV-2025-0001".to_string(), "DEV-2025-0002".to_string()],
        });

        let number = allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        assert_eq!(number.to_string(), "DEV-2025-0003");
    }
}
