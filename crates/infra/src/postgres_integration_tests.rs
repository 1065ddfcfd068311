//! Integration tests against a real Postgres.
//!
//! Ignored by default. Run with:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test -p logistiga-infra -- --ignored
//! ```
//!
//! Every test works on its own counter key and its own document tables, so
//! runs do not interfere with each other or with existing data.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;

    use logistiga_numbering::DocumentFamily;

    use crate::allocator::SequentialNumberAllocator;
    use crate::numbering::{DocumentTables, NumberingError, NumberingStore, PostgresNumberingStore};

    static NEXT_SCOPE: AtomicU32 = AtomicU32::new(0);

    struct Scope {
        pool: PgPool,
        key: String,
        tables: DocumentTables,
    }

    impl Scope {
        fn store(&self) -> PostgresNumberingStore {
            PostgresNumberingStore::new(self.pool.clone()).with_tables(self.tables.clone())
        }

        async fn insert_document(&self, family: DocumentFamily, numero: &str, deleted: bool) {
            let sql = format!(
                "INSERT INTO {} (numero, deleted_at) VALUES ($1, CASE WHEN $2 THEN NOW() END)",
                self.tables.table(family)
            );
            sqlx::query(&sql)
                .bind(numero)
                .bind(deleted)
                .execute(&self.pool)
                .await
                .unwrap();
        }
    }

    /// Fresh key and document tables, or `None` when `DATABASE_URL` is unset.
    async fn scope() -> Option<Scope> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping");
            return None;
        };
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(&url)
            .await
            .unwrap();

        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let tag = format!("t{}_{}", nanos % 1_000_000_000_000, NEXT_SCOPE.fetch_add(1, Ordering::SeqCst));

        let mut tables = DocumentTables::default();
        for family in DocumentFamily::ALL {
            let name = format!("{tag}_{}", family.as_str());
            tables = tables.with_table(family, name).unwrap();
        }

        let scope = Scope {
            pool,
            key: format!("numerotation_{tag}"),
            tables,
        };
        scope.store().ensure_schema().await.unwrap();
        Some(scope)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires DATABASE_URL"]
    async fn concurrent_allocations_are_unique_and_contiguous() {
        let Some(scope) = scope().await else { return };
        let allocator = Arc::new(SequentialNumberAllocator::with_counter_key(
            scope.store(),
            scope.key.clone(),
        ));
        let n = 64u32;

        let mut handles = Vec::new();
        for _ in 0..n {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator.allocate(DocumentFamily::Facture, Some(2025)).await
            }));
        }

        let mut numbers = HashSet::new();
        let mut sequences = Vec::new();
        for handle in handles {
            let number = handle.await.unwrap().unwrap();
            sequences.push(number.sequence());
            assert!(numbers.insert(number.to_string()), "duplicate number {number}");
        }

        sequences.sort_unstable();
        assert_eq!(sequences, (1..=n).collect::<Vec<_>>());

        let settings = allocator.settings().await.unwrap();
        assert_eq!(settings.family(DocumentFamily::Facture).next_sequence(), n + 1);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn drift_recovery_scans_live_and_soft_deleted_rows() {
        let Some(scope) = scope().await else { return };
        let allocator = SequentialNumberAllocator::with_counter_key(scope.store(), scope.key.clone());

        scope.insert_document(DocumentFamily::Devis, "DEV-2025-0042", false).await;
        let number = allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        assert_eq!(number.to_string(), "DEV-2025-0043");
        let number = allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        assert_eq!(number.to_string(), "DEV-2025-0044");

        scope.insert_document(DocumentFamily::Ordre, "OT-2025-0007", true).await;
        scope.insert_document(DocumentFamily::Ordre, "OT-2024-0090", false).await;
        let number = allocator.allocate(DocumentFamily::Ordre, Some(2025)).await.unwrap();
        assert_eq!(number.to_string(), "OT-2025-0008");
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn oversized_legacy_sequence_does_not_break_the_scan() {
        let Some(scope) = scope().await else { return };
        let allocator = SequentialNumberAllocator::with_counter_key(scope.store(), scope.key.clone());

        scope
            .insert_document(DocumentFamily::Avoir, "AV-2025-12345678901234567890", false)
            .await;
        scope.insert_document(DocumentFamily::Avoir, "AV-2025-5", false).await;

        let number = allocator.allocate(DocumentFamily::Avoir, Some(2025)).await.unwrap();
        assert_eq!(number.to_string(), "AV-2025-0006");
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn held_row_lock_times_out_and_commits_nothing() {
        let Some(scope) = scope().await else { return };
        let store = scope.store().with_lock_timeout(Duration::from_millis(100));
        let allocator = SequentialNumberAllocator::with_counter_key(store.clone(), scope.key.clone());
        allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();

        let held = store.begin(&scope.key).await.unwrap();
        let err = allocator
            .allocate(DocumentFamily::Devis, Some(2025))
            .await
            .unwrap_err();
        assert!(matches!(err, NumberingError::LockTimeout(_)), "got {err:?}");
        drop(held);

        let retried = allocator.allocate(DocumentFamily::Devis, Some(2025)).await.unwrap();
        assert_eq!(retried.to_string(), "DEV-2025-0002");
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn settings_only_writes_when_creating_the_record() {
        let Some(scope) = scope().await else { return };
        let allocator = SequentialNumberAllocator::with_counter_key(scope.store(), scope.key.clone());

        allocator.settings().await.unwrap();
        let first: (sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>,) =
            sqlx::query_as("SELECT updated_at FROM configurations WHERE key = $1")
                .bind(&scope.key)
                .fetch_one(&scope.pool)
                .await
                .unwrap();

        allocator.settings().await.unwrap();
        let second: (sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>,) =
            sqlx::query_as("SELECT updated_at FROM configurations WHERE key = $1")
                .bind(&scope.key)
                .fetch_one(&scope.pool)
                .await
                .unwrap();

        assert_eq!(first, second);
    }
}
