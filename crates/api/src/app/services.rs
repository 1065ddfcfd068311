use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use logistiga_infra::numbering::{InMemoryNumberingStore, NumberingStore, PostgresNumberingStore};
use logistiga_infra::{SequentialNumberAllocator, ServiceConfig};

/// Allocator over a type-erased store, so handlers do not care which backend runs.
pub type Allocator = SequentialNumberAllocator<Arc<dyn NumberingStore>>;

/// Services shared by all handlers.
pub struct AppServices {
    allocator: Allocator,
    backend: &'static str,
}

impl AppServices {
    pub fn new(store: Arc<dyn NumberingStore>, counter_key: &str, backend: &'static str) -> Self {
        Self {
            allocator: SequentialNumberAllocator::with_counter_key(store, counter_key),
            backend,
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory(config: &ServiceConfig) -> Self {
        let store = InMemoryNumberingStore::new().with_lock_timeout(config.lock_timeout);
        Self::new(Arc::new(store), &config.counter_key, "memory")
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

/// Wire services from configuration: Postgres when `DATABASE_URL` is set,
/// in-memory otherwise.
pub async fn build_services(config: &ServiceConfig) -> anyhow::Result<AppServices> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; numbering counters are in-memory and lost on restart");
        return Ok(AppServices::in_memory(config));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    let store = PostgresNumberingStore::new(pool)
        .with_tables(config.document_tables.clone())
        .with_lock_timeout(config.lock_timeout);
    store
        .ensure_schema()
        .await
        .context("failed to prepare numbering schema")?;

    tracing::info!(counter_key = %config.counter_key, "numbering backed by Postgres");
    Ok(AppServices::new(Arc::new(store), &config.counter_key, "postgres"))
}
