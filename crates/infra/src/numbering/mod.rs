//! Numbering counter store boundary.
//!
//! This module defines the storage seam the allocator runs against: a locked,
//! transactional view of one counter record plus the document lookups used for
//! drift recovery.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{DEFAULT_LOCK_TIMEOUT, InMemoryNumberingStore};
pub use postgres::{DocumentTables, PostgresNumberingStore};
pub use r#trait::{CounterTransaction, NumberingError, NumberingStore};
