//! Configuration loading and representation.
//!
//! Settings come from environment variables:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `DATABASE_URL` | unset | Postgres URL; unset means in-memory store |
//! | `DATABASE_MAX_CONNECTIONS` | `10` | pool size |
//! | `NUMBERING_COUNTER_KEY` | `numerotation` | counter record key |
//! | `NUMBERING_LOCK_TIMEOUT_MS` | `5000` | wait bound for the counter lock |
//! | `BIND_ADDR` | `0.0.0.0:8080` | HTTP listen address |
//! | `NUMBERING_TABLE_DEVIS` | `devis` | document table scanned for quotes |
//! | `NUMBERING_TABLE_ORDRE` | `ordres_travail` | document table scanned for work orders |
//! | `NUMBERING_TABLE_FACTURE` | `factures` | document table scanned for invoices |
//! | `NUMBERING_TABLE_AVOIR` | `avoirs` | document table scanned for credit notes |

use std::time::Duration;

use thiserror::Error;

use logistiga_numbering::DocumentFamily;

use crate::allocator::DEFAULT_COUNTER_KEY;
use crate::numbering::{DEFAULT_LOCK_TIMEOUT, DocumentTables};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Process configuration for the numbering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub counter_key: String,
    pub lock_timeout: Duration,
    pub bind_addr: String,
    pub document_tables: DocumentTables,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            counter_key: DEFAULT_COUNTER_KEY.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            bind_addr: "0.0.0.0:8080".to_string(),
            document_tables: DocumentTables::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.database_url = get("DATABASE_URL");

        if let Some(raw) = get("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = parse_positive("DATABASE_MAX_CONNECTIONS", &raw)?;
        }
        if let Some(key) = get("NUMBERING_COUNTER_KEY") {
            config.counter_key = key.trim().to_string();
        }
        if let Some(raw) = get("NUMBERING_LOCK_TIMEOUT_MS") {
            let ms: u32 = parse_positive("NUMBERING_LOCK_TIMEOUT_MS", &raw)?;
            config.lock_timeout = Duration::from_millis(u64::from(ms));
        }
        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr.trim().to_string();
        }
        for family in DocumentFamily::ALL {
            let key = table_env_key(family);
            if let Some(table) = get(key) {
                config.document_tables = config
                    .document_tables
                    .with_table(family, table.trim())
                    .map_err(|e| ConfigError::Invalid {
                        key,
                        reason: e.to_string(),
                    })?;
            }
        }

        Ok(config)
    }
}

fn table_env_key(family: DocumentFamily) -> &'static str {
    match family {
        DocumentFamily::Devis => "NUMBERING_TABLE_DEVIS",
        DocumentFamily::Ordre => "NUMBERING_TABLE_ORDRE",
        DocumentFamily::Facture => "NUMBERING_TABLE_FACTURE",
        DocumentFamily::Avoir => "NUMBERING_TABLE_AVOIR",
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(v) => Ok(v),
        Err(e) => Err(ConfigError::Invalid {
            key,
            reason: format!("'{raw}': {e}"),
        }),
    }
}
