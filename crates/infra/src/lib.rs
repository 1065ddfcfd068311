//! Infrastructure layer: counter storage, allocation, configuration.

pub mod allocator;
pub mod config;
pub mod numbering;

#[cfg(test)]
mod postgres_integration_tests;

pub use allocator::{CounterUpdate, DEFAULT_COUNTER_KEY, SequentialNumberAllocator};
pub use config::{ConfigError, ServiceConfig};
