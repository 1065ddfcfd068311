//! Document numbering domain module.
//!
//! This crate contains the rules for human-readable document numbers
//! (`DEV-2025-0042`) and the typed counter payload they are allocated from,
//! implemented purely as deterministic domain logic (no IO, no locking, no storage).

pub mod counter;
pub mod family;
pub mod number;
pub mod sequence;

pub use counter::{CounterData, FamilyCounter};
pub use family::DocumentFamily;
pub use number::{DocumentNumber, Prefix};
pub use sequence::{following, starting_candidate};
