//! Value object trait: equality by value, not identity.
//!
//! Document numbers, prefixes and per-family counters are all defined entirely
//! by their attribute values. Two `DEV-2025-0007` numbers are the same number,
//! wherever they were produced.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new value (e.g. `FamilyCounter::with_next_sequence`).
///
/// The trait requires:
/// - **Clone**: values are cheap to copy around
/// - **PartialEq**: compared by attribute values
/// - **Debug**: shows up in logs and test failures
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
