//! Typed counter payload.
//!
//! The persisted counter record keeps a flat JSON mapping:
//!
//! ```json
//! {
//!   "prefixe_devis": "DEV",
//!   "prochain_numero_devis": 42,
//!   "prefixe_facture": "FAC",
//!   "prochain_numero_facture": 7
//! }
//! ```
//!
//! `CounterData` is the typed view of that mapping. Keys that do not belong to
//! the numbering (other settings sharing the same row) are carried through
//! untouched so a write never drops them.

use serde::Serialize;
use serde_json::{Map, Value};

use logistiga_core::{DomainError, DomainResult, ValueObject};

use crate::family::DocumentFamily;
use crate::number::Prefix;

/// Prefix and next candidate sequence of one family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyCounter {
    prefix: Prefix,
    next_sequence: u32,
}

impl FamilyCounter {
    pub fn new(prefix: Prefix, next_sequence: u32) -> DomainResult<Self> {
        if next_sequence == 0 {
            return Err(DomainError::validation("next sequence must be positive"));
        }
        Ok(Self {
            prefix,
            next_sequence,
        })
    }

    pub fn default_for(family: DocumentFamily) -> Self {
        Self {
            prefix: Prefix(family.default_prefix().to_string()),
            next_sequence: 1,
        }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn with_prefix(&self, prefix: Prefix) -> Self {
        Self {
            prefix,
            next_sequence: self.next_sequence,
        }
    }

    /// Counter moved to `next_sequence`.
    ///
    /// Invariant: the counter never moves backwards.
    pub fn with_next_sequence(&self, next_sequence: u32) -> DomainResult<Self> {
        if next_sequence < self.next_sequence {
            return Err(DomainError::invariant(format!(
                "next sequence cannot move backwards ({} -> {next_sequence})",
                self.next_sequence
            )));
        }
        Self::new(self.prefix.clone(), next_sequence)
    }
}

impl ValueObject for FamilyCounter {}

/// Typed view of the whole counter record payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterData {
    counters: [FamilyCounter; 4],
    extra: Map<String, Value>,
}

impl Default for CounterData {
    fn default() -> Self {
        Self {
            counters: DocumentFamily::ALL.map(FamilyCounter::default_for),
            extra: Map::new(),
        }
    }
}

impl CounterData {
    pub fn family(&self, family: DocumentFamily) -> &FamilyCounter {
        &self.counters[family.index()]
    }

    pub fn set_family(&mut self, family: DocumentFamily, counter: FamilyCounter) {
        self.counters[family.index()] = counter;
    }

    /// Iterate families in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (DocumentFamily, &FamilyCounter)> {
        DocumentFamily::ALL
            .into_iter()
            .map(move |family| (family, self.family(family)))
    }

    /// Non-numbering keys carried alongside the counters.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Read the persisted payload.
    ///
    /// Missing or `null` entries fall back to the family defaults. A
    /// `prochain_numero_*` stored as a numeric string is accepted; `0` is read
    /// as `1`.
    pub fn from_json(value: &Value) -> DomainResult<Self> {
        let mut map = match value {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(DomainError::validation(format!(
                    "counter payload must be an object, got {other}"
                )));
            }
        };

        let mut data = Self::default();
        for family in DocumentFamily::ALL {
            let prefix_key = family.prefix_key();
            let next_key = family.next_sequence_key();

            let default = FamilyCounter::default_for(family);
            let prefix = match map.remove(&prefix_key) {
                None | Some(Value::Null) => default.prefix,
                Some(Value::String(s)) => Prefix::new(s)
                    .map_err(|e| DomainError::validation(format!("{prefix_key}: {}", e.detail())))?,
                Some(other) => {
                    return Err(DomainError::validation(format!(
                        "{prefix_key}: expected a string, got {other}"
                    )));
                }
            };
            let next_sequence = match map.remove(&next_key) {
                None | Some(Value::Null) => default.next_sequence,
                Some(v) => read_sequence(&next_key, &v)?,
            };

            data.set_family(family, FamilyCounter::new(prefix, next_sequence.max(1))?);
        }
        data.extra = map;

        Ok(data)
    }

    /// Payload to persist: extra keys plus one prefix/next entry per family.
    pub fn to_json(&self) -> Value {
        let mut map = self.extra.clone();
        for (family, counter) in self.iter() {
            map.insert(
                family.prefix_key(),
                Value::String(counter.prefix.as_str().to_string()),
            );
            map.insert(
                family.next_sequence_key(),
                Value::from(counter.next_sequence),
            );
        }
        Value::Object(map)
    }
}

fn read_sequence(key: &str, value: &Value) -> DomainResult<u32> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            DomainError::validation(format!(
                "{key}: expected a non-negative integer below 2^32, got {value}"
            ))
        })
}
