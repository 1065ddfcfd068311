use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use logistiga_infra::CounterUpdate;
use logistiga_infra::numbering::NumberingError;
use logistiga_numbering::{CounterData, DocumentFamily, DocumentNumber, FamilyCounter, Prefix};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct AllocateRequest {
    pub year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub prefix: Option<String>,
    pub next_sequence: Option<u32>,
}

impl UpdateSettingsRequest {
    pub fn into_update(self) -> Result<CounterUpdate, NumberingError> {
        let prefix = self.prefix.map(Prefix::new).transpose()?;
        Ok(CounterUpdate {
            prefix,
            next_sequence: self.next_sequence,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct DocumentNumberResponse {
    pub numero: String,
    pub family: DocumentFamily,
    pub prefix: String,
    pub year: i32,
    pub sequence: u32,
}

impl DocumentNumberResponse {
    pub fn new(family: DocumentFamily, number: &DocumentNumber) -> Self {
        Self {
            numero: number.to_string(),
            family,
            prefix: number.prefix().to_string(),
            year: number.year(),
            sequence: number.sequence(),
        }
    }
}

/// Settings keyed by family name: `{"devis": {"prefix": "DEV", "next_sequence": 1}, ...}`.
pub fn settings_response(data: &CounterData) -> BTreeMap<&'static str, FamilyCounter> {
    data.iter()
        .map(|(family, counter)| (family.as_str(), counter.clone()))
        .collect()
}
