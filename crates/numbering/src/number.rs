//! Prefixes and formatted document numbers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use logistiga_core::{DomainError, DomainResult, ValueObject};

/// Maximum length of a configured prefix.
pub const MAX_PREFIX_LEN: usize = 10;

/// Minimum width of the printed sequence. Wider sequences are printed in full.
pub const SEQUENCE_WIDTH: usize = 4;

/// Configured document prefix (`DEV`, `FAC`, ...).
///
/// Uppercase ASCII letters and digits only, 1 to 10 characters. The value is
/// kept exactly as configured; lowercase input is rejected, not folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix(pub(crate) String);

impl Prefix {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::validation("prefix must not be empty"));
        }
        if value.len() > MAX_PREFIX_LEN {
            return Err(DomainError::validation(format!(
                "prefix '{value}' is longer than {MAX_PREFIX_LEN} characters"
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(DomainError::validation(format!(
                "prefix '{value}' must contain only A-Z and 0-9"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Prefix {}

impl core::fmt::Display for Prefix {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Prefix {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Prefix> for String {
    fn from(value: Prefix) -> Self {
        value.0
    }
}

/// Human-readable document number: `{prefix}-{year}-{sequence:04}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber {
    prefix: Prefix,
    year: i32,
    sequence: u32,
}

impl DocumentNumber {
    pub fn new(prefix: Prefix, year: i32, sequence: u32) -> DomainResult<Self> {
        validate_year(year)?;
        if sequence == 0 {
            return Err(DomainError::validation("sequence must be positive"));
        }
        Ok(Self {
            prefix,
            year,
            sequence,
        })
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// True when this number lives in the `(prefix, year)` namespace.
    pub fn belongs_to(&self, prefix: &Prefix, year: i32) -> bool {
        &self.prefix == prefix && self.year == year
    }
}

impl ValueObject for DocumentNumber {}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-{:0width$}",
            self.prefix,
            self.year,
            self.sequence,
            width = SEQUENCE_WIDTH
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = DomainError;

    /// Parses `PREFIX-YYYY-N`. The sequence part may be unpadded (`FAC-2024-42`)
    /// so that numbers written by older tooling are still recognized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DomainError::validation(format!("malformed document number '{s}'"));

        let mut parts = s.trim().rsplitn(3, '-');
        let sequence = parts.next().ok_or_else(malformed)?;
        let year = parts.next().ok_or_else(malformed)?;
        let prefix = parts.next().ok_or_else(malformed)?;

        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let year: i32 = year.parse().map_err(|_| malformed())?;
        let sequence: u32 = sequence.parse().map_err(|_| malformed())?;

        Self::new(Prefix::new(prefix)?, year, sequence)
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.to_string()
    }
}

/// Years are printed with exactly four digits.
pub fn validate_year(year: i32) -> DomainResult<()> {
    if (1000..=9999).contains(&year) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "year {year} is outside 1000..=9999"
        )))
    }
}
