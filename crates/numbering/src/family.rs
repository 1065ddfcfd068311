use core::str::FromStr;
use serde::{Deserialize, Serialize};

use logistiga_core::DomainError;

/// Document type a number belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFamily {
    /// Quote.
    Devis,
    /// Work order (ordre de travail).
    Ordre,
    /// Invoice.
    Facture,
    /// Credit note.
    Avoir,
}

impl DocumentFamily {
    pub const ALL: [DocumentFamily; 4] = [Self::Devis, Self::Ordre, Self::Facture, Self::Avoir];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devis => "devis",
            Self::Ordre => "ordre",
            Self::Facture => "facture",
            Self::Avoir => "avoir",
        }
    }

    /// Prefix used when the counter record has none configured.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            Self::Devis => "DEV",
            Self::Ordre => "OT",
            Self::Facture => "FAC",
            Self::Avoir => "AV",
        }
    }

    /// Key of the prefix entry in the persisted counter payload.
    pub fn prefix_key(&self) -> String {
        format!("prefixe_{}", self.as_str())
    }

    /// Key of the next-sequence entry in the persisted counter payload.
    pub fn next_sequence_key(&self) -> String {
        format!("prochain_numero_{}", self.as_str())
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Devis => 0,
            Self::Ordre => 1,
            Self::Facture => 2,
            Self::Avoir => 3,
        }
    }
}

impl core::fmt::Display for DocumentFamily {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFamily {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devis" | "quote" => Ok(Self::Devis),
            "ordre" | "ordre_travail" | "work_order" => Ok(Self::Ordre),
            "facture" | "invoice" => Ok(Self::Facture),
            "avoir" | "credit_note" => Ok(Self::Avoir),
            other => Err(DomainError::validation(format!(
                "unknown document family '{other}' (expected one of: devis, ordre, facture, avoir)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_french_and_english_names() {
        assert_eq!("devis".parse::<DocumentFamily>().unwrap(), DocumentFamily::Devis);
        assert_eq!("Facture".parse::<DocumentFamily>().unwrap(), DocumentFamily::Facture);
        assert_eq!("work_order".parse::<DocumentFamily>().unwrap(), DocumentFamily::Ordre);
        assert_eq!(" credit_note ".parse::<DocumentFamily>().unwrap(), DocumentFamily::Avoir);
    }

    #[test]
    fn unknown_family_is_rejected() {
        let err = "bon_de_livraison".parse::<DocumentFamily>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("bon_de_livraison")));
    }

    #[test]
    fn payload_keys_follow_family_name() {
        assert_eq!(DocumentFamily::Devis.prefix_key(), "prefixe_devis");
        assert_eq!(DocumentFamily::Avoir.next_sequence_key(), "prochain_numero_avoir");
    }

    #[test]
    fn indices_are_distinct() {
        let mut seen: Vec<usize> = DocumentFamily::ALL.iter().map(|f| f.index()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
