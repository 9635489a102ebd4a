//! Licence plate natural key.
//!
//! Plates arrive as typed by operators ("34 abc 123", "34ABC123 ").
//! The normalized form (uppercase, all whitespace removed) is the unique
//! key vehicles are matched on.

use serde::{Deserialize, Serialize};

use crate::error::SettlementError;

/// Normalized licence plate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Plate(String);

impl Plate {
    /// Normalize and validate a raw plate string.
    pub fn parse(raw: &str) -> Result<Self, SettlementError> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_uppercase)
            .collect();
        if normalized.is_empty() {
            return Err(SettlementError::Validation("plate must not be empty".into()));
        }
        if normalized.len() > 16 {
            return Err(SettlementError::Validation(
                "plate must not exceed 16 characters".into(),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Plate {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Plate> for String {
    fn from(plate: Plate) -> Self {
        plate.0
    }
}

impl std::fmt::Display for Plate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
