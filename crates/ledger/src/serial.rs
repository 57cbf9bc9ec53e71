//! Human-readable serial numbers.
//!
//! Serials look like `RCV-KAI-26-0001`: operation prefix, location code,
//! two-digit year and a per-(prefix, location, year) counter. The counter is
//! only safe when read and written inside the same atomic commit.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use bahari_core::LocationId;

/// Serial prefix per operation family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SerialPrefix {
    Rcv,
    Prd,
    Exp,
    Inv,
    Sld,
    Txn,
}

impl SerialPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerialPrefix::Rcv => "RCV",
            SerialPrefix::Prd => "PRD",
            SerialPrefix::Exp => "EXP",
            SerialPrefix::Inv => "INV",
            SerialPrefix::Sld => "SLD",
            SerialPrefix::Txn => "TXN",
        }
    }
}

impl core::fmt::Display for SerialPrefix {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short location code used in serials: the first three alphanumeric
/// characters of the location id, upper-cased (`kaimana` -> `KAI`).
pub fn location_code(location_id: &LocationId) -> String {
    let code: String = location_id
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();

    if code.is_empty() {
        "LOC".to_string()
    } else {
        code
    }
}

/// Counter document key: `{prefix}_{locCode}_{yy}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub prefix: SerialPrefix,
    pub location_code: String,
    pub year: u32,
}

impl CounterKey {
    pub fn new(prefix: SerialPrefix, location_id: &LocationId, at: DateTime<Utc>) -> Self {
        Self {
            prefix,
            location_code: location_code(location_id),
            year: (at.year().rem_euclid(100)) as u32,
        }
    }

    pub fn document_id(&self) -> String {
        format!("{}_{}_{:02}", self.prefix, self.location_code, self.year)
    }

    /// Render the serial for a given sequence value.
    pub fn serial(&self, seq: u64) -> String {
        format!(
            "{}-{}-{:02}-{:04}",
            self.prefix, self.location_code, self.year, seq
        )
    }
}

/// Persisted counter state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub seq: u64,
}

impl Counter {
    /// The counter after issuing one more serial.
    pub fn next(&self) -> Counter {
        Counter { seq: self.seq + 1 }
    }
}
