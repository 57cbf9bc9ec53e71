//! Aggregate (mass-balance) stock.
//!
//! Stock has no per-lot identity here: one entry per (location, unit, key),
//! where the key is `RAW_{item}` for unprocessed intake and
//! `COLD_{item}_{grade}` for processed, cold-stored product.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bahari_core::{DomainError, DomainResult, GradeId, ItemId, LocationId, UnitId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum StockKey {
    Raw { item_id: ItemId },
    Cold { item_id: ItemId, grade: GradeId },
}

impl StockKey {
    pub fn raw(item_id: ItemId) -> Self {
        StockKey::Raw { item_id }
    }

    pub fn cold(item_id: ItemId, grade: GradeId) -> Self {
        StockKey::Cold { item_id, grade }
    }

    pub fn item_id(&self) -> &ItemId {
        match self {
            StockKey::Raw { item_id } | StockKey::Cold { item_id, .. } => item_id,
        }
    }

    /// Grade stored on the entry; raw stock is ungraded.
    pub fn grade(&self) -> GradeId {
        match self {
            StockKey::Raw { .. } => GradeId::not_applicable(),
            StockKey::Cold { grade, .. } => grade.clone(),
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            StockKey::Raw { item_id } => format!("RAW_{item_id}"),
            StockKey::Cold { item_id, grade } => format!("COLD_{item_id}_{grade}"),
        }
    }

    /// Storage id, scoped per (location, unit).
    pub fn document_id(&self, location_id: &LocationId, unit_id: &UnitId) -> String {
        format!("{location_id}/{unit_id}/{}", self.as_key())
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.as_key())
    }
}

/// Signed quantity change for one stock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDelta {
    pub key: StockKey,
    pub delta_kg: Decimal,
}

impl StockDelta {
    pub fn is_consumption(&self) -> bool {
        self.delta_kg < Decimal::ZERO
    }
}

/// Persisted stock entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockEntry {
    pub location_id: LocationId,
    pub unit_id: UnitId,
    pub item_id: ItemId,
    pub grade: GradeId,
    pub quantity_kg: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl StockDelta {
    /// Check a consumption against the pre-read entry.
    ///
    /// Positive deltas always pass; an absent entry holds zero.
    pub fn check_sufficient(&self, snapshot: Option<&StockEntry>) -> DomainResult<()> {
        if !self.is_consumption() {
            return Ok(());
        }
        let available = snapshot.map(|e| e.quantity_kg).unwrap_or(Decimal::ZERO);
        let required = -self.delta_kg;
        if available < required {
            return Err(DomainError::precondition(format!(
                "insufficient stock for {} (available {available} kg, required {required} kg)",
                self.key
            )));
        }
        Ok(())
    }
}
