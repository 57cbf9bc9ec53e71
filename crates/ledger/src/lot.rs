//! Discrete inventory lots and genealogy edges.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bahari_core::{DomainError, DomainResult, GradeId, ItemId, LocationId, LotId, UnitId};

use crate::production::PRODUCTION_ID_PREFIX;

/// Material classification of a lot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Raw,
    Frozen,
    Finished,
    RejectSellable,
    Waste,
}

/// Lifecycle of a lot. Every state except `Active` is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotState {
    Active,
    Consumed,
    Sold,
    Transferred,
    Expired,
}

impl LotState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LotState::Active)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotSourceType {
    Receiving,
    Production,
    Adjustment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotOrigin {
    pub source_type: LotSourceType,
    pub source_ref_id: String,
}

/// A discrete, traceable quantity of one item.
///
/// Lots are never deleted; the only mutation is decrementing
/// `quantity_kg_remaining` (and the lifecycle state that follows from it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLot {
    pub id: LotId,
    pub location_id: LocationId,
    pub unit_id: UnitId,
    pub item_id: ItemId,
    pub grade: GradeId,
    pub status: LotStatus,
    pub state: LotState,
    pub quantity_kg_remaining: Decimal,
    pub origin: LotOrigin,
    pub created_at: DateTime<Utc>,
}

impl InventoryLot {
    /// Whether the lot sits in the given (location, unit).
    pub fn is_held_by(&self, location_id: &LocationId, unit_id: &UnitId) -> bool {
        &self.location_id == location_id && &self.unit_id == unit_id
    }

    /// The lot after drawing `qty` kg from it.
    pub fn consume(&self, qty: Decimal) -> DomainResult<InventoryLot> {
        if self.state != LotState::Active {
            return Err(DomainError::precondition(format!(
                "lot {} is {:?} and cannot be consumed",
                self.id, self.state
            )));
        }
        if qty > self.quantity_kg_remaining {
            return Err(DomainError::precondition(format!(
                "lot {} has {} kg remaining, {} kg requested",
                self.id, self.quantity_kg_remaining, qty
            )));
        }

        let mut next = self.clone();
        next.quantity_kg_remaining -= qty;
        if next.quantity_kg_remaining.is_zero() {
            next.state = LotState::Consumed;
        }
        Ok(next)
    }

    /// Move an active lot into a terminal state other than `Consumed`.
    pub fn retire(&self, to: LotState) -> DomainResult<InventoryLot> {
        if self.state.is_terminal() {
            return Err(DomainError::precondition(format!(
                "lot {} is already {:?}",
                self.id, self.state
            )));
        }
        if !matches!(to, LotState::Sold | LotState::Transferred | LotState::Expired) {
            return Err(DomainError::validation(format!(
                "lots can only be retired as SOLD, TRANSFERRED or EXPIRED, not {to:?}"
            )));
        }
        let mut next = self.clone();
        next.state = to;
        Ok(next)
    }
}

/// Request to register a new lot that did not come from a production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotIntake {
    pub lot_id: LotId,
    pub location_id: LocationId,
    pub unit_id: UnitId,
    pub item_id: ItemId,
    #[serde(default)]
    pub grade_id: Option<GradeId>,
    pub status: LotStatus,
    pub quantity_kg: Decimal,
    pub source_type: LotSourceType,
    pub source_ref_id: String,
}

impl LotIntake {
    pub fn into_lot(self, location_id: LocationId, created_at: DateTime<Utc>) -> DomainResult<InventoryLot> {
        if self.quantity_kg <= Decimal::ZERO {
            return Err(DomainError::validation("quantityKg must be positive"));
        }
        if self.source_type == LotSourceType::Production {
            return Err(DomainError::validation(
                "production lots are created by production runs only",
            ));
        }
        if self.lot_id.as_str().starts_with(PRODUCTION_ID_PREFIX) {
            return Err(DomainError::validation(format!(
                "lot id {} is reserved for production outputs",
                self.lot_id
            )));
        }
        if self.source_ref_id.trim().is_empty() {
            return Err(DomainError::validation("sourceRefId is required"));
        }

        Ok(InventoryLot {
            id: self.lot_id,
            location_id,
            unit_id: self.unit_id,
            item_id: self.item_id,
            grade: self.grade_id.unwrap_or_else(GradeId::not_applicable),
            status: self.status,
            state: LotState::Active,
            quantity_kg_remaining: self.quantity_kg,
            origin: LotOrigin {
                source_type: self.source_type,
                source_ref_id: self.source_ref_id.trim().to_string(),
            },
            created_at,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceLinkType {
    Transform,
}

/// Directed genealogy edge from a consumed lot to a produced lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceLink {
    pub id: String,
    pub from_lot_id: LotId,
    pub to_lot_id: LotId,
    pub event_id: String,
    #[serde(rename = "type")]
    pub link_type: TraceLinkType,
    pub created_at: DateTime<Utc>,
}
