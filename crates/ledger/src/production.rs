//! Lot-based production runs.
//!
//! A run consumes discrete input lots, creates discrete output lots, links
//! every input to every output, and books one balanced ledger entry moving
//! value from raw to finished inventory. Planning is pure: it takes the
//! pre-read input lots and returns every document the run will write.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use bahari_core::{DomainError, DomainResult, GradeId, ItemId, LocationId, LotId, UnitId, UserId};

use crate::lot::{InventoryLot, LotOrigin, LotSourceType, LotState, LotStatus, TraceLink, TraceLinkType};

const MAX_OPERATION_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionInput {
    pub lot_id: LotId,
    pub quantity_kg: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionOutput {
    pub item_id: ItemId,
    #[serde(default)]
    pub grade_id: Option<GradeId>,
    pub status: LotStatus,
    pub quantity_kg: Decimal,
}

/// Inbound production request. `operation_id` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionRequest {
    pub operation_id: String,
    pub location_id: LocationId,
    pub unit_id: UnitId,
    pub input_lots: Vec<ProductionInput>,
    pub output_lots: Vec<ProductionOutput>,
    #[serde(default)]
    pub cost_per_kg_idr: Option<i64>,
    pub actor_user_id: UserId,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ProductionRequest {
    /// Field checks that need no stored state.
    pub fn validate(&self) -> DomainResult<()> {
        let op = self.operation_id.trim();
        if op.is_empty() {
            return Err(DomainError::validation("operationId is required"));
        }
        if op.len() > MAX_OPERATION_ID_LEN || op.contains('/') {
            return Err(DomainError::validation(format!("operationId '{op}' is not a valid key")));
        }
        if self.input_lots.is_empty() {
            return Err(DomainError::validation("at least one input lot is required"));
        }
        if self.output_lots.is_empty() {
            return Err(DomainError::validation("at least one output lot is required"));
        }

        let mut seen = HashSet::new();
        for input in &self.input_lots {
            if input.quantity_kg <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "input lot {} quantity must be positive",
                    input.lot_id
                )));
            }
            if !seen.insert(&input.lot_id) {
                return Err(DomainError::validation(format!(
                    "input lot {} is listed more than once",
                    input.lot_id
                )));
            }
        }
        for output in &self.output_lots {
            if output.quantity_kg <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "output {} quantity must be positive",
                    output.item_id
                )));
            }
        }
        if matches!(self.cost_per_kg_idr, Some(c) if c < 0) {
            return Err(DomainError::validation("costPerKgIdr cannot be negative"));
        }
        self.total_input_kg()?;
        self.total_output_kg()?;
        Ok(())
    }

    pub fn total_input_kg(&self) -> DomainResult<Decimal> {
        checked_total(self.input_lots.iter().map(|i| i.quantity_kg), "input")
    }

    pub fn total_output_kg(&self) -> DomainResult<Decimal> {
        checked_total(self.output_lots.iter().map(|o| o.quantity_kg), "output")
    }
}

fn checked_total(mut quantities: impl Iterator<Item = Decimal>, side: &str) -> DomainResult<Decimal> {
    quantities
        .try_fold(Decimal::ZERO, |acc, qty| acc.checked_add(qty))
        .ok_or_else(|| DomainError::validation(format!("total {side} quantity overflows")))
}

/// Prefix of every id minted by a production run. Lots from other sources
/// may not use it.
pub const PRODUCTION_ID_PREFIX: &str = "produce-";

/// Deterministic ledger entry id; doubles as the idempotency record.
pub fn ledger_entry_id(unit_id: &UnitId, operation_id: &str) -> String {
    format!("{PRODUCTION_ID_PREFIX}{unit_id}-{}", operation_id.trim())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerAccount {
    InventoryRaw,
    InventoryFinished,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerDirection {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerLine {
    pub account: LedgerAccount,
    pub direction: LedgerDirection,
    /// Value in whole rupiah.
    pub amount: i64,
    pub quantity_kg: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotLinks {
    pub input_lot_ids: Vec<LotId>,
    pub output_lot_ids: Vec<LotId>,
}

/// Double-entry record of one production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub location_id: LocationId,
    pub unit_id: UnitId,
    pub actor_id: UserId,
    pub operation_id: String,
    pub lines: Vec<LedgerLine>,
    pub links: LotLinks,
    pub trace_link_ids: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl LedgerEntry {
    pub fn check_balanced(&self) -> DomainResult<()> {
        let mut debit: i128 = 0;
        let mut credit: i128 = 0;
        for line in &self.lines {
            if line.amount < 0 {
                return Err(DomainError::validation("ledger line amount cannot be negative"));
            }
            match line.direction {
                LedgerDirection::Debit => debit += line.amount as i128,
                LedgerDirection::Credit => credit += line.amount as i128,
            }
        }
        if debit != credit {
            return Err(DomainError::precondition(format!(
                "debits ({debit}) must equal credits ({credit})"
            )));
        }
        Ok(())
    }
}

/// Every document a production run writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionPlan {
    /// Input lots after decrement, in request order.
    pub consumed_lots: Vec<InventoryLot>,
    pub output_lots: Vec<InventoryLot>,
    pub trace_links: Vec<TraceLink>,
    pub entry: LedgerEntry,
}

/// Caller-facing result of a production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionReceipt {
    pub success: bool,
    pub ledger_entry_id: String,
    pub output_lot_ids: Vec<LotId>,
    pub trace_link_ids: Vec<String>,
    /// True when the run had already been recorded and nothing was written.
    pub replayed: bool,
}

impl ProductionReceipt {
    pub fn from_entry(entry: &LedgerEntry, replayed: bool) -> Self {
        Self {
            success: true,
            ledger_entry_id: entry.id.clone(),
            output_lot_ids: entry.links.output_lot_ids.clone(),
            trace_link_ids: entry.trace_link_ids.clone(),
            replayed,
        }
    }
}

/// Plan a production run against pre-read input lots.
///
/// `inputs[i]` is the stored lot for `request.input_lots[i]`, or `None` if it
/// does not exist. `location_id` is the scope-enforced location of the run.
pub fn plan_production(
    request: &ProductionRequest,
    location_id: &LocationId,
    actor_id: &UserId,
    inputs: &[Option<InventoryLot>],
    now: DateTime<Utc>,
) -> DomainResult<ProductionPlan> {
    request.validate()?;
    if inputs.len() != request.input_lots.len() {
        return Err(DomainError::validation("input lot snapshot does not match request"));
    }

    let entry_id = ledger_entry_id(&request.unit_id, &request.operation_id);

    let mut consumed_lots = Vec::with_capacity(inputs.len());
    for (input, stored) in request.input_lots.iter().zip(inputs) {
        let lot = stored
            .as_ref()
            .ok_or_else(|| DomainError::precondition(format!("lot {} does not exist", input.lot_id)))?;
        if !lot.is_held_by(location_id, &request.unit_id) {
            return Err(DomainError::precondition(format!(
                "lot {} belongs to {}/{}, not {}/{}; transfer it first",
                lot.id, lot.location_id, lot.unit_id, location_id, request.unit_id
            )));
        }
        consumed_lots.push(lot.consume(input.quantity_kg)?);
    }

    let mut output_lots = Vec::with_capacity(request.output_lots.len());
    for (n, output) in request.output_lots.iter().enumerate() {
        output_lots.push(InventoryLot {
            id: LotId::new(format!("{entry_id}-out-{:02}", n + 1))?,
            location_id: location_id.clone(),
            unit_id: request.unit_id.clone(),
            item_id: output.item_id.clone(),
            grade: output.grade_id.clone().unwrap_or_else(GradeId::not_applicable),
            status: output.status,
            state: LotState::Active,
            quantity_kg_remaining: output.quantity_kg,
            origin: LotOrigin {
                source_type: LotSourceType::Production,
                source_ref_id: entry_id.clone(),
            },
            created_at: now,
        });
    }

    // Full bipartite linkage: a recall on any input implicates every output.
    let mut trace_links = Vec::with_capacity(consumed_lots.len() * output_lots.len());
    for (i, input) in consumed_lots.iter().enumerate() {
        for (j, output) in output_lots.iter().enumerate() {
            trace_links.push(TraceLink {
                id: format!("{entry_id}-tl-{:02}-{:02}", i + 1, j + 1),
                from_lot_id: input.id.clone(),
                to_lot_id: output.id.clone(),
                event_id: entry_id.clone(),
                link_type: TraceLinkType::Transform,
                created_at: now,
            });
        }
    }

    let input_kg = request.total_input_kg()?;
    let output_kg = request.total_output_kg()?;
    let value = match request.cost_per_kg_idr {
        Some(cost) => input_kg
            .checked_mul(Decimal::from(cost))
            .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|v| v.to_i64())
            .ok_or_else(|| DomainError::validation("production value overflows"))?,
        None => 0,
    };

    let entry = LedgerEntry {
        id: entry_id,
        timestamp: now,
        location_id: location_id.clone(),
        unit_id: request.unit_id.clone(),
        actor_id: actor_id.clone(),
        operation_id: request.operation_id.trim().to_string(),
        lines: vec![
            LedgerLine {
                account: LedgerAccount::InventoryFinished,
                direction: LedgerDirection::Debit,
                amount: value,
                quantity_kg: output_kg,
            },
            LedgerLine {
                account: LedgerAccount::InventoryRaw,
                direction: LedgerDirection::Credit,
                amount: value,
                quantity_kg: input_kg,
            },
        ],
        links: LotLinks {
            input_lot_ids: consumed_lots.iter().map(|l| l.id.clone()).collect(),
            output_lot_ids: output_lots.iter().map(|l| l.id.clone()).collect(),
        },
        trace_link_ids: trace_links.iter().map(|t| t.id.clone()).collect(),
        notes: request.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
    };
    entry.check_balanced()?;

    Ok(ProductionPlan {
        consumed_lots,
        output_lots,
        trace_links,
        entry,
    })
}
