//! Committed transaction records and their audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bahari_core::{DomainError, DomainResult, GradeId, ItemId, LocationId, TransactionId, UnitId, UserId};

use crate::operation::{ClassifiedOperation, OperationType, PaymentMethod, TransferDirection};
use crate::stock::StockDelta;
use crate::wallet::WalletWrite;

/// Immutable record of a committed operation.
///
/// Downstream consumers (risk scoring, notifications, reporting) read these
/// after commit; nothing they write feeds back into balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub location_id: LocationId,
    #[serde(default)]
    pub unit_id: Option<UnitId>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub grade_id: Option<GradeId>,
    #[serde(default)]
    pub quantity_kg: Option<Decimal>,
    #[serde(default)]
    pub raw_used_kg: Option<Decimal>,
    #[serde(default)]
    pub price_per_kg: Option<i64>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub transfer_direction: Option<TransferDirection>,
    #[serde(default)]
    pub description: Option<String>,
    pub total: i64,
    pub serial_number: String,
    pub timestamp: DateTime<Utc>,
    pub actor_id: UserId,
    pub finalized: bool,
    #[serde(default)]
    pub skip_audit: bool,
}

impl TransactionRecord {
    pub fn from_operation(
        id: TransactionId,
        op: &ClassifiedOperation,
        location_id: LocationId,
        serial_number: String,
        actor_id: UserId,
    ) -> Self {
        Self {
            id,
            op_type: op.op_type,
            location_id,
            unit_id: op.unit_id.clone(),
            item_id: op.item_id.clone(),
            grade_id: op.grade_id.clone(),
            quantity_kg: op.quantity_kg,
            raw_used_kg: op.raw_used_kg,
            price_per_kg: op.price_per_kg,
            amount: op.amount,
            payment_method: op.payment_method,
            transfer_direction: op.transfer_direction,
            description: op.description.clone(),
            total: op.total,
            serial_number,
            timestamp: op.occurred_at,
            actor_id,
            finalized: true,
            skip_audit: op.skip_audit,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreateTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDeltaSummary {
    pub wallet_id: String,
    pub delta: i64,
    pub balance_after: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDeltaSummary {
    pub stock_key: String,
    pub delta_kg: Decimal,
}

/// Audit trail entry written in the same commit as its transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub transaction_id: TransactionId,
    pub action: AuditAction,
    pub performed_by: UserId,
    pub timestamp: DateTime<Utc>,
    pub serial_number: String,
    pub wallet_deltas: Vec<WalletDeltaSummary>,
    pub stock_deltas: Vec<StockDeltaSummary>,
}

impl AuditLogEntry {
    pub fn for_commit(
        record: &TransactionRecord,
        wallet_writes: &[WalletWrite],
        stock_deltas: &[StockDelta],
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            transaction_id: record.id,
            action: AuditAction::CreateTransaction,
            performed_by: record.actor_id.clone(),
            timestamp: recorded_at,
            serial_number: record.serial_number.clone(),
            wallet_deltas: wallet_writes
                .iter()
                .map(|w| WalletDeltaSummary {
                    wallet_id: w.wallet.id.to_string(),
                    delta: w.delta,
                    balance_after: w.wallet.balance,
                })
                .collect(),
            stock_deltas: stock_deltas
                .iter()
                .map(|d| StockDeltaSummary {
                    stock_key: d.key.as_key(),
                    delta_kg: d.delta_kg,
                })
                .collect(),
        }
    }
}

/// Lifecycle of a posting inside the commit coordinator.
///
/// Only `Rejected` and `Committed` are ever observable from outside.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Requested,
    Validating,
    Rejected,
    Committing,
    Committed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Rejected | TransactionState::Committed)
    }

    pub fn transition(self, next: TransactionState) -> DomainResult<TransactionState> {
        use TransactionState::*;

        let allowed = matches!(
            (self, next),
            (Requested, Validating)
                | (Requested, Rejected)
                | (Validating, Rejected)
                | (Validating, Committing)
                | (Committing, Committed)
                | (Committing, Rejected)
                // A conflicting commit is re-validated from a fresh snapshot.
                | (Committing, Validating)
        );
        if allowed {
            Ok(next)
        } else {
            Err(DomainError::conflict(format!(
                "illegal transaction state transition {self:?} -> {next:?}"
            )))
        }
    }
}
