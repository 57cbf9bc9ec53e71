//! Ledger & inventory domain module.
//!
//! Business rules for postings, wallets, aggregate stock, serial numbers,
//! lot genealogy and wallet reconciliation, implemented purely as
//! deterministic domain logic (no IO, no storage, no clocks).

pub mod lot;
pub mod operation;
pub mod production;
pub mod reconcile;
pub mod serial;
pub mod stock;
pub mod transaction;
pub mod wallet;

pub use lot::{InventoryLot, LotIntake, LotOrigin, LotSourceType, LotState, LotStatus, TraceLink, TraceLinkType};
pub use operation::{
    ClassifiedOperation, OperationRequest, OperationType, PaymentMethod, TransferDirection, classify,
};
pub use production::{
    LedgerAccount, LedgerDirection, LedgerEntry, LedgerLine, LotLinks, ProductionInput,
    PRODUCTION_ID_PREFIX, ProductionOutput, ProductionPlan, ProductionReceipt, ProductionRequest,
    ledger_entry_id, plan_production,
};
pub use reconcile::{ReplayOutcome, TransferReplayRule, replay_wallets, wallet_effects};
pub use serial::{Counter, CounterKey, SerialPrefix, location_code};
pub use stock::{StockDelta, StockEntry, StockKey};
pub use transaction::{AuditAction, AuditLogEntry, TransactionRecord, TransactionState};
pub use wallet::{ResolvedMovement, Wallet, WalletId, WalletKind, WalletMovement, WalletSide, WalletWrite};
