//! Transaction commit coordinator.
//!
//! Posts one classified operation as a single atomic unit:
//!
//! ```text
//! request
//!   ↓ resolve principal, enforce scope, classify   (no document reads)
//!   ↓ 1. pre-read   counter, wallet(s), consumed stock entries
//!   ↓ 2. validate   next serial, wallet funds, stock sufficiency
//!   ↓ 3. write      counter, wallet(s), stock increments, record, audit log
//!   ↓ commit        (conflict → re-run 1..3, bounded)
//! receipt
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, info_span, warn};

use bahari_auth::{Permission, enforce_scope};
use bahari_core::{LocationId, TransactionId, UnitId, UserId};
use bahari_ledger::{
    AuditLogEntry, Counter, CounterKey, OperationRequest, StockDelta, StockEntry, TransactionRecord,
    TransactionState, Wallet, WalletId, classify,
};

use crate::config::LedgerConfig;
use crate::document_store::{Collection, DocKey, DocumentStore, StoreError};
use crate::error::CommitError;
use crate::profiles::{ProfileDirectory, resolve_principal};
use crate::unit_of_work::{Transaction, run_transaction};

/// Result of a committed posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingReceipt {
    pub success: bool,
    pub id: TransactionId,
    pub serial_number: String,
    pub total: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yield_pct: Option<Decimal>,
}

/// Commits postings against a document store.
///
/// There is no idempotency key: a client that retries a post after a lost
/// response will apply the operation twice. Production runs, by contrast,
/// are deduplicated by operation id (see `ProductionEngine`).
pub struct CommitCoordinator<S, P> {
    store: S,
    profiles: P,
    config: LedgerConfig,
}

impl<S, P> CommitCoordinator<S, P>
where
    S: DocumentStore,
    P: ProfileDirectory,
{
    pub fn new(store: S, profiles: P, config: LedgerConfig) -> Self {
        Self {
            store,
            profiles,
            config,
        }
    }

    pub fn post(&self, caller: Option<&UserId>, request: OperationRequest) -> Result<PostingReceipt, CommitError> {
        self.post_at(caller, request, Utc::now())
    }

    /// Post with an explicit clock.
    pub fn post_at(
        &self,
        caller: Option<&UserId>,
        request: OperationRequest,
        now: DateTime<Utc>,
    ) -> Result<PostingReceipt, CommitError> {
        let span = info_span!(
            "post_operation",
            op_type = %request.op_type,
            claimed_location = %request.location_id
        );
        let _guard = span.enter();

        let mut state = TransactionState::Requested;
        match self.execute(caller, &request, now, &mut state) {
            Ok(receipt) => {
                let state = state.transition(TransactionState::Committed)?;
                info!(
                    transaction_id = %receipt.id,
                    serial_number = %receipt.serial_number,
                    total = receipt.total,
                    ?state,
                    "operation committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                let state = state.transition(TransactionState::Rejected)?;
                warn!(code = err.code(), error = %err, ?state, "operation rejected");
                Err(err)
            }
        }
    }

    fn execute(
        &self,
        caller: Option<&UserId>,
        request: &OperationRequest,
        now: DateTime<Utc>,
        state: &mut TransactionState,
    ) -> Result<PostingReceipt, CommitError> {
        let principal = resolve_principal(&self.profiles, caller)?;
        *state = state.transition(TransactionState::Validating)?;

        let scope = enforce_scope(&principal, &request.location_id, Permission::PostOperation)?;
        let location_id = scope.location_id;
        let op = classify(request, now)?;
        let movement = op
            .wallet_movement
            .as_ref()
            .map(|m| m.resolve(&location_id))
            .transpose()?;
        let unit_id = match (&op.unit_id, op.stock_deltas.is_empty()) {
            (_, true) => None,
            (Some(unit), false) => Some(unit.clone()),
            (None, false) => return Err(CommitError::InvalidArgument("unitId is required".into())),
        };

        let counter_key = CounterKey::new(op.serial_prefix(), &location_id, op.occurred_at);
        let counter_doc = DocKey::new(Collection::Counters, counter_key.document_id());
        let transaction_id = TransactionId::new();

        run_transaction(&self.store, self.config.max_commit_attempts, |tx| {
            if *state == TransactionState::Committing {
                *state = state.transition(TransactionState::Validating)?;
            }

            // 1) Pre-read everything the write may touch.
            let counter: Counter = tx.get(&counter_doc)?.unwrap_or_default();
            let (source, target) = match &movement {
                Some(m) => (read_wallet(tx, m.source.as_ref())?, read_wallet(tx, m.target.as_ref())?),
                None => (None, None),
            };
            let mut consumed: Vec<(&StockDelta, Option<StockEntry>)> = Vec::new();
            if let Some(unit) = &unit_id {
                for delta in op.stock_deltas.iter().filter(|d| d.is_consumption()) {
                    let entry = tx.get(&stock_doc(&location_id, unit, delta))?;
                    consumed.push((delta, entry));
                }
            }
            debug!(
                counter_seq = counter.seq,
                source_balance = source.as_ref().map(|w| w.balance),
                target_balance = target.as_ref().map(|w| w.balance),
                consumed_entries = consumed.len(),
                "pre-read snapshot"
            );

            // 2) Validate against the snapshot.
            let next = counter.next();
            let serial_number = counter_key.serial(next.seq);
            let wallet_writes = match &movement {
                Some(m) => m.plan(source.as_ref(), target.as_ref(), now)?,
                None => Vec::new(),
            };
            for (delta, entry) in &consumed {
                delta.check_sufficient(entry.as_ref())?;
            }
            *state = state.transition(TransactionState::Committing)?;

            // 3) Write.
            tx.set(counter_doc.clone(), &next)?;
            for write in &wallet_writes {
                tx.set(wallet_doc(&write.wallet.id), &write.wallet)?;
            }
            if let Some(unit) = &unit_id {
                for delta in &op.stock_deltas {
                    tx.increment(
                        stock_doc(&location_id, unit, delta),
                        "quantityKg",
                        delta.delta_kg,
                        stock_fields(&location_id, unit, delta, now),
                    );
                }
            }

            let record = TransactionRecord::from_operation(
                transaction_id,
                &op,
                location_id.clone(),
                serial_number.clone(),
                principal.user_id.clone(),
            );
            tx.create(DocKey::new(Collection::Transactions, transaction_id.to_string()), &record)?;
            let audit = AuditLogEntry::for_commit(&record, &wallet_writes, &op.stock_deltas, now);
            tx.create(DocKey::new(Collection::AuditLogs, audit.id.to_string()), &audit)?;

            Ok(PostingReceipt {
                success: true,
                id: transaction_id,
                serial_number: serial_number.clone(),
                total: op.total,
                message: format!("{} recorded as {serial_number}", op.op_type),
                yield_pct: op.yield_pct,
            })
        })
    }
}

pub(crate) fn wallet_doc(id: &WalletId) -> DocKey {
    DocKey::new(Collection::Wallets, id.as_str())
}

fn stock_doc(location_id: &LocationId, unit_id: &UnitId, delta: &StockDelta) -> DocKey {
    DocKey::new(Collection::Stock, delta.key.document_id(location_id, unit_id))
}

fn read_wallet<S>(tx: &mut Transaction<'_, S>, id: Option<&WalletId>) -> Result<Option<Wallet>, StoreError>
where
    S: DocumentStore + ?Sized,
{
    match id {
        Some(id) => tx.get(&wallet_doc(id)),
        None => Ok(None),
    }
}

fn stock_fields(
    location_id: &LocationId,
    unit_id: &UnitId,
    delta: &StockDelta,
    now: DateTime<Utc>,
) -> Map<String, JsonValue> {
    let mut set = Map::new();
    set.insert("locationId".into(), JsonValue::from(location_id.as_str()));
    set.insert("unitId".into(), JsonValue::from(unit_id.as_str()));
    set.insert("itemId".into(), JsonValue::from(delta.key.item_id().as_str()));
    set.insert("grade".into(), JsonValue::from(delta.key.grade().as_str()));
    set.insert("updatedAt".into(), JsonValue::from(now.to_rfc3339()));
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;
    use crate::profiles::InMemoryProfileDirectory;
    use bahari_core::{ItemId, LocationId};
    use bahari_ledger::{OperationType, TransferDirection};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn kaimana() -> LocationId {
        LocationId::new("kaimana").unwrap()
    }

    fn setup() -> (
        CommitCoordinator<Arc<InMemoryDocumentStore>, Arc<InMemoryProfileDirectory>>,
        Arc<InMemoryDocumentStore>,
    ) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let profiles = Arc::new(InMemoryProfileDirectory::new());
        profiles.assign(user("hq"), "HQ_ADMIN", None).unwrap();
        profiles.assign(user("mgr"), "LOC_MANAGER", Some("kaimana")).unwrap();
        profiles.assign(user("op"), "UNIT_OP", Some("kaimana")).unwrap();
        let coordinator = CommitCoordinator::new(store.clone(), profiles, LedgerConfig::default());
        (coordinator, store)
    }

    fn wallet(store: &InMemoryDocumentStore, id: WalletId) -> Option<Wallet> {
        store
            .get(&wallet_doc(&id))
            .unwrap()
            .map(|d| serde_json::from_value(d.data).unwrap())
    }

    fn deposit(amount: i64) -> OperationRequest {
        let mut req = OperationRequest::new(OperationType::BankDeposit, kaimana());
        req.amount = Some(amount);
        req
    }

    #[test]
    fn serials_increase_per_counter() {
        let (coordinator, _) = setup();
        let first = coordinator.post(Some(&user("hq")), deposit(100)).unwrap();
        let second = coordinator.post(Some(&user("hq")), deposit(100)).unwrap();

        assert!(first.serial_number.starts_with("TXN-KAI-"));
        assert!(first.serial_number.ends_with("-0001"));
        assert!(second.serial_number.ends_with("-0002"));
    }

    #[test]
    fn manager_claim_is_overridden_to_scope() {
        let (coordinator, store) = setup();
        coordinator.post(Some(&user("hq")), deposit(1_000_000)).unwrap();

        let mut transfer = OperationRequest::new(OperationType::CashTransfer, LocationId::new("sorong").unwrap());
        transfer.amount = Some(250_000);
        transfer.transfer_direction = Some(TransferDirection::In);
        transfer.description = Some("modal".into());
        coordinator.post(Some(&user("mgr")), transfer).unwrap();

        assert_eq!(wallet(&store, WalletId::location(&kaimana())).unwrap().balance, 250_000);
        assert!(wallet(&store, WalletId::location(&LocationId::new("sorong").unwrap())).is_none());
    }

    #[test]
    fn unit_operator_cannot_post() {
        let (coordinator, store) = setup();
        let err = coordinator.post(Some(&user("op")), deposit(100)).unwrap_err();
        assert_eq!(err.code(), "permission-denied");
        assert!(store.list(Collection::Transactions).unwrap().is_empty());
    }

    #[test]
    fn anonymous_and_roleless_callers_are_rejected() {
        let (coordinator, _) = setup();
        assert_eq!(coordinator.post(None, deposit(1)).unwrap_err().code(), "unauthenticated");
        assert_eq!(
            coordinator.post(Some(&user("nobody")), deposit(1)).unwrap_err().code(),
            "permission-denied"
        );
    }

    #[test]
    fn insufficient_stock_writes_nothing() {
        let (coordinator, store) = setup();
        let mut req = OperationRequest::new(OperationType::ColdStorageIn, kaimana());
        req.unit_id = Some(UnitId::new("frozen_fish").unwrap());
        req.item_id = Some(ItemId::new("kakap_merah").unwrap());
        req.quantity_kg = Some(dec!(10));

        let err = coordinator.post(Some(&user("hq")), req).unwrap_err();

        assert_eq!(err.code(), "failed-precondition");
        assert!(store.list(Collection::Counters).unwrap().is_empty());
        assert!(store.list(Collection::Stock).unwrap().is_empty());
        assert!(store.list(Collection::AuditLogs).unwrap().is_empty());
    }

    #[test]
    fn commit_writes_record_and_audit_log() {
        let (coordinator, store) = setup();
        let receipt = coordinator.post(Some(&user("hq")), deposit(5_000)).unwrap();

        let doc = store
            .get(&DocKey::new(Collection::Transactions, receipt.id.to_string()))
            .unwrap()
            .unwrap();
        let record: TransactionRecord = serde_json::from_value(doc.data).unwrap();
        assert_eq!(record.serial_number, receipt.serial_number);
        assert_eq!(record.actor_id, user("hq"));
        assert!(record.finalized);

        let audits = store.list(Collection::AuditLogs).unwrap();
        assert_eq!(audits.len(), 1);
        let audit: AuditLogEntry = serde_json::from_value(audits[0].1.data.clone()).unwrap();
        assert_eq!(audit.transaction_id, receipt.id);
        assert_eq!(audit.wallet_deltas[0].balance_after, 5_000);
    }
}
