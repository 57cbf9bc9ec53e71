//! Production genealogy engine and lot queries.
//!
//! Production runs are idempotent on `(unitId, operationId)`: the ledger entry
//! id is derived from both, and its existence is checked inside the same
//! transaction that would create it. Two concurrent runs with the same id
//! therefore conflict on commit; the loser retries, finds the entry, and
//! returns the recorded result without writing anything.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn};

use bahari_auth::{Permission, Principal, authorize, enforce_scope};
use bahari_core::{DomainError, LotId, UserId};
use bahari_ledger::{
    InventoryLot, LedgerEntry, LotIntake, LotState, ProductionReceipt, ProductionRequest, TraceLink,
    ledger_entry_id, plan_production,
};

use crate::config::LedgerConfig;
use crate::document_store::{Collection, DocKey, DocumentStore, StoreError, decode};
use crate::error::CommitError;
use crate::profiles::{ProfileDirectory, resolve_principal};
use crate::unit_of_work::run_transaction;

fn lot_doc(id: &LotId) -> DocKey {
    DocKey::new(Collection::Lots, id.as_str())
}

fn entry_doc(id: &str) -> DocKey {
    DocKey::new(Collection::LedgerEntries, id)
}

/// Writes lots, trace links and production ledger entries.
pub struct ProductionEngine<S, P> {
    store: S,
    profiles: P,
    config: LedgerConfig,
}

impl<S, P> ProductionEngine<S, P>
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

    pub fn run(&self, caller: Option<&UserId>, request: ProductionRequest) -> Result<ProductionReceipt, CommitError> {
        self.run_at(caller, request, Utc::now())
    }

    /// Execute a production run with an explicit clock.
    pub fn run_at(
        &self,
        caller: Option<&UserId>,
        request: ProductionRequest,
        now: DateTime<Utc>,
    ) -> Result<ProductionReceipt, CommitError> {
        let span = info_span!(
            "production_run",
            operation_id = %request.operation_id,
            unit_id = %request.unit_id
        );
        let _guard = span.enter();

        let principal = resolve_principal(&self.profiles, caller)?;
        let location_id = enforce_scope(&principal, &request.location_id, Permission::RunProduction)?.location_id;
        request.validate()?;
        if request.actor_user_id != principal.user_id {
            warn!(
                claimed_actor = %request.actor_user_id,
                caller = %principal.user_id,
                "actorUserId differs from caller; recording caller"
            );
        }

        let entry_key = entry_doc(&ledger_entry_id(&request.unit_id, &request.operation_id));
        let receipt = run_transaction(&self.store, self.config.max_commit_attempts, |tx| {
            if let Some(existing) = tx.get::<LedgerEntry>(&entry_key)? {
                if existing.unit_id != request.unit_id || existing.operation_id != request.operation_id.trim() {
                    return Err(CommitError::FailedPrecondition(format!(
                        "ledger entry {} belongs to unit {} operation {}",
                        existing.id, existing.unit_id, existing.operation_id
                    )));
                }
                return Ok(ProductionReceipt::from_entry(&existing, true));
            }

            let mut inputs = Vec::with_capacity(request.input_lots.len());
            for input in &request.input_lots {
                inputs.push(tx.get::<InventoryLot>(&lot_doc(&input.lot_id))?);
            }

            let plan = plan_production(&request, &location_id, &principal.user_id, &inputs, now)?;
            for lot in &plan.output_lots {
                if tx.get::<InventoryLot>(&lot_doc(&lot.id))?.is_some() {
                    return Err(CommitError::FailedPrecondition(format!(
                        "output lot {} already exists",
                        lot.id
                    )));
                }
            }

            for lot in &plan.consumed_lots {
                tx.set(lot_doc(&lot.id), lot)?;
            }
            for lot in &plan.output_lots {
                tx.create(lot_doc(&lot.id), lot)?;
            }
            for link in &plan.trace_links {
                tx.create(DocKey::new(Collection::TraceLinks, link.id.as_str()), link)?;
            }
            tx.create(entry_key.clone(), &plan.entry)?;

            Ok::<_, CommitError>(ProductionReceipt::from_entry(&plan.entry, false))
        });

        match &receipt {
            Ok(r) if r.replayed => info!(ledger_entry_id = %r.ledger_entry_id, "production run already recorded"),
            Ok(r) => info!(
                ledger_entry_id = %r.ledger_entry_id,
                outputs = r.output_lot_ids.len(),
                links = r.trace_link_ids.len(),
                "production run committed"
            ),
            Err(e) => warn!(code = e.code(), error = %e, "production run rejected"),
        }
        receipt
    }

    /// Register a lot received from outside production (receiving, stock
    /// adjustment).
    pub fn receive_lot(&self, caller: Option<&UserId>, intake: LotIntake) -> Result<InventoryLot, CommitError> {
        let principal = resolve_principal(&self.profiles, caller)?;
        let location_id = enforce_scope(&principal, &intake.location_id, Permission::ManageLots)?.location_id;
        let lot = intake.into_lot(location_id, Utc::now())?;
        let key = lot_doc(&lot.id);

        run_transaction(&self.store, self.config.max_commit_attempts, |tx| {
            if tx.get::<InventoryLot>(&key)?.is_some() {
                return Err(CommitError::FailedPrecondition(format!("lot {} already exists", lot.id)));
            }
            tx.create(key.clone(), &lot)?;
            Ok(lot.clone())
        })
        .inspect(|lot| info!(lot_id = %lot.id, location_id = %lot.location_id, unit_id = %lot.unit_id, "lot received"))
    }

    /// Move an active lot to `SOLD`, `TRANSFERRED` or `EXPIRED`.
    pub fn retire_lot(
        &self,
        caller: Option<&UserId>,
        lot_id: &LotId,
        to: LotState,
    ) -> Result<InventoryLot, CommitError> {
        let principal = resolve_principal(&self.profiles, caller)?;
        authorize(&principal, Permission::ManageLots)?;
        let key = lot_doc(lot_id);

        run_transaction(&self.store, self.config.max_commit_attempts, |tx| {
            let lot: InventoryLot = tx
                .get(&key)?
                .ok_or_else(|| DomainError::not_found(format!("lot {lot_id}")))?;
            check_lot_scope(&principal, &lot)?;
            let retired = lot.retire(to)?;
            tx.set(key.clone(), &retired)?;
            Ok::<_, CommitError>(retired)
        })
        .inspect(|lot| info!(lot_id = %lot.id, state = ?lot.state, "lot retired"))
    }
}

fn check_lot_scope(principal: &Principal, lot: &InventoryLot) -> Result<(), CommitError> {
    if principal.role.is_location_scoped() && principal.scope.as_ref() != Some(&lot.location_id) {
        return Err(CommitError::PermissionDenied(format!(
            "lot {} belongs to location {}",
            lot.id, lot.location_id
        )));
    }
    Ok(())
}

/// Read-only genealogy queries for recall and audit.
pub struct GenealogyQuery<S> {
    store: S,
}

impl<S: DocumentStore> GenealogyQuery<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn lot(&self, id: &LotId) -> Result<Option<InventoryLot>, StoreError> {
        let key = lot_doc(id);
        self.store.get(&key)?.map(|d| decode(&key, d)).transpose()
    }

    pub fn ledger_entry(&self, id: &str) -> Result<Option<LedgerEntry>, StoreError> {
        let key = entry_doc(id);
        self.store.get(&key)?.map(|d| decode(&key, d)).transpose()
    }

    /// Every lot derived, directly or transitively, from `lot`.
    pub fn trace_forward(&self, lot: &LotId) -> Result<Vec<LotId>, StoreError> {
        let edges = self.edges(|l| (l.from_lot_id, l.to_lot_id))?;
        Ok(walk(&edges, lot))
    }

    /// Every lot that went, directly or transitively, into `lot`.
    pub fn trace_backward(&self, lot: &LotId) -> Result<Vec<LotId>, StoreError> {
        let edges = self.edges(|l| (l.to_lot_id, l.from_lot_id))?;
        Ok(walk(&edges, lot))
    }

    /// Trace links written by one production run.
    pub fn links_for_event(&self, ledger_entry_id: &str) -> Result<Vec<TraceLink>, StoreError> {
        Ok(self
            .links()?
            .into_iter()
            .filter(|l| l.event_id == ledger_entry_id)
            .collect())
    }

    fn links(&self) -> Result<Vec<TraceLink>, StoreError> {
        self.store
            .list(Collection::TraceLinks)?
            .into_iter()
            .map(|(id, doc)| decode(&DocKey::new(Collection::TraceLinks, id), doc))
            .collect()
    }

    fn edges(
        &self,
        orient: impl Fn(TraceLink) -> (LotId, LotId),
    ) -> Result<BTreeMap<LotId, Vec<LotId>>, StoreError> {
        let mut edges: BTreeMap<LotId, Vec<LotId>> = BTreeMap::new();
        for link in self.links()? {
            let (from, to) = orient(link);
            edges.entry(from).or_default().push(to);
        }
        Ok(edges)
    }
}

/// Breadth-first reachability, excluding the start lot.
fn walk(edges: &BTreeMap<LotId, Vec<LotId>>, start: &LotId) -> Vec<LotId> {
    let mut seen = BTreeSet::from([start.clone()]);
    let mut queue = VecDeque::from([start.clone()]);
    let mut found = Vec::new();

    while let Some(current) = queue.pop_front() {
        for next in edges.get(&current).into_iter().flatten() {
            if seen.insert(next.clone()) {
                found.push(next.clone());
                queue.push_back(next.clone());
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::{InMemoryDocumentStore, WriteBatch, WriteOp};
    use crate::profiles::InMemoryProfileDirectory;
    use bahari_core::{ItemId, LocationId, UnitId};
    use bahari_ledger::{LotSourceType, LotStatus, ProductionInput, ProductionOutput};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    type Engine = ProductionEngine<Arc<InMemoryDocumentStore>, Arc<InMemoryProfileDirectory>>;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn lot_id(id: &str) -> LotId {
        LotId::new(id).unwrap()
    }

    fn setup() -> (Engine, GenealogyQuery<Arc<InMemoryDocumentStore>>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let profiles = Arc::new(InMemoryProfileDirectory::new());
        profiles.assign(user("mgr"), "LOC_MANAGER", Some("kaimana")).unwrap();
        profiles.assign(user("mgr-sorong"), "LOC_MANAGER", Some("sorong")).unwrap();
        profiles.assign(user("viewer"), "READ_ONLY", None).unwrap();
        (
            ProductionEngine::new(store.clone(), profiles, LedgerConfig::default()),
            GenealogyQuery::new(store),
        )
    }

    fn intake(id: &str, qty: Decimal) -> LotIntake {
        LotIntake {
            lot_id: lot_id(id),
            location_id: LocationId::new("kaimana").unwrap(),
            unit_id: UnitId::new("frozen_fish").unwrap(),
            item_id: ItemId::new("kakap_merah").unwrap(),
            grade_id: None,
            status: LotStatus::Raw,
            quantity_kg: qty,
            source_type: LotSourceType::Receiving,
            source_ref_id: "RCV-KAI-26-0001".into(),
        }
    }

    fn run(op: &str, inputs: &[(&str, Decimal)], outputs: &[Decimal]) -> ProductionRequest {
        ProductionRequest {
            operation_id: op.into(),
            location_id: LocationId::new("kaimana").unwrap(),
            unit_id: UnitId::new("frozen_fish").unwrap(),
            input_lots: inputs
                .iter()
                .map(|(id, q)| ProductionInput {
                    lot_id: lot_id(id),
                    quantity_kg: *q,
                })
                .collect(),
            output_lots: outputs
                .iter()
                .map(|q| ProductionOutput {
                    item_id: ItemId::new("kakap_merah_fillet").unwrap(),
                    grade_id: None,
                    status: LotStatus::Frozen,
                    quantity_kg: *q,
                })
                .collect(),
            cost_per_kg_idr: None,
            actor_user_id: user("mgr"),
            notes: None,
        }
    }

    #[test]
    fn duplicate_lot_intake_is_rejected() {
        let (engine, _) = setup();
        engine.receive_lot(Some(&user("mgr")), intake("lot-a", dec!(10))).unwrap();
        let err = engine.receive_lot(Some(&user("mgr")), intake("lot-a", dec!(10))).unwrap_err();
        assert_eq!(err.code(), "failed-precondition");
    }

    #[test]
    fn read_only_cannot_manage_lots() {
        let (engine, _) = setup();
        let err = engine.receive_lot(Some(&user("viewer")), intake("lot-a", dec!(10))).unwrap_err();
        assert_eq!(err.code(), "permission-denied");
    }

    #[test]
    fn retire_respects_location_scope_and_lifecycle() {
        let (engine, query) = setup();
        engine.receive_lot(Some(&user("mgr")), intake("lot-a", dec!(10))).unwrap();

        let err = engine
            .retire_lot(Some(&user("mgr-sorong")), &lot_id("lot-a"), LotState::Sold)
            .unwrap_err();
        assert_eq!(err.code(), "permission-denied");

        let sold = engine
            .retire_lot(Some(&user("mgr")), &lot_id("lot-a"), LotState::Sold)
            .unwrap();
        assert_eq!(sold.state, LotState::Sold);
        assert_eq!(query.lot(&lot_id("lot-a")).unwrap().unwrap().state, LotState::Sold);

        let again = engine
            .retire_lot(Some(&user("mgr")), &lot_id("lot-a"), LotState::Expired)
            .unwrap_err();
        assert_eq!(again.code(), "failed-precondition");
    }

    #[test]
    fn retired_lot_cannot_be_consumed() {
        let (engine, _) = setup();
        engine.receive_lot(Some(&user("mgr")), intake("lot-a", dec!(10))).unwrap();
        engine
            .retire_lot(Some(&user("mgr")), &lot_id("lot-a"), LotState::Expired)
            .unwrap();

        let err = engine
            .run(Some(&user("mgr")), run("batch-1", &[("lot-a", dec!(5))], &[dec!(4)]))
            .unwrap_err();
        assert_eq!(err.code(), "failed-precondition");
    }

    #[test]
    fn intake_cannot_take_a_production_lot_id() {
        let (engine, _) = setup();
        let err = engine
            .receive_lot(
                Some(&user("mgr")),
                intake("produce-frozen_fish-batch-1-out-01", dec!(10)),
            )
            .unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
    }

    #[test]
    fn occupied_output_lot_fails_without_retrying() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let profiles = Arc::new(InMemoryProfileDirectory::new());
        profiles.assign(user("mgr"), "LOC_MANAGER", Some("kaimana")).unwrap();
        let engine = ProductionEngine::new(store.clone(), profiles, LedgerConfig::default());
        engine.receive_lot(Some(&user("mgr")), intake("lot-a", dec!(10))).unwrap();

        let squatter = intake("lot-x", dec!(1))
            .into_lot(LocationId::new("kaimana").unwrap(), Utc::now())
            .unwrap();
        store
            .commit(WriteBatch {
                preconditions: Vec::new(),
                writes: vec![WriteOp::Create {
                    key: lot_doc(&lot_id("produce-frozen_fish-batch-1-out-01")),
                    data: serde_json::to_value(&squatter).unwrap(),
                }],
            })
            .unwrap();

        let err = engine
            .run(Some(&user("mgr")), run("batch-1", &[("lot-a", dec!(5))], &[dec!(4)]))
            .unwrap_err();
        assert_eq!(err.code(), "failed-precondition");
        assert_eq!(
            GenealogyQuery::new(store).lot(&lot_id("lot-a")).unwrap().unwrap().quantity_kg_remaining,
            dec!(10)
        );
    }

    #[test]
    fn colliding_entry_id_from_another_unit_is_not_replayed() {
        let (engine, _) = setup();
        for (lot, unit) in [("lot-a", "frozen"), ("lot-b", "frozen-fish")] {
            let mut raw = intake(lot, dec!(10));
            raw.unit_id = UnitId::new(unit).unwrap();
            engine.receive_lot(Some(&user("mgr")), raw).unwrap();
        }

        let mut first = run("fish-batch-1", &[("lot-a", dec!(5))], &[dec!(4)]);
        first.unit_id = UnitId::new("frozen").unwrap();
        engine.run(Some(&user("mgr")), first).unwrap();

        let mut second = run("batch-1", &[("lot-b", dec!(5))], &[dec!(4)]);
        second.unit_id = UnitId::new("frozen-fish").unwrap();
        let err = engine.run(Some(&user("mgr")), second).unwrap_err();
        assert_eq!(err.code(), "failed-precondition");
    }

    #[test]
    fn genealogy_is_traversed_across_runs() {
        let (engine, query) = setup();
        engine.receive_lot(Some(&user("mgr")), intake("lot-a", dec!(100))).unwrap();
        engine.receive_lot(Some(&user("mgr")), intake("lot-b", dec!(50))).unwrap();

        let first = engine
            .run(
                Some(&user("mgr")),
                run("batch-1", &[("lot-a", dec!(100)), ("lot-b", dec!(20))], &[dec!(60), dec!(30)]),
            )
            .unwrap();
        let fillet = first.output_lot_ids[0].clone();
        let second = engine
            .run(Some(&user("mgr")), run("batch-2", &[(fillet.as_str(), dec!(60))], &[dec!(58)]))
            .unwrap();
        let packed = second.output_lot_ids[0].clone();

        let forward = query.trace_forward(&lot_id("lot-b")).unwrap();
        assert_eq!(forward.len(), 3);
        assert!(forward.contains(&packed));

        let backward = query.trace_backward(&packed).unwrap();
        assert_eq!(backward.len(), 3);
        assert!(backward.contains(&lot_id("lot-a")));
        assert!(backward.contains(&lot_id("lot-b")));

        assert_eq!(query.links_for_event(&first.ledger_entry_id).unwrap().len(), 4);
        let entry = query.ledger_entry(&first.ledger_entry_id).unwrap().unwrap();
        assert_eq!(entry.actor_id, user("mgr"));
        assert_eq!(query.lot(&lot_id("lot-a")).unwrap().unwrap().state, LotState::Consumed);
    }
}
