//! Offline wallet reconciliation.
//!
//! Resets the named wallets, replays the full transaction history through the
//! wallet reducer and overwrites the stored balances with the result. The job
//! assumes exclusive access to the wallets it repairs: it writes final values
//! directly instead of issuing deltas.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use bahari_auth::{Permission, authorize};
use bahari_core::{ExpectedVersion, UserId};
use bahari_ledger::{TransactionRecord, TransferReplayRule, Wallet, WalletId, replay_wallets};

use crate::coordinator::wallet_doc;
use crate::document_store::{Collection, DocKey, DocumentStore, StoreError, WriteBatch, WriteOp, decode};
use crate::error::CommitError;
use crate::profiles::{ProfileDirectory, resolve_principal};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReconciliation {
    pub wallet_id: WalletId,
    /// Stored balance before the run, if the wallet existed.
    pub before: Option<i64>,
    pub after: i64,
}

impl WalletReconciliation {
    pub fn drift(&self) -> i64 {
        self.after - self.before.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub dry_run: bool,
    pub rule: TransferReplayRule,
    pub wallets: Vec<WalletReconciliation>,
    pub replayed: usize,
    pub corrected_transfers: usize,
    pub negative_wallets: Vec<WalletId>,
    pub completed_at: DateTime<Utc>,
}

pub struct ReconciliationJob<S, P> {
    store: S,
    profiles: P,
    rule: TransferReplayRule,
}

impl<S, P> ReconciliationJob<S, P>
where
    S: DocumentStore,
    P: ProfileDirectory,
{
    pub fn new(store: S, profiles: P) -> Self {
        Self {
            store,
            profiles,
            rule: TransferReplayRule::default(),
        }
    }

    pub fn with_rule(mut self, rule: TransferReplayRule) -> Self {
        self.rule = rule;
        self
    }

    /// Recompute `wallets` from history. With `dry_run` nothing is written.
    pub fn run(
        &self,
        caller: Option<&UserId>,
        wallets: &[WalletId],
        dry_run: bool,
    ) -> Result<ReconciliationReport, CommitError> {
        let span = info_span!("reconcile_wallets", wallets = wallets.len(), dry_run);
        let _guard = span.enter();

        let principal = resolve_principal(&self.profiles, caller)?;
        authorize(&principal, Permission::Reconcile)?;
        if wallets.is_empty() {
            return Err(CommitError::InvalidArgument("at least one wallet is required".into()));
        }

        let history = self.load_history()?;
        let mut before = BTreeMap::new();
        for id in wallets {
            let key = wallet_doc(id);
            let stored: Option<Wallet> = self.store.get(&key)?.map(|d| decode(&key, d)).transpose()?;
            before.insert(id.clone(), stored.map(|w| w.balance));
        }

        let outcome = replay_wallets(wallets, &history, self.rule)?;
        for id in &outcome.negative_wallets {
            warn!(wallet_id = %id, balance = outcome.balances.get(id).copied().unwrap_or_default(), "replayed balance is negative");
        }

        let now = Utc::now();
        if !dry_run {
            let writes = outcome
                .balances
                .iter()
                .map(|(id, balance)| {
                    let wallet = Wallet::new(id.clone(), *balance, now);
                    serde_json::to_value(&wallet)
                        .map(|data| WriteOp::Put {
                            key: wallet_doc(id),
                            data,
                            expected: ExpectedVersion::Any,
                        })
                        .map_err(|e| StoreError::Serialization(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.store.commit(WriteBatch {
                preconditions: Vec::new(),
                writes,
            })?;
        }

        let report = ReconciliationReport {
            dry_run,
            rule: self.rule,
            wallets: outcome
                .balances
                .iter()
                .map(|(id, after)| WalletReconciliation {
                    wallet_id: id.clone(),
                    before: before.get(id).copied().flatten(),
                    after: *after,
                })
                .collect(),
            replayed: outcome.replayed,
            corrected_transfers: outcome.corrected_transfers,
            negative_wallets: outcome.negative_wallets,
            completed_at: now,
        };
        info!(
            replayed = report.replayed,
            corrected_transfers = report.corrected_transfers,
            "reconciliation finished"
        );
        Ok(report)
    }

    fn load_history(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        self.store
            .list(Collection::Transactions)?
            .into_iter()
            .map(|(id, doc)| decode(&DocKey::new(Collection::Transactions, id), doc))
            .collect()
    }
}
