//! Wallet balance replay.
//!
//! Recomputes wallet balances from transaction history by folding every
//! record through a per-type reducer. The reducer mirrors the live wallet
//! effects of the classifier, except for cash transfers, whose historical
//! records were written single-sided and are re-interpreted according to a
//! [`TransferReplayRule`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use bahari_core::{DomainError, DomainResult};

use crate::operation::{OperationType, PaymentMethod, TransferDirection};
use crate::transaction::TransactionRecord;
use crate::wallet::WalletId;

/// How recorded cash transfers are replayed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferReplayRule {
    /// Assume every inbound transfer was head office sending cash to the
    /// location, and move both wallets. Outbound transfers move the location
    /// to head office. Reversed transfers recorded as inbound are
    /// misclassified under this rule.
    #[default]
    InboundFromHq,
    /// Reproduce the historical single-sided write: only the location
    /// wallet moves. Useful for comparing against pre-repair balances.
    LocationSideOnly,
}

/// Signed wallet effects of a single record.
pub fn wallet_effects(record: &TransactionRecord, rule: TransferReplayRule) -> Vec<(WalletId, i64)> {
    let location = WalletId::location(&record.location_id);
    let total = record.total;
    // Records predating payment methods were cash.
    let is_cash = matches!(record.payment_method, None | Some(PaymentMethod::Cash));

    match record.op_type {
        OperationType::PurchaseReceive | OperationType::Expense if is_cash => vec![(location, -total)],
        OperationType::PurchaseReceive | OperationType::Expense => Vec::new(),
        OperationType::LocalSale => vec![(location, total)],
        OperationType::SaleInvoice | OperationType::ColdStorageIn => Vec::new(),
        OperationType::BankDeposit => vec![(WalletId::hq(), total)],
        OperationType::CashTransfer => {
            let inbound = !matches!(record.transfer_direction, Some(TransferDirection::Out));
            match (rule, inbound) {
                (TransferReplayRule::InboundFromHq, true) => vec![(WalletId::hq(), -total), (location, total)],
                (TransferReplayRule::InboundFromHq, false) => vec![(location, -total), (WalletId::hq(), total)],
                (TransferReplayRule::LocationSideOnly, true) => vec![(location, total)],
                (TransferReplayRule::LocationSideOnly, false) => vec![(location, -total)],
            }
        }
    }
}

/// Result of replaying history over a set of wallets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayOutcome {
    pub balances: BTreeMap<WalletId, i64>,
    /// Records that touched at least one of the replayed wallets.
    pub replayed: usize,
    /// Inbound transfers whose head-office side was restored.
    pub corrected_transfers: usize,
    /// Wallets that ended below zero.
    pub negative_wallets: Vec<WalletId>,
}

/// Reset `wallets` to zero and fold `history` over them in chronological
/// order. Effects on wallets outside the set are ignored.
pub fn replay_wallets(
    wallets: &[WalletId],
    history: &[TransactionRecord],
    rule: TransferReplayRule,
) -> DomainResult<ReplayOutcome> {
    let targets: BTreeSet<&WalletId> = wallets.iter().collect();
    let mut outcome = ReplayOutcome {
        balances: wallets.iter().map(|w| (w.clone(), 0)).collect(),
        ..ReplayOutcome::default()
    };

    let mut ordered: Vec<&TransactionRecord> = history.iter().collect();
    ordered.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.serial_number.cmp(&b.serial_number))
    });

    for record in ordered {
        let effects = wallet_effects(record, rule);
        let mut touched = false;
        for (wallet, delta) in effects {
            if !targets.contains(&wallet) {
                continue;
            }
            let balance = outcome.balances.entry(wallet.clone()).or_insert(0);
            *balance = balance
                .checked_add(delta)
                .ok_or_else(|| DomainError::validation(format!("wallet {wallet} overflows during replay")))?;
            touched = true;
        }
        if touched {
            outcome.replayed += 1;
            if rule == TransferReplayRule::InboundFromHq
                && record.op_type == OperationType::CashTransfer
                && record.transfer_direction != Some(TransferDirection::Out)
            {
                outcome.corrected_transfers += 1;
            }
        }
    }

    outcome.negative_wallets = outcome
        .balances
        .iter()
        .filter(|(_, b)| **b < 0)
        .map(|(w, _)| w.clone())
        .collect();
    Ok(outcome)
}
