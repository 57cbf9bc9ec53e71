//! `bahari`: offline ledger tooling.
//!
//! - `reconcile`: replay a JSON export of wallets and transactions and report
//!   (or apply) corrected wallet balances.
//! - `classify`: preview the totals and deltas of a posting request without
//!   touching any store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::json;

use bahari_core::{ExpectedVersion, UserId};
use bahari_infra::document_store::{Collection, DocKey, WriteBatch, WriteOp, decode};
use bahari_infra::{DocumentStore, InMemoryDocumentStore, InMemoryProfileDirectory, ReconciliationJob, ReconciliationReport};
use bahari_ledger::{OperationRequest, TransactionRecord, TransferReplayRule, Wallet, WalletId, classify};

#[derive(Parser, Debug)]
#[clap(name = "bahari", version = env!("CARGO_PKG_VERSION"), about = "Offline tools for the bahari ledger")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute wallet balances from transaction history
    Reconcile {
        /// JSON export with `wallets` and `transactions` arrays
        #[clap(long)]
        input: PathBuf,
        /// Wallet to reconcile (repeatable); defaults to every wallet in the export
        #[clap(long = "wallet")]
        wallets: Vec<String>,
        /// How recorded cash transfers are interpreted
        #[clap(long, value_enum, default_value = "inbound-from-hq")]
        rule: RuleArg,
        /// Write corrected balances instead of only reporting them
        #[clap(long)]
        apply: bool,
        /// Where to write the corrected export (requires --apply)
        #[clap(long)]
        output: Option<PathBuf>,
        /// User id recorded as the operator of this run
        #[clap(long, default_value = "offline-reconciler")]
        operator: String,
    },
    /// Classify a posting request read from a JSON file
    Classify {
        #[clap(long)]
        input: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RuleArg {
    InboundFromHq,
    LocationSideOnly,
}

impl From<RuleArg> for TransferReplayRule {
    fn from(value: RuleArg) -> Self {
        match value {
            RuleArg::InboundFromHq => TransferReplayRule::InboundFromHq,
            RuleArg::LocationSideOnly => TransferReplayRule::LocationSideOnly,
        }
    }
}

/// Offline export format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerExport {
    #[serde(default)]
    wallets: Vec<Wallet>,
    #[serde(default)]
    transactions: Vec<TransactionRecord>,
}

fn main() -> Result<()> {
    bahari_observability::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Reconcile {
            input,
            wallets,
            rule,
            apply,
            output,
            operator,
        } => {
            if output.is_some() && !apply {
                bail!("--output requires --apply");
            }
            let export = read_export(&input)?;
            let operator = UserId::new(operator).context("invalid --operator")?;
            let (report, corrected) = reconcile(export, &wallets, rule.into(), apply, &operator)?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(path) = output {
                let body = serde_json::to_string_pretty(&corrected)?;
                fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
                tracing::info!(path = %path.display(), "corrected export written");
            }
        }
        Command::Classify { input } => {
            let raw = fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
            let request: OperationRequest =
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", input.display()))?;
            let op = classify(&request, Utc::now())?;
            let preview = json!({
                "type": op.op_type,
                "total": op.total,
                "serialPrefix": op.serial_prefix().as_str(),
                "stockDeltas": op.stock_deltas,
                "walletMovement": op.wallet_movement.map(|m| json!({
                    "source": m.source,
                    "target": m.target,
                    "amount": m.amount,
                })),
                "yieldPct": op.yield_pct,
                "occurredAt": op.occurred_at,
            });
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
    }
    Ok(())
}

fn read_export(path: &Path) -> Result<LedgerExport> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Load the export into a scratch store, run the job as an HQ admin, and
/// return the report together with the (possibly corrected) export.
fn reconcile(
    export: LedgerExport,
    wallets: &[String],
    rule: TransferReplayRule,
    apply: bool,
    operator: &UserId,
) -> Result<(ReconciliationReport, LedgerExport)> {
    let store = Arc::new(InMemoryDocumentStore::new());
    let profiles = Arc::new(InMemoryProfileDirectory::new());
    profiles.assign(operator.clone(), "HQ_ADMIN", None)?;

    let mut writes = Vec::with_capacity(export.wallets.len() + export.transactions.len());
    for wallet in &export.wallets {
        writes.push(WriteOp::Put {
            key: DocKey::new(Collection::Wallets, wallet.id.as_str()),
            data: serde_json::to_value(wallet)?,
            expected: ExpectedVersion::absent(),
        });
    }
    for record in &export.transactions {
        writes.push(WriteOp::Create {
            key: DocKey::new(Collection::Transactions, record.id.to_string()),
            data: serde_json::to_value(record)?,
        });
    }
    store
        .commit(WriteBatch {
            preconditions: Vec::new(),
            writes,
        })
        .context("loading export")?;

    let targets: Vec<WalletId> = if wallets.is_empty() {
        export.wallets.iter().map(|w| w.id.clone()).collect()
    } else {
        wallets
            .iter()
            .map(|w| WalletId::parse(w))
            .collect::<Result<_, _>>()
            .context("invalid --wallet")?
    };

    let report = ReconciliationJob::new(store.clone(), profiles)
        .with_rule(rule)
        .run(Some(operator), &targets, !apply)?;

    let mut corrected = Vec::new();
    for (id, doc) in store.list(Collection::Wallets)? {
        corrected.push(decode::<Wallet>(&DocKey::new(Collection::Wallets, id), doc)?);
    }
    Ok((
        report,
        LedgerExport {
            wallets: corrected,
            transactions: export.transactions,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "wallets": [
            {"id": "HQ", "balance": 9000, "kind": "HQ", "updatedAt": "2026-01-01T00:00:00Z"},
            {"id": "kaimana", "balance": 4000, "kind": "LOCATION", "updatedAt": "2026-01-01T00:00:00Z"}
        ],
        "transactions": [
            {"id": "01890a5d-ac96-774b-bcce-b302099a8057", "type": "BANK_DEPOSIT", "locationId": "kaimana",
             "amount": 9000, "total": 9000, "serialNumber": "TXN-KAI-26-0001",
             "timestamp": "2026-01-02T08:00:00Z", "actorId": "hq", "finalized": true},
            {"id": "01890a5d-ac96-774b-bcce-b302099a8058", "type": "CASH_TRANSFER", "locationId": "kaimana",
             "amount": 4000, "transferDirection": "IN", "total": 4000, "serialNumber": "TXN-KAI-26-0002",
             "timestamp": "2026-01-02T09:00:00Z", "actorId": "hq", "finalized": true}
        ]
    }"#;

    fn operator() -> UserId {
        UserId::new("offline-reconciler").unwrap()
    }

    #[test]
    fn dry_run_reports_without_changing_export() {
        let export: LedgerExport = serde_json::from_str(EXPORT).unwrap();
        let (report, corrected) =
            reconcile(export, &[], TransferReplayRule::InboundFromHq, false, &operator()).unwrap();

        assert_eq!(report.corrected_transfers, 1);
        let hq = report.wallets.iter().find(|w| w.wallet_id == WalletId::hq()).unwrap();
        assert_eq!(hq.after, 5000);
        assert!(corrected.wallets.iter().any(|w| w.id == WalletId::hq() && w.balance == 9000));
    }

    #[test]
    fn apply_rewrites_named_wallet_only() {
        let export: LedgerExport = serde_json::from_str(EXPORT).unwrap();
        let (_, corrected) = reconcile(
            export,
            &["HQ".to_string()],
            TransferReplayRule::InboundFromHq,
            true,
            &operator(),
        )
        .unwrap();

        let balance = |id: &WalletId| corrected.wallets.iter().find(|w| &w.id == id).unwrap().balance;
        assert_eq!(balance(&WalletId::hq()), 5000);
        assert_eq!(balance(&WalletId::parse("kaimana").unwrap()), 4000);
        assert_eq!(corrected.transactions.len(), 2);
    }

    #[test]
    fn cli_parses_reconcile_flags() {
        let cli = Cli::try_parse_from([
            "bahari", "reconcile", "--input", "export.json", "--wallet", "HQ", "--rule", "location-side-only",
        ])
        .unwrap();
        match cli.command {
            Command::Reconcile { wallets, rule, apply, .. } => {
                assert_eq!(wallets, vec!["HQ".to_string()]);
                assert!(matches!(rule, RuleArg::LocationSideOnly));
                assert!(!apply);
            }
            Command::Classify { .. } => panic!("expected reconcile"),
        }
    }
}
