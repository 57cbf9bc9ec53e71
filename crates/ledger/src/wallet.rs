//! Site cash wallets.
//!
//! A wallet is either the head-office wallet (`HQ`) or a location wallet keyed
//! by its location id. Balances are whole rupiah and never go negative, HQ
//! included.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bahari_core::{DomainError, DomainResult, LocationId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletKind {
    Hq,
    Location,
}

/// Wallet identifier: `HQ` or a location id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    pub const HQ: &'static str = "HQ";

    pub fn hq() -> Self {
        Self(Self::HQ.to_string())
    }

    pub fn location(location_id: &LocationId) -> Self {
        Self(location_id.as_str().to_string())
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        if raw.trim() == Self::HQ {
            return Ok(Self::hq());
        }
        let loc = LocationId::new(raw)?;
        Ok(Self::location(&loc))
    }

    pub fn kind(&self) -> WalletKind {
        if self.0 == Self::HQ {
            WalletKind::Hq
        } else {
            WalletKind::Location
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for WalletId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted wallet document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub balance: i64,
    pub kind: WalletKind,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(id: WalletId, balance: i64, updated_at: DateTime<Utc>) -> Self {
        let kind = id.kind();
        Self {
            id,
            balance,
            kind,
            updated_at,
        }
    }
}

/// Which side of the HQ/location pair a movement touches, before the
/// location is known.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletSide {
    Hq,
    Location,
}

/// Cash movement requested by a classified operation.
///
/// `source` is debited and `target` credited; either may be absent for
/// one-sided movements (expenses, sales, bank deposits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletMovement {
    pub source: Option<WalletSide>,
    pub target: Option<WalletSide>,
    pub amount: i64,
}

impl WalletMovement {
    pub fn debit(side: WalletSide, amount: i64) -> Self {
        Self {
            source: Some(side),
            target: None,
            amount,
        }
    }

    pub fn credit(side: WalletSide, amount: i64) -> Self {
        Self {
            source: None,
            target: Some(side),
            amount,
        }
    }

    pub fn transfer(source: WalletSide, target: WalletSide, amount: i64) -> Self {
        Self {
            source: Some(source),
            target: Some(target),
            amount,
        }
    }

    /// Bind the movement to concrete wallet ids.
    ///
    /// A transfer whose source and target resolve to the same wallet is
    /// rejected as invalid input.
    pub fn resolve(&self, location_id: &LocationId) -> DomainResult<ResolvedMovement> {
        let bind = |side: WalletSide| match side {
            WalletSide::Hq => WalletId::hq(),
            WalletSide::Location => WalletId::location(location_id),
        };
        let source = self.source.map(bind);
        let target = self.target.map(bind);

        if let (Some(s), Some(t)) = (&source, &target) {
            if s == t {
                return Err(DomainError::validation(format!(
                    "cash transfer source and target are both wallet {s}"
                )));
            }
        }

        Ok(ResolvedMovement {
            source,
            target,
            amount: self.amount,
        })
    }
}

/// A movement bound to concrete wallets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMovement {
    pub source: Option<WalletId>,
    pub target: Option<WalletId>,
    pub amount: i64,
}

/// A wallet document to write, plus the delta that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletWrite {
    pub wallet: Wallet,
    pub delta: i64,
    /// True when the wallet did not exist before this write.
    pub created: bool,
}

impl ResolvedMovement {
    /// Wallet ids that must be pre-read before planning.
    pub fn wallet_ids(&self) -> Vec<WalletId> {
        self.source.iter().chain(self.target.iter()).cloned().collect()
    }

    /// Validate the movement against a snapshot and compute the resulting
    /// wallet documents.
    ///
    /// The source must exist and hold at least `amount`; a missing target is
    /// created with `amount` as its opening balance.
    pub fn plan(
        &self,
        source_snapshot: Option<&Wallet>,
        target_snapshot: Option<&Wallet>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<WalletWrite>> {
        let mut writes = Vec::with_capacity(2);

        if let Some(source_id) = &self.source {
            let wallet = source_snapshot
                .ok_or_else(|| DomainError::precondition(format!("wallet {source_id} does not exist")))?;
            if wallet.balance < self.amount {
                return Err(DomainError::precondition(format!(
                    "insufficient funds in wallet {source_id} (balance {}, required {})",
                    wallet.balance, self.amount
                )));
            }
            writes.push(WalletWrite {
                wallet: Wallet::new(source_id.clone(), wallet.balance - self.amount, now),
                delta: -self.amount,
                created: false,
            });
        }

        if let Some(target_id) = &self.target {
            let (balance, created) = match target_snapshot {
                Some(wallet) => {
                    let balance = wallet.balance.checked_add(self.amount).ok_or_else(|| {
                        DomainError::precondition(format!("wallet {target_id} balance overflow"))
                    })?;
                    (balance, false)
                }
                None => (self.amount, true),
            };
            writes.push(WalletWrite {
                wallet: Wallet::new(target_id.clone(), balance, now),
                delta: self.amount,
                created,
            });
        }

        Ok(writes)
    }
}
