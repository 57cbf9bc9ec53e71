//! Runtime configuration for the ledger services.

use tracing::warn;

use bahari_ledger::WalletId;

pub const MAX_COMMIT_ATTEMPTS_ENV: &str = "BAHARI_MAX_COMMIT_ATTEMPTS";
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Total attempts (first try included) before a conflicting commit is
    /// surfaced as aborted.
    pub max_commit_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

impl LedgerConfig {
    /// Load from the environment; unset or invalid values use defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_COMMIT_ATTEMPTS_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.max_commit_attempts = n,
                _ => warn!(
                    var = MAX_COMMIT_ATTEMPTS_ENV,
                    value = %raw,
                    default = DEFAULT_MAX_COMMIT_ATTEMPTS,
                    "invalid value; using default"
                ),
            }
        }
        config
    }

    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }

    pub fn hq_wallet_id(&self) -> WalletId {
        WalletId::hq()
    }
}
