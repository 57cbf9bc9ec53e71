use serde::{Deserialize, Serialize};

/// Capability checked at the write boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Post a classified operation through the commit coordinator.
    PostOperation,
    /// Run a lot-based production event.
    RunProduction,
    /// Register intake lots and retire lots (sold, transferred, expired).
    ManageLots,
    /// Run the offline wallet reconciliation job.
    Reconcile,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::PostOperation => "ledger.post",
            Permission::RunProduction => "production.run",
            Permission::ManageLots => "lots.manage",
            Permission::Reconcile => "ledger.reconcile",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
