use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role assigned to a user profile.
///
/// The set is closed: an unknown role string never maps to a default role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Head-office administrator. Trusted to post for any location.
    HqAdmin,
    /// Site manager. Every write is pinned to the assigned location.
    LocManager,
    /// Unit operator. May not post ledger operations directly.
    UnitOp,
    /// Read-only viewer.
    ReadOnly,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::HqAdmin => "HQ_ADMIN",
            Role::LocManager => "LOC_MANAGER",
            Role::UnitOp => "UNIT_OP",
            Role::ReadOnly => "READ_ONLY",
        }
    }

    /// Permissions granted by this role.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::HqAdmin => &[
                Permission::PostOperation,
                Permission::RunProduction,
                Permission::ManageLots,
                Permission::Reconcile,
            ],
            Role::LocManager => &[
                Permission::PostOperation,
                Permission::RunProduction,
                Permission::ManageLots,
            ],
            Role::UnitOp | Role::ReadOnly => &[],
        }
    }

    /// Whether a claimed location must be replaced by the profile's scope.
    pub fn is_location_scoped(&self) -> bool {
        !matches!(self, Role::HqAdmin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HQ_ADMIN" => Ok(Role::HqAdmin),
            "LOC_MANAGER" => Ok(Role::LocManager),
            "UNIT_OP" => Ok(Role::UnitOp),
            "READ_ONLY" => Ok(Role::ReadOnly),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles() {
        assert_eq!("HQ_ADMIN".parse::<Role>().unwrap(), Role::HqAdmin);
        assert_eq!(" LOC_MANAGER ".parse::<Role>().unwrap(), Role::LocManager);
    }

    #[test]
    fn unknown_roles_do_not_fall_through() {
        assert!("hq_admin".parse::<Role>().is_err());
        assert!("SUPERUSER".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Role::UnitOp).unwrap();
        assert_eq!(json, "\"UNIT_OP\"");
    }

    #[test]
    fn unit_operators_hold_no_write_permissions() {
        assert!(Role::UnitOp.permissions().is_empty());
        assert!(Role::HqAdmin.permissions().contains(&Permission::Reconcile));
        assert!(!Role::LocManager.permissions().contains(&Permission::Reconcile));
    }
}
