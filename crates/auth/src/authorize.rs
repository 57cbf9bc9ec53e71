use thiserror::Error;
use tracing::warn;

use bahari_core::LocationId;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("no role assigned to caller")]
    NoRole,

    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// Outcome of scope enforcement: the location the write will actually use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDecision {
    pub location_id: LocationId,
    /// True when the claimed location was replaced by the caller's scope.
    pub overridden: bool,
}

/// Check that a principal holds a permission.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, required: Permission) -> Result<(), AuthzError> {
    if principal.role.permissions().contains(&required) {
        return Ok(());
    }

    let reason = match principal.role {
        Role::UnitOp => format!("unit operators cannot use '{required}' directly"),
        role => format!("role {role} lacks permission '{required}'"),
    };
    Err(AuthzError::Forbidden(reason))
}

/// Authorize a write and resolve which location it applies to.
///
/// HQ admins are a trust boundary: the claimed location is used as-is.
/// Location managers always write to their assigned location; a differing
/// claim is logged and silently replaced, never surfaced to the caller.
pub fn enforce_scope(
    principal: &Principal,
    claimed: &LocationId,
    required: Permission,
) -> Result<ScopeDecision, AuthzError> {
    authorize(principal, required)?;

    if !principal.role.is_location_scoped() {
        return Ok(ScopeDecision {
            location_id: claimed.clone(),
            overridden: false,
        });
    }

    let scope = principal.scope.clone().ok_or_else(|| {
        AuthzError::Forbidden(format!("{} has no assigned location", principal.role))
    })?;

    let overridden = &scope != claimed;
    if overridden {
        warn!(
            user_id = %principal.user_id,
            claimed = %claimed,
            assigned = %scope,
            "claimed location differs from assigned scope; overriding"
        );
    }

    Ok(ScopeDecision {
        location_id: scope,
        overridden,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bahari_core::UserId;

    fn principal(role: Role, scope: Option<&str>) -> Principal {
        Principal {
            user_id: UserId::new("u-1").unwrap(),
            role,
            scope: scope.map(|s| LocationId::new(s).unwrap()),
        }
    }

    fn loc(s: &str) -> LocationId {
        LocationId::new(s).unwrap()
    }

    #[test]
    fn hq_admin_claim_is_trusted() {
        let decision = enforce_scope(
            &principal(Role::HqAdmin, None),
            &loc("sorong"),
            Permission::PostOperation,
        )
        .unwrap();
        assert_eq!(decision.location_id, loc("sorong"));
        assert!(!decision.overridden);
    }

    #[test]
    fn manager_claim_is_overridden() {
        let decision = enforce_scope(
            &principal(Role::LocManager, Some("kaimana")),
            &loc("sorong"),
            Permission::PostOperation,
        )
        .unwrap();
        assert_eq!(decision.location_id, loc("kaimana"));
        assert!(decision.overridden);
    }

    #[test]
    fn manager_without_scope_is_denied() {
        let err = enforce_scope(
            &principal(Role::LocManager, None),
            &loc("kaimana"),
            Permission::PostOperation,
        )
        .unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(_)));
    }

    #[test]
    fn unit_operator_cannot_post() {
        let err = enforce_scope(
            &principal(Role::UnitOp, Some("kaimana")),
            &loc("kaimana"),
            Permission::PostOperation,
        )
        .unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(msg) if msg.contains("unit operators")));
    }

    #[test]
    fn reconcile_requires_hq_admin() {
        assert!(authorize(&principal(Role::HqAdmin, None), Permission::Reconcile).is_ok());
        assert!(authorize(&principal(Role::LocManager, Some("kaimana")), Permission::Reconcile).is_err());
        assert!(authorize(&principal(Role::ReadOnly, None), Permission::Reconcile).is_err());
    }
}
