use serde::{Deserialize, Serialize};

use bahari_core::{LocationId, UserId};

use crate::{AuthzError, Role};

/// User profile as returned by the identity collaborator.
///
/// Fields stay raw strings here; `Principal::resolve` turns them into typed
/// values and rejects anything it does not recognise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub role: Option<String>,
    /// Assigned scope (a location id for managers).
    pub target_id: Option<String>,
}

/// A fully resolved caller for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub scope: Option<LocationId>,
}

impl Principal {
    pub fn resolve(user_id: UserId, record: &ProfileRecord) -> Result<Self, AuthzError> {
        let raw_role = record
            .role
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or(AuthzError::NoRole)?;
        let role = raw_role.parse::<Role>().map_err(AuthzError::Forbidden)?;

        let scope = match record.target_id.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(
                LocationId::new(raw).map_err(|e| AuthzError::Forbidden(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            user_id,
            role,
            scope,
        })
    }
}
