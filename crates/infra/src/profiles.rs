//! User-profile directory collaborator.
//!
//! Identity itself (who the caller is) is established upstream; this lookup
//! only answers which role and scope a known user holds.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bahari_auth::{AuthzError, Principal, ProfileRecord};
use bahari_core::UserId;

use crate::document_store::StoreError;
use crate::error::CommitError;

pub trait ProfileDirectory: Send + Sync {
    fn profile(&self, user_id: &UserId) -> Result<Option<ProfileRecord>, StoreError>;
}

impl<P> ProfileDirectory for Arc<P>
where
    P: ProfileDirectory + ?Sized,
{
    fn profile(&self, user_id: &UserId) -> Result<Option<ProfileRecord>, StoreError> {
        (**self).profile(user_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProfileDirectory {
    inner: RwLock<HashMap<UserId, ProfileRecord>>,
}

impl InMemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, user_id: UserId, record: ProfileRecord) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        map.insert(user_id, record);
        Ok(())
    }

    /// Convenience for seeding: role plus optional location scope.
    pub fn assign(&self, user_id: UserId, role: &str, target_id: Option<&str>) -> Result<(), StoreError> {
        self.upsert(
            user_id,
            ProfileRecord {
                role: Some(role.to_string()),
                target_id: target_id.map(str::to_string),
            },
        )
    }
}

impl ProfileDirectory for InMemoryProfileDirectory {
    fn profile(&self, user_id: &UserId) -> Result<Option<ProfileRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(user_id).cloned())
    }
}

/// Turn an authenticated caller into a principal.
///
/// A caller without a profile is treated like one without a role.
pub fn resolve_principal<P>(profiles: &P, caller: Option<&UserId>) -> Result<Principal, CommitError>
where
    P: ProfileDirectory + ?Sized,
{
    let user_id = caller.ok_or(AuthzError::Unauthenticated)?;
    let record = profiles.profile(user_id)?.unwrap_or_default();
    Ok(Principal::resolve(user_id.clone(), &record)?)
}
