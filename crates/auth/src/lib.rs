//! `bahari-auth`: role-based scope enforcement for ledger writes.
//!
//! This crate is intentionally decoupled from identity providers and storage:
//! callers hand in the profile record the identity collaborator returned.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, ScopeDecision, authorize, enforce_scope};
pub use permissions::Permission;
pub use principal::{Principal, ProfileRecord};
pub use roles::Role;
