//! Strongly-typed identifiers used across the domain.
//!
//! Business identifiers (`kaimana`, `frozen_fish`, `kakap_merah`, ...) are
//! human-chosen slugs, so most ids wrap a validated `String`. Transaction ids
//! are generated server-side and use UUIDv7.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a site (e.g. `kaimana`). Scopes wallets, stock and lots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationId(String);

/// Identifier of a processing unit within a location (e.g. `frozen_fish`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(String);

/// Identifier of a catalogue item / species (e.g. `kakap_merah`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

/// Quality grade of processed stock (e.g. `A`, `B`, `NA`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GradeId(String);

/// Identifier of a discrete inventory lot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LotId(String);

/// Identifier of an authenticated actor, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

/// Identifier of a committed transaction record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

macro_rules! impl_slug_newtype {
    ($t:ident, $name:literal) => {
        impl_slug_newtype!($t, $name, ['/']);
    };
    ($t:ident, $name:literal, [$($reserved:literal),+]) => {
        impl $t {
            /// Validate and wrap a raw identifier.
            ///
            /// Identifiers are trimmed; empty values and reserved characters
            /// (`/` is the storage path separator) are rejected.
            pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: empty", $name)));
                }
                $(
                    if trimmed.contains($reserved) {
                        return Err(DomainError::invalid_id(format!(
                            "{}: '{}' is not allowed ({trimmed})",
                            $name, $reserved
                        )));
                    }
                )+
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_slug_newtype!(LocationId, "LocationId");
impl_slug_newtype!(UnitId, "UnitId");
impl_slug_newtype!(ItemId, "ItemId");
// Grades form the last segment of `COLD_{item}_{grade}` stock keys, and items
// may contain `_`, so grades may not.
impl_slug_newtype!(GradeId, "GradeId", ['/', '_']);
impl_slug_newtype!(LotId, "LotId");
impl_slug_newtype!(UserId, "UserId");

impl GradeId {
    /// Grade recorded when the caller omits one.
    pub const NOT_APPLICABLE: &'static str = "NA";

    pub fn not_applicable() -> Self {
        Self(Self::NOT_APPLICABLE.to_string())
    }
}

impl TransactionId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TransactionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("TransactionId: {e}")))?;
        Ok(Self(uuid))
    }
}
