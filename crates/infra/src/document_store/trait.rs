use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use bahari_core::ExpectedVersion;

/// Document collections.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Counters,
    Wallets,
    Stock,
    Transactions,
    AuditLogs,
    LedgerEntries,
    Lots,
    TraceLinks,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Counters => "counters",
            Collection::Wallets => "wallets",
            Collection::Stock => "stock",
            Collection::Transactions => "transactions",
            Collection::AuditLogs => "audit_logs",
            Collection::LedgerEntries => "ledger_entries",
            Collection::Lots => "inventory_lots",
            Collection::TraceLinks => "trace_links",
        }
    }
}

/// Address of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    pub collection: Collection,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }
}

impl core::fmt::Display for DocKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.collection.as_str(), self.id)
    }
}

/// A stored document and its version.
///
/// Versions start at 1 on creation and increase by one per write; an absent
/// document is treated as version 0.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDocument {
    pub version: u64,
    pub data: JsonValue,
}

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace (or create) the whole document.
    Put {
        key: DocKey,
        data: JsonValue,
        expected: ExpectedVersion,
    },
    /// Create a document that must not exist yet.
    Create { key: DocKey, data: JsonValue },
    /// Add `delta` to a decimal field, creating the document if needed, and
    /// overwrite the fields in `set`. Commutative with other increments.
    Increment {
        key: DocKey,
        field: String,
        delta: Decimal,
        set: Map<String, JsonValue>,
    },
}

impl WriteOp {
    pub fn key(&self) -> &DocKey {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Create { key, .. } | WriteOp::Increment { key, .. } => key,
        }
    }
}

/// An atomic unit: version preconditions plus the writes to apply if they all
/// hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub preconditions: Vec<(DocKey, ExpectedVersion)>,
    pub writes: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty() && self.writes.is_empty()
    }
}

/// Document store operation error.
///
/// These are infrastructure errors; business failures are `DomainError`s.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A document changed since it was read, or a create hit an existing
    /// document. Safe to retry from scratch.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),

    /// A transaction tried to read after it had started writing.
    #[error("read after write in transaction: {0}")]
    ReadAfterWrite(String),

    #[error("document store lock poisoned")]
    Poisoned,

    #[error("invalid write: {0}")]
    Invalid(String),
}

/// Versioned document store with all-or-nothing batch commits.
///
/// Implementations must:
/// - check every precondition and apply every write under one critical
///   section (no partially applied batch is ever visible)
/// - reject a `Create` for an existing document with `StoreError::Concurrency`
/// - bump a document's version by one per write
pub trait DocumentStore: Send + Sync {
    fn get(&self, key: &DocKey) -> Result<Option<VersionedDocument>, StoreError>;

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// All documents in a collection, ordered by id.
    fn list(&self, collection: Collection) -> Result<Vec<(String, VersionedDocument)>, StoreError>;
}

impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn get(&self, key: &DocKey) -> Result<Option<VersionedDocument>, StoreError> {
        (**self).get(key)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        (**self).commit(batch)
    }

    fn list(&self, collection: Collection) -> Result<Vec<(String, VersionedDocument)>, StoreError> {
        (**self).list(collection)
    }
}
