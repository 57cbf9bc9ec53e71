//! Transactional document store boundary.
//!
//! Every shared record (counters, wallets, stock entries, lots, ...) lives in a
//! versioned document. Writers commit a batch of operations together with the
//! versions they read; the store applies the whole batch or nothing.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
pub use r#trait::{Collection, DocKey, DocumentStore, StoreError, VersionedDocument, WriteBatch, WriteOp};

use serde::de::DeserializeOwned;

/// Decode a stored document into its typed form.
pub fn decode<T: DeserializeOwned>(key: &DocKey, doc: VersionedDocument) -> Result<T, StoreError> {
    serde_json::from_value(doc.data).map_err(|e| StoreError::Serialization(format!("{key}: {e}")))
}
