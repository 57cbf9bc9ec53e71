//! Read-then-write transactions over a `DocumentStore`.
//!
//! A `Transaction` collects the version of every document it reads and the
//! writes it intends to make. Reads are only allowed before the first write.
//! On commit the read versions become preconditions, so a concurrent change
//! to anything the transaction looked at aborts it. `run_transaction` re-runs
//! the whole body on such a conflict, up to a bounded number of attempts.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use bahari_core::ExpectedVersion;

use crate::document_store::{DocKey, DocumentStore, StoreError, WriteBatch, WriteOp};

pub struct Transaction<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    reads: HashMap<DocKey, u64>,
    writes: Vec<WriteOp>,
}

impl<'a, S: DocumentStore + ?Sized> Transaction<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            reads: HashMap::new(),
            writes: Vec::new(),
        }
    }

    /// Read and decode a document, recording its version.
    pub fn get<T: DeserializeOwned>(&mut self, key: &DocKey) -> Result<Option<T>, StoreError> {
        if !self.writes.is_empty() {
            return Err(StoreError::ReadAfterWrite(key.to_string()));
        }

        let doc = self.store.get(key)?;
        self.reads
            .insert(key.clone(), doc.as_ref().map(|d| d.version).unwrap_or(0));

        doc.map(|d| {
            serde_json::from_value(d.data).map_err(|e| StoreError::Serialization(format!("{key}: {e}")))
        })
        .transpose()
    }

    /// Replace a document. If it was read in this transaction the write is
    /// conditional on that version.
    pub fn set<T: Serialize>(&mut self, key: DocKey, value: &T) -> Result<(), StoreError> {
        let expected = self
            .reads
            .get(&key)
            .map(|v| ExpectedVersion::Exact(*v))
            .unwrap_or(ExpectedVersion::Any);
        let data = to_json(&key, value)?;
        self.writes.push(WriteOp::Put { key, data, expected });
        Ok(())
    }

    /// Create a document that must not already exist.
    pub fn create<T: Serialize>(&mut self, key: DocKey, value: &T) -> Result<(), StoreError> {
        let data = to_json(&key, value)?;
        self.writes.push(WriteOp::Create { key, data });
        Ok(())
    }

    /// Signed increment of a decimal field (upsert).
    pub fn increment(
        &mut self,
        key: DocKey,
        field: impl Into<String>,
        delta: Decimal,
        set: Map<String, JsonValue>,
    ) {
        self.writes.push(WriteOp::Increment {
            key,
            field: field.into(),
            delta,
            set,
        });
    }

    fn into_batch(self) -> WriteBatch {
        WriteBatch {
            preconditions: self
                .reads
                .into_iter()
                .map(|(k, v)| (k, ExpectedVersion::Exact(v)))
                .collect(),
            writes: self.writes,
        }
    }
}

fn to_json<T: Serialize>(key: &DocKey, value: &T) -> Result<JsonValue, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(format!("{key}: {e}")))
}

/// Run `body` inside a transaction and commit its writes atomically.
///
/// - An error returned by `body` aborts without writing and is not retried.
/// - A commit conflict re-runs `body` from scratch, at most `max_attempts`
///   times in total; the last conflict is returned when attempts run out.
/// - A body that performs no writes commits nothing (its reads are not
///   re-validated).
pub fn run_transaction<S, T, E, F>(store: &S, max_attempts: u32, mut body: F) -> Result<T, E>
where
    S: DocumentStore + ?Sized,
    E: From<StoreError>,
    F: FnMut(&mut Transaction<'_, S>) -> Result<T, E>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let mut tx = Transaction::new(store);
        let value = body(&mut tx)?;

        if tx.writes.is_empty() {
            return Ok(value);
        }

        match store.commit(tx.into_batch()) {
            Ok(()) => {
                debug!(attempt, "transaction committed");
                return Ok(value);
            }
            Err(StoreError::Concurrency(msg)) if attempt < max_attempts => {
                warn!(attempt, max_attempts, reason = %msg, "transaction conflict; retrying");
                attempt += 1;
            }
            Err(e) => return Err(E::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::{Collection, InMemoryDocumentStore};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        n: u64,
    }

    fn key() -> DocKey {
        DocKey::new(Collection::Counters, "RCV_KAI_26")
    }

    #[test]
    fn read_after_write_is_rejected() {
        let store = InMemoryDocumentStore::new();
        let result: Result<(), StoreError> = run_transaction(&store, 1, |tx| {
            tx.set(key(), &Doc { n: 1 })?;
            let _: Option<Doc> = tx.get(&key())?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::ReadAfterWrite(_))));
        assert!(store.get(&key()).unwrap().is_none());
    }

    #[test]
    fn conflicting_commit_is_retried() {
        let store = InMemoryDocumentStore::new();
        let mut attempts = 0;

        let result: Result<u64, StoreError> = run_transaction(&store, 3, |tx| {
            attempts += 1;
            let current: Option<Doc> = tx.get(&key())?;
            if attempts == 1 {
                // Simulate another writer landing between our read and commit.
                let mut other = Transaction::new(&store);
                other.set(key(), &Doc { n: 10 })?;
                store.commit(other.into_batch())?;
            }
            let next = current.map(|d| d.n).unwrap_or(0) + 1;
            tx.set(key(), &Doc { n: next })?;
            Ok(next)
        });

        assert_eq!(result.unwrap(), 11);
        assert_eq!(attempts, 2);
    }

    #[test]
    fn exhausted_retries_surface_the_conflict() {
        let store = InMemoryDocumentStore::new();
        let result: Result<(), StoreError> = run_transaction(&store, 2, |tx| {
            let _: Option<Doc> = tx.get(&key())?;
            let mut other = Transaction::new(&store);
            other.set(key(), &Doc { n: 0 })?;
            store.commit(other.into_batch())?;
            tx.set(key(), &Doc { n: 1 })?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::Concurrency(_))));
    }

    #[test]
    fn body_error_writes_nothing() {
        let store = InMemoryDocumentStore::new();
        let result: Result<(), StoreError> = run_transaction(&store, 3, |tx| {
            tx.create(key(), &Doc { n: 1 })?;
            Err(StoreError::Invalid("rejected".into()))
        });
        assert!(result.is_err());
        assert!(store.get(&key()).unwrap().is_none());
    }
}
