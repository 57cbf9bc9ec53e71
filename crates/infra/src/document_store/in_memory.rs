use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};

use super::r#trait::{Collection, DocKey, DocumentStore, StoreError, VersionedDocument, WriteBatch, WriteOp};

/// In-memory document store.
///
/// Intended for tests/dev and offline jobs. A single lock serializes commits,
/// which gives the same conflict behaviour as a per-document CAS backend.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<BTreeMap<DocKey, VersionedDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn version_of(docs: &BTreeMap<DocKey, VersionedDocument>, key: &DocKey) -> u64 {
        docs.get(key).map(|d| d.version).unwrap_or(0)
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, key: &DocKey) -> Result<Option<VersionedDocument>, StoreError> {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(docs.get(key).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(|_| StoreError::Poisoned)?;

        for (key, expected) in &batch.preconditions {
            let current = Self::version_of(&docs, key);
            if !expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "{key}: expected {expected:?}, found version {current}"
                )));
            }
        }

        // Stage everything first so a failing write leaves the store untouched.
        let mut staged: BTreeMap<DocKey, VersionedDocument> = BTreeMap::new();
        for op in batch.writes {
            let key = op.key().clone();
            let current = staged.get(&key).or_else(|| docs.get(&key)).cloned();
            let current_version = current.as_ref().map(|d| d.version).unwrap_or(0);

            let data = match op {
                WriteOp::Put { data, expected, .. } => {
                    if !expected.matches(current_version) {
                        return Err(StoreError::Concurrency(format!(
                            "{key}: expected {expected:?}, found version {current_version}"
                        )));
                    }
                    data
                }
                WriteOp::Create { data, .. } => {
                    if current.is_some() {
                        return Err(StoreError::Concurrency(format!("{key} already exists")));
                    }
                    data
                }
                WriteOp::Increment { field, delta, set, .. } => {
                    apply_increment(&key, current.map(|d| d.data), &field, delta, set)?
                }
            };

            staged.insert(
                key,
                VersionedDocument {
                    version: current_version + 1,
                    data,
                },
            );
        }

        docs.extend(staged);
        Ok(())
    }

    fn list(&self, collection: Collection) -> Result<Vec<(String, VersionedDocument)>, StoreError> {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(docs
            .iter()
            .filter(|(k, _)| k.collection == collection)
            .map(|(k, d)| (k.id.clone(), d.clone()))
            .collect())
    }
}

fn apply_increment(
    key: &DocKey,
    current: Option<JsonValue>,
    field: &str,
    delta: Decimal,
    set: Map<String, JsonValue>,
) -> Result<JsonValue, StoreError> {
    let mut object = match current {
        Some(JsonValue::Object(map)) => map,
        Some(_) => return Err(StoreError::Invalid(format!("{key} is not an object"))),
        None => Map::new(),
    };

    let existing = match object.get(field) {
        None | Some(JsonValue::Null) => Decimal::ZERO,
        Some(JsonValue::String(s)) => Decimal::from_str(s)
            .map_err(|e| StoreError::Invalid(format!("{key}.{field} is not a decimal: {e}")))?,
        Some(JsonValue::Number(n)) => Decimal::from_str(&n.to_string())
            .map_err(|e| StoreError::Invalid(format!("{key}.{field} is not a decimal: {e}")))?,
        Some(other) => {
            return Err(StoreError::Invalid(format!("{key}.{field} is not numeric: {other}")));
        }
    };
    let next = existing
        .checked_add(delta)
        .ok_or_else(|| StoreError::Invalid(format!("{key}.{field} overflows")))?;

    object.extend(set);
    let value = serde_json::to_value(next).map_err(|e| StoreError::Serialization(e.to_string()))?;
    object.insert(field.to_string(), value);
    Ok(JsonValue::Object(object))
}
