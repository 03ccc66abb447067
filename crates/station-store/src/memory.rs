//! In-process collection store.
//!
//! The default backend for tests and ephemeral hubs. Collections are
//! plain `Vec<Value>`s behind one `RwLock`; nothing survives the process.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::contract::{CollectionStore, QueryOptions, apply_options, matches_filter};
use crate::errors::{Result, StoreError};

/// Volatile, in-memory [`CollectionStore`].
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Next integer id for a collection: one past the largest integer id seen.
///
/// Records with string or missing ids don't participate; supplied ids of
/// any JSON type are kept as-is on create.
pub(crate) fn next_id(records: &[Value]) -> i64 {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .max()
        .unwrap_or(0)
        + 1
}

/// Merge `patch`'s fields over `record` (shallow, object-level).
pub(crate) fn merge_patch(record: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(fields)) = (record, patch) {
        for (k, v) in fields {
            let _ = target.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Value) -> Result<Option<Value>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|records| records.iter().find(|r| matches_filter(r, filter)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Value,
        options: QueryOptions,
    ) -> Result<Vec<Value>> {
        let collections = self.collections.read();
        let matched = collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| matches_filter(r, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(apply_options(matched, options))
    }

    async fn create(&self, collection: &str, mut record: Value) -> Result<Value> {
        if !record.is_object() {
            return Err(StoreError::InvalidMutation {
                collection: collection.to_string(),
                message: "record must be a JSON object".into(),
            });
        }
        let mut collections = self.collections.write();
        let records = collections.entry(collection.to_string()).or_default();
        if record.get("id").is_none() {
            merge_patch(&mut record, &json!({"id": next_id(records)}));
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, filter: &Value, patch: &Value) -> Result<Value> {
        let mut collections = self.collections.write();
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
            })?;
        let record = records
            .iter_mut()
            .find(|r| matches_filter(r, filter))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
            })?;
        merge_patch(record, patch);
        Ok(record.clone())
    }

    async fn delete(&self, collection: &str, filter: &Value) -> Result<u64> {
        let mut collections = self.collections.write();
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|r| !matches_filter(r, filter));
        Ok((before - records.len()) as u64)
    }
}
