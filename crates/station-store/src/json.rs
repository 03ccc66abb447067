//! File-backed collection store.
//!
//! Each collection lives in its own `<data dir>/<collection>.json` file
//! holding a JSON array of records. The full data set is loaded at open
//! and kept in memory; every mutation stages a copy, rewrites the
//! affected file, and commits the copy to memory only once the write
//! succeeded, so a failed write leaves the visible records unchanged.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::contract::{CollectionStore, QueryOptions, apply_options, matches_filter};
use crate::errors::{Result, StoreError};
use crate::memory::{merge_patch, next_id};

/// Durable [`CollectionStore`] writing one JSON file per collection.
pub struct JsonStore {
    dir: PathBuf,
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl JsonStore {
    /// Open the store at `dir`, creating the directory if needed and
    /// loading every `*.json` file found there.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = tokio::fs::read_to_string(&path).await?;
            let records: Vec<Value> = serde_json::from_str(&raw)?;
            debug!(collection = name, records = records.len(), "collection loaded");
            let _ = collections.insert(name.to_string(), records);
        }

        Ok(Self {
            dir,
            collections: RwLock::new(collections),
        })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }

    /// Rewrite a collection's file from the given snapshot. The lock is
    /// never held across this await; callers pass an owned copy.
    async fn persist(&self, collection: &str, records: &[Value]) -> Result<()> {
        let body = serde_json::to_vec_pretty(records)?;
        let path = self.collection_path(collection);
        if let Err(err) = tokio::fs::write(&path, body).await {
            warn!(collection, error = %err, "failed to persist collection");
            return Err(err.into());
        }
        Ok(())
    }

    /// Make a successfully persisted snapshot the in-memory one. Writers
    /// to a single collection are serialized by the caller, so nothing
    /// can have changed the collection since the snapshot was staged.
    fn commit(&self, collection: &str, records: Vec<Value>) {
        let _ = self
            .collections
            .write()
            .insert(collection.to_string(), records);
    }
}

#[async_trait]
impl CollectionStore for JsonStore {
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
        let staged = {
            let collections = self.collections.read();
            let records = collections
                .get(collection)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if record.get("id").is_none() {
                merge_patch(&mut record, &json!({"id": next_id(records)}));
            }
            let mut staged = records.to_vec();
            staged.push(record.clone());
            staged
        };
        self.persist(collection, &staged).await?;
        self.commit(collection, staged);
        Ok(record)
    }

    async fn update(&self, collection: &str, filter: &Value, patch: &Value) -> Result<Value> {
        let (updated, staged) = {
            let collections = self.collections.read();
            let mut staged = collections
                .get(collection)
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                })?
                .clone();
            let record = staged
                .iter_mut()
                .find(|r| matches_filter(r, filter))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                })?;
            merge_patch(record, patch);
            (record.clone(), staged)
        };
        self.persist(collection, &staged).await?;
        self.commit(collection, staged);
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Value) -> Result<u64> {
        let (removed, staged) = {
            let collections = self.collections.read();
            let Some(records) = collections.get(collection) else {
                return Ok(0);
            };
            let mut staged = records.clone();
            let before = staged.len();
            staged.retain(|r| !matches_filter(r, filter));
            ((before - staged.len()) as u64, staged)
        };
        if removed > 0 {
            self.persist(collection, &staged).await?;
            self.commit(collection, staged);
        }
        Ok(removed)
    }
}
