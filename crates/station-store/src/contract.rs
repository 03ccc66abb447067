//! The collection-store contract consumed by the state store.
//!
//! Filters are flat JSON objects matched by field equality. Backends
//! with richer query languages can interpret the filter however they
//! like; the hub only ever builds `{}` and `{"id": …}` filters itself.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::Result;

/// Options for [`CollectionStore::find_many`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    /// Skip this many matching records.
    pub offset: Option<usize>,
    /// Cap the number of returned records.
    pub limit: Option<usize>,
}

/// Asynchronous CRUD over named collections of JSON records.
///
/// Every method may fail with a backend-specific error which callers
/// surface unchanged. Implementations must be safe to share behind an
/// `Arc` across connection handlers.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// First record matching `filter`, if any.
    async fn find_one(&self, collection: &str, filter: &Value) -> Result<Option<Value>>;

    /// All records matching `filter`, honoring `options`.
    async fn find_many(
        &self,
        collection: &str,
        filter: &Value,
        options: QueryOptions,
    ) -> Result<Vec<Value>>;

    /// Insert a record, generating an `id` when the record carries none.
    /// Returns the stored record (with its id).
    async fn create(&self, collection: &str, record: Value) -> Result<Value>;

    /// Merge `patch` into the first record matching `filter`. Returns the
    /// updated record; a filter that matches nothing is
    /// [`StoreError::NotFound`](crate::StoreError::NotFound).
    async fn update(&self, collection: &str, filter: &Value, patch: &Value) -> Result<Value>;

    /// Remove every record matching `filter`. Returns the removed count.
    async fn delete(&self, collection: &str, filter: &Value) -> Result<u64>;
}

/// Field-equality filter match shared by the bundled backends.
///
/// A non-object filter matches nothing; an empty object matches
/// everything.
#[must_use]
pub(crate) fn matches_filter(record: &Value, filter: &Value) -> bool {
    match filter {
        Value::Object(fields) => fields.iter().all(|(k, v)| record.get(k) == Some(v)),
        Value::Null => true,
        _ => false,
    }
}

/// Apply offset/limit windowing to a result set.
pub(crate) fn apply_options(mut records: Vec<Value>, options: QueryOptions) -> Vec<Value> {
    if let Some(offset) = options.offset {
        records = records.into_iter().skip(offset).collect();
    }
    if let Some(limit) = options.limit {
        records.truncate(limit);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches_filter(&json!({"id": 1}), &json!({})));
    }

    #[test]
    fn filter_matches_on_all_fields() {
        let record = json!({"id": 1, "done": true, "title": "t"});
        assert!(matches_filter(&record, &json!({"id": 1, "done": true})));
        assert!(!matches_filter(&record, &json!({"id": 1, "done": false})));
        assert!(!matches_filter(&record, &json!({"missing": 1})));
    }

    #[test]
    fn non_object_filter_matches_nothing() {
        assert!(!matches_filter(&json!({"id": 1}), &json!(42)));
    }

    #[test]
    fn options_window_results() {
        let records = vec![json!(1), json!(2), json!(3), json!(4)];
        let windowed = apply_options(
            records,
            QueryOptions {
                offset: Some(1),
                limit: Some(2),
            },
        );
        assert_eq!(windowed, vec![json!(2), json!(3)]);
    }

    #[test]
    fn options_deserialize_from_payload() {
        let opts: QueryOptions = serde_json::from_value(json!({"limit": 5})).unwrap();
        assert_eq!(opts.limit, Some(5));
        assert_eq!(opts.offset, None);
    }
}
