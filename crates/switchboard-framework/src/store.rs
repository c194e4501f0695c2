//! In-memory [`DataStore`].
//!
//! Records are JSON objects; [`update`](DataStore::update) merges the top-level
//! keys of the partial into the stored object. The store can be switched
//! offline to exercise storage-failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use switchboard_core::{DataStore, StoreError, StoreHealth, StoreResult, StoreStatus};

/// A process-local record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Value>>,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with [`StoreError::Unavailable`] until
    /// switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::Acquire) {
            Err(StoreError::Unavailable("database connection failed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Value>> {
        self.ensure_online()?;
        Ok(self.records.read().get(id).cloned())
    }

    async fn update(&self, id: &str, partial: Value) -> StoreResult<Value> {
        self.ensure_online()?;
        let Value::Object(partial) = partial else {
            return Err(StoreError::Serialization(format!(
                "update for '{id}' must be a JSON object"
            )));
        };

        let mut records = self.records.write();
        let record = records
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(fields) = record else {
            return Err(StoreError::Serialization(format!(
                "record '{id}' is not a JSON object"
            )));
        };
        fields.extend(partial);
        Ok(record.clone())
    }

    async fn health(&self) -> StoreHealth {
        if self.offline.load(Ordering::Acquire) {
            StoreHealth::Unavailable
        } else {
            StoreHealth::Healthy
        }
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        Ok(StoreStatus {
            health: self.health().await,
            records: Some(self.records.read().len() as u64),
            backend: "memory".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_update_merges_top_level_keys() {
        let store = MemoryStore::new();
        store.update("U1", json!({"coins": 10, "level": 1})).await.unwrap();
        let merged = store.update("U1", json!({"coins": 25})).await.unwrap();
        assert_eq!(merged, json!({"coins": 25, "level": 1}));
        assert_eq!(store.get("U1").await.unwrap(), Some(merged));
        assert_eq!(store.get("U2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_object_update_is_rejected() {
        let store = MemoryStore::new();
        let err = store.update("U1", json!(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_offline_store_reports_storage_errors() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.get("U1").await.unwrap_err();
        assert!(err.to_string().starts_with("storage"));
        assert_eq!(store.health().await, StoreHealth::Unavailable);
        assert_eq!(store.status().await.unwrap().health, StoreHealth::Unavailable);
    }
}
