//! Data-access contract.
//!
//! The dispatch core never touches persistence directly. Handlers reach player
//! and guild records through a [`DataStore`] injected into the dispatcher;
//! failures it reports are classified as storage errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreResult;

/// Health of a data store as reported by [`DataStore::health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreHealth {
    /// Fully operational.
    Healthy,
    /// Serving requests with reduced capability.
    Degraded,
    /// Not serving requests.
    Unavailable,
}

/// Point-in-time status of a data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    /// Current health.
    pub health: StoreHealth,
    /// Number of records held, if known.
    pub records: Option<u64>,
    /// Backend name, e.g. `"memory"`.
    pub backend: String,
}

/// Opaque key-value record store.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    /// Returns the record stored under `id`, if any.
    async fn get(&self, id: &str) -> StoreResult<Option<Value>>;

    /// Shallow-merges `partial` into the record under `id`, creating it when
    /// absent, and returns the merged record.
    async fn update(&self, id: &str, partial: Value) -> StoreResult<Value>;

    /// Quick liveness probe.
    async fn health(&self) -> StoreHealth;

    /// Detailed status for diagnostics.
    async fn status(&self) -> StoreResult<StoreStatus>;
}

/// A shared, type-erased data store.
pub type BoxedStore = Arc<dyn DataStore>;
