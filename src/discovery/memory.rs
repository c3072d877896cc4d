//! In-memory discovery registry for development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::discovery::{DiscoveryError, ServiceDiscovery};

/// Name → address registry held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDiscovery {
    records: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `records`.
    pub fn from_records(records: HashMap<String, String>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub async fn register(&self, name: impl Into<String>, address: impl Into<String>) {
        let (name, address) = (name.into(), address.into());
        tracing::debug!(service = %name, address = %address, "Service registered");
        self.records.write().await.insert(name, address);
    }

    pub async fn deregister(&self, name: &str) -> Result<(), DiscoveryError> {
        self.records
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DiscoveryError::NotFound(name.to_string()))
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ServiceDiscovery for InMemoryDiscovery {
    async fn lookup(&self, name: &str) -> Result<String, DiscoveryError> {
        self.records
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound(name.to_string()))
    }
}
