//! In-memory backends guarded by `tokio::sync::RwLock`.
//!
//! Both can be switched offline to exercise the `StorageUnavailable` paths.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobBackend, BlobData, DEFAULT_BLOB_CAPACITY, TableBackend, TableData};
use crate::{
    dataset::{ChartConfig, ChartId, Dataset, DatasetId},
    error::{IntakeError, Result},
};

#[derive(Debug, Default)]
pub struct MemoryTables {
    data: RwLock<TableData>,
    offline: AtomicBool,
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        ensure_online(&self.offline, "table store")
    }
}

#[async_trait]
impl TableBackend for MemoryTables {
    async fn insert_dataset(&self, dataset: Dataset) -> Result<DatasetId> {
        self.ensure_online()?;
        Ok(self.data.write().await.insert_dataset(dataset))
    }

    async fn datasets(&self) -> Result<Vec<Dataset>> {
        self.ensure_online()?;
        Ok(self.data.read().await.datasets())
    }

    async fn dataset(&self, id: DatasetId) -> Result<Option<Dataset>> {
        self.ensure_online()?;
        Ok(self.data.read().await.dataset(id))
    }

    async fn delete_dataset(&self, id: DatasetId) -> Result<Option<usize>> {
        self.ensure_online()?;
        Ok(self.data.write().await.delete_dataset(id))
    }

    async fn insert_chart(&self, chart: ChartConfig) -> Result<ChartId> {
        self.ensure_online()?;
        Ok(self.data.write().await.insert_chart(chart))
    }

    async fn charts_for(&self, dataset_id: DatasetId) -> Result<Vec<ChartConfig>> {
        self.ensure_online()?;
        Ok(self.data.read().await.charts_for(dataset_id))
    }

    async fn count_charts(&self) -> Result<usize> {
        self.ensure_online()?;
        Ok(self.data.read().await.count_charts())
    }
}

#[derive(Debug)]
pub struct MemoryBlobs {
    data: RwLock<BlobData>,
    capacity: u64,
    offline: AtomicBool,
}

impl Default for MemoryBlobs {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BLOB_CAPACITY)
    }
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: u64) -> Self {
        MemoryBlobs {
            data: RwLock::new(BlobData::default()),
            capacity,
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        ensure_online(&self.offline, "blob store")
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobs {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_online()?;
        Ok(self.data.read().await.get(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.ensure_online()?;
        self.data.write().await.set(key, value, self.capacity)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.ensure_online()?;
        Ok(self.data.write().await.remove(key))
    }

    async fn entry_sizes(&self) -> Result<Vec<(String, u64)>> {
        self.ensure_online()?;
        Ok(self.data.read().await.entry_sizes())
    }
}

fn ensure_online(offline: &AtomicBool, name: &str) -> Result<()> {
    if offline.load(Ordering::SeqCst) {
        return Err(IntakeError::StorageUnavailable(format!("{name} is offline")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_blobs_refuse_every_operation() {
        let blobs = MemoryBlobs::new();
        blobs.set("k", "v".to_string()).await.unwrap();
        blobs.set_offline(true);
        assert!(matches!(
            blobs.get("k").await,
            Err(IntakeError::StorageUnavailable(_))
        ));
        blobs.set_offline(false);
        assert_eq!(blobs.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn usage_sums_keys_and_values() {
        let blobs = MemoryBlobs::with_capacity(100);
        blobs.set("ab", "cde".to_string()).await.unwrap();
        blobs.set("f", "g".to_string()).await.unwrap();
        let usage = blobs.usage().await.unwrap();
        assert_eq!(usage.used, 7);
        assert_eq!(usage.remaining, 93);
    }
}
