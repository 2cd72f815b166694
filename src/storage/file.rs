//! JSON-file backends rooted in a store directory.
//!
//! Each operation reads the backing file, applies the change, and rewrites the
//! file (temp file + rename) before returning, so a completed call is durable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;

use super::{BlobBackend, BlobData, TableBackend, TableData};
use crate::{
    dataset::{ChartConfig, ChartId, Dataset, DatasetId},
    error::{IntakeError, Result},
};

pub const TABLES_FILE: &str = "tables.json";
pub const BLOBS_FILE: &str = "blobs.json";

#[derive(Debug)]
pub struct FileTables {
    path: PathBuf,
    // Serializes read-modify-write cycles from this process.
    lock: Mutex<()>,
}

impl FileTables {
    pub async fn open(dir: &Path) -> Result<Self> {
        ensure_dir(dir).await?;
        Ok(FileTables {
            path: dir.join(TABLES_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<TableData> {
        read_json(&self.path).await
    }

    async fn modify<T>(&self, change: impl FnOnce(&mut TableData) -> T + Send) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut data = self.read().await?;
        let outcome = change(&mut data);
        write_json(&self.path, &data).await?;
        Ok(outcome)
    }
}

#[async_trait]
impl TableBackend for FileTables {
    async fn insert_dataset(&self, dataset: Dataset) -> Result<DatasetId> {
        self.modify(|data| data.insert_dataset(dataset)).await
    }

    async fn datasets(&self) -> Result<Vec<Dataset>> {
        Ok(self.read().await?.datasets())
    }

    async fn dataset(&self, id: DatasetId) -> Result<Option<Dataset>> {
        Ok(self.read().await?.dataset(id))
    }

    async fn delete_dataset(&self, id: DatasetId) -> Result<Option<usize>> {
        self.modify(|data| data.delete_dataset(id)).await
    }

    async fn insert_chart(&self, chart: ChartConfig) -> Result<ChartId> {
        self.modify(|data| data.insert_chart(chart)).await
    }

    async fn charts_for(&self, dataset_id: DatasetId) -> Result<Vec<ChartConfig>> {
        Ok(self.read().await?.charts_for(dataset_id))
    }

    async fn count_charts(&self) -> Result<usize> {
        Ok(self.read().await?.count_charts())
    }
}

#[derive(Debug)]
pub struct FileBlobs {
    path: PathBuf,
    capacity: u64,
    lock: Mutex<()>,
}

impl FileBlobs {
    pub async fn open_with_capacity(dir: &Path, capacity: u64) -> Result<Self> {
        ensure_dir(dir).await?;
        Ok(FileBlobs {
            path: dir.join(BLOBS_FILE),
            capacity,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<BlobData> {
        read_json(&self.path).await
    }
}

#[async_trait]
impl BlobBackend for FileBlobs {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read().await?.get(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.read().await?;
        data.set(key, value, self.capacity)?;
        write_json(&self.path, &data).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut data = self.read().await?;
        let removed = data.remove(key);
        if removed {
            write_json(&self.path, &data).await?;
        }
        Ok(removed)
    }

    async fn entry_sizes(&self) -> Result<Vec<(String, u64)>> {
        Ok(self.read().await?.entry_sizes())
    }
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|err| {
        IntakeError::StorageUnavailable(format!("creating store directory {dir:?}: {err}"))
    })
}

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(err) => {
            return Err(IntakeError::StorageUnavailable(format!(
                "reading {path:?}: {err}"
            )));
        }
    };
    serde_json::from_slice(&bytes).map_err(|err| {
        IntakeError::StorageUnavailable(format!("{path:?} is not a valid store file: {err}"))
    })
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let serialized = serde_json::to_vec(value).map_err(|err| {
        IntakeError::StorageUnavailable(format!("serializing {path:?}: {err}"))
    })?;
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, &serialized).await.map_err(|err| {
        IntakeError::StorageUnavailable(format!("writing {temp:?}: {err}"))
    })?;
    tokio::fs::rename(&temp, path).await.map_err(|err| {
        IntakeError::StorageUnavailable(format!("replacing {path:?}: {err}"))
    })?;
    debug!("Wrote {} byte(s) to {:?}", serialized.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::Record, schema::ColumnSchema};
    use chrono::Utc;
    use tempfile::tempdir;

    fn dataset(name: &str) -> Dataset {
        Dataset {
            id: 0,
            name: name.to_string(),
            created_at: Utc::now(),
            schema: ColumnSchema::from_names(["A", "B"]),
            records: vec![Record::new()],
            row_count: 1,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn tables_survive_reopen_with_increasing_ids() {
        let dir = tempdir().unwrap();
        let tables = FileTables::open(dir.path()).await.unwrap();
        assert_eq!(tables.insert_dataset(dataset("one")).await.unwrap(), 1);
        assert_eq!(tables.insert_dataset(dataset("two")).await.unwrap(), 2);
        assert_eq!(tables.delete_dataset(2).await.unwrap(), Some(0));

        let reopened = FileTables::open(dir.path()).await.unwrap();
        assert_eq!(reopened.datasets().await.unwrap().len(), 1);
        // Ids are never reused after deletion.
        assert_eq!(reopened.insert_dataset(dataset("three")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn blobs_enforce_capacity_on_disk() {
        let dir = tempdir().unwrap();
        let blobs = FileBlobs::open_with_capacity(dir.path(), 8).await.unwrap();
        blobs.set("k", "1234".to_string()).await.unwrap();
        assert!(blobs.set("x", "12345".to_string()).await.is_err());

        let reopened = FileBlobs::open_with_capacity(dir.path(), 8).await.unwrap();
        assert_eq!(reopened.usage().await.unwrap().used, 5);
        assert_eq!(reopened.get("x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreadable_store_file_reports_unavailable() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(TABLES_FILE), "{ not json").unwrap();
        let tables = FileTables::open(dir.path()).await.unwrap();
        assert!(matches!(
            tables.datasets().await,
            Err(IntakeError::StorageUnavailable(_))
        ));
    }
}
