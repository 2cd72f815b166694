//! Storage backends.
//!
//! Two contracts, deliberately kept apart:
//!
//! - [`TableBackend`]: an append-only structured store with two tables,
//!   datasets (`csvFiles`) and chart configurations (`chartConfigs`), each with
//!   auto-increment ids. No capacity limit.
//! - [`BlobBackend`]: a capacity-bounded key/value store of strings. Every
//!   `set` is checked against [`BlobBackend::capacity`] before anything is
//!   written, and usage is always recomputed from the stored entries.
//!
//! Each contract has an in-memory implementation (tests, embedding) and a
//! JSON-file implementation rooted in a store directory (CLI).

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{ChartConfig, ChartId, Dataset, DatasetId},
    error::{IntakeError, Result},
};

pub use file::{FileBlobs, FileTables};
pub use memory::{MemoryBlobs, MemoryTables};

/// Default capacity of a blob store, in bytes.
pub const DEFAULT_BLOB_CAPACITY: u64 = 5 * 1024 * 1024;

#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Stores `dataset` under a freshly assigned id (any id on the input is ignored).
    async fn insert_dataset(&self, dataset: Dataset) -> Result<DatasetId>;
    async fn datasets(&self) -> Result<Vec<Dataset>>;
    async fn dataset(&self, id: DatasetId) -> Result<Option<Dataset>>;
    /// Removes a dataset and its chart configurations as a single change.
    /// Returns the number of charts removed, or `None` when no dataset has `id`.
    async fn delete_dataset(&self, id: DatasetId) -> Result<Option<usize>>;
    async fn insert_chart(&self, chart: ChartConfig) -> Result<ChartId>;
    async fn charts_for(&self, dataset_id: DatasetId) -> Result<Vec<ChartConfig>>;
    async fn count_charts(&self) -> Result<usize>;
}

#[async_trait]
pub trait BlobBackend: Send + Sync {
    fn capacity(&self) -> u64;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Fails with [`IntakeError::StorageQuotaExceeded`] without writing when the
    /// store would grow past [`BlobBackend::capacity`].
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<bool>;
    /// Serialized size of every entry, see [`entry_size`].
    async fn entry_sizes(&self) -> Result<Vec<(String, u64)>>;

    async fn usage(&self) -> Result<StorageUsage> {
        let used = self.entry_sizes().await?.iter().map(|(_, size)| size).sum();
        Ok(StorageUsage::new(used, self.capacity()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub used: u64,
    pub remaining: u64,
    pub budget: u64,
}

impl StorageUsage {
    pub fn new(used: u64, budget: u64) -> Self {
        StorageUsage {
            used,
            remaining: budget.saturating_sub(used),
            budget,
        }
    }
}

/// Bytes an entry occupies: its key plus its value.
pub fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

/// Fails when an entry of `required` bytes does not fit beside `others` bytes.
pub fn ensure_fits(others: u64, required: u64, capacity: u64) -> Result<()> {
    let available = capacity.saturating_sub(others);
    if required > available {
        return Err(IntakeError::StorageQuotaExceeded {
            required,
            available,
        });
    }
    Ok(())
}

/// Table contents shared by the memory and file backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TableData {
    #[serde(default)]
    csv_files: Vec<Dataset>,
    #[serde(default)]
    chart_configs: Vec<ChartConfig>,
    #[serde(default)]
    next_ids: NextIds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextIds {
    csv_files: u64,
    chart_configs: u64,
}

impl TableData {
    pub(crate) fn insert_dataset(&mut self, mut dataset: Dataset) -> DatasetId {
        self.next_ids.csv_files += 1;
        dataset.id = self.next_ids.csv_files;
        self.csv_files.push(dataset);
        self.next_ids.csv_files
    }

    pub(crate) fn datasets(&self) -> Vec<Dataset> {
        self.csv_files.clone()
    }

    pub(crate) fn dataset(&self, id: DatasetId) -> Option<Dataset> {
        self.csv_files.iter().find(|d| d.id == id).cloned()
    }

    pub(crate) fn delete_dataset(&mut self, id: DatasetId) -> Option<usize> {
        let position = self.csv_files.iter().position(|d| d.id == id)?;
        self.csv_files.remove(position);
        let before = self.chart_configs.len();
        self.chart_configs.retain(|c| c.dataset_id != id);
        Some(before - self.chart_configs.len())
    }

    pub(crate) fn insert_chart(&mut self, mut chart: ChartConfig) -> ChartId {
        self.next_ids.chart_configs += 1;
        chart.id = self.next_ids.chart_configs;
        self.chart_configs.push(chart);
        self.next_ids.chart_configs
    }

    pub(crate) fn charts_for(&self, dataset_id: DatasetId) -> Vec<ChartConfig> {
        self.chart_configs
            .iter()
            .filter(|c| c.dataset_id == dataset_id)
            .cloned()
            .collect()
    }

    pub(crate) fn count_charts(&self) -> usize {
        self.chart_configs.len()
    }
}

/// Key/value contents shared by the memory and file backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct BlobData {
    entries: BTreeMap<String, String>,
}

impl BlobData {
    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    pub(crate) fn set(&mut self, key: &str, value: String, capacity: u64) -> Result<()> {
        let others = self
            .entries
            .iter()
            .filter(|(existing, _)| existing.as_str() != key)
            .map(|(k, v)| entry_size(k, v))
            .sum();
        ensure_fits(others, entry_size(key, &value), capacity)?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub(crate) fn entry_sizes(&self) -> Vec<(String, u64)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), entry_size(k, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dataset::ChartType, schema::ColumnSchema};
    use chrono::Utc;

    #[test]
    fn blob_data_rejects_overflow_without_writing() {
        let mut data = BlobData::default();
        data.set("a", "12345".to_string(), 10).unwrap();
        let err = data.set("b", "123456789".to_string(), 10).unwrap_err();
        assert!(matches!(
            err,
            IntakeError::StorageQuotaExceeded {
                required: 10,
                available: 4
            }
        ));
        assert_eq!(data.get("b"), None);

        // Replacing an entry only counts the new value.
        data.set("a", "123456789".to_string(), 10).unwrap();
        assert_eq!(data.entry_sizes(), vec![("a".to_string(), 10)]);
    }

    fn dataset() -> Dataset {
        Dataset {
            id: 0,
            name: "march".to_string(),
            created_at: Utc::now(),
            schema: ColumnSchema::from_names(["A"]),
            records: Vec::new(),
            row_count: 0,
            description: String::new(),
        }
    }

    #[test]
    fn deleting_a_dataset_takes_its_charts_along() {
        let mut data = TableData::default();
        let keep = data.insert_dataset(dataset());
        let drop = data.insert_dataset(dataset());
        for (dataset_id, name) in [(keep, "a"), (drop, "b"), (drop, "c")] {
            data.insert_chart(ChartConfig {
                id: 0,
                dataset_id,
                chart_type: ChartType::Bar,
                config: serde_json::Value::Null,
                created_date: Utc::now(),
                name: name.to_string(),
            });
        }
        assert_eq!(data.delete_dataset(drop), Some(2));
        assert_eq!(data.delete_dataset(drop), None);
        assert_eq!(data.count_charts(), 1);
        assert_eq!(data.charts_for(keep).len(), 1);
    }

    #[test]
    fn usage_saturates_remaining() {
        let usage = StorageUsage::new(12, 10);
        assert_eq!(usage.remaining, 0);
    }
}
