//! Named, persisted datasets and the chart configurations that reference them.
//!
//! Datasets are immutable once saved: saving again creates a new entry with a
//! new id. Deleting a dataset removes its chart configurations in the same
//! call so no configuration outlives the data it describes.

use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::{IntakeError, Result},
    record::Record,
    schema::ColumnSchema,
    storage::TableBackend,
};

pub type DatasetId = u64;
pub type ChartId = u64;

/// Persisted as `{id, name, uploadDate, headers, data, size, description}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    #[serde(rename = "uploadDate")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "headers")]
    pub schema: ColumnSchema,
    #[serde(rename = "data")]
    pub records: Vec<Record>,
    #[serde(rename = "size")]
    pub row_count: usize,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Area,
    Pie,
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Area => "area",
            ChartType::Pie => "pie",
        };
        f.write_str(label)
    }
}

impl FromStr for ChartType {
    type Err = IntakeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            "area" => Ok(ChartType::Area),
            "pie" => Ok(ChartType::Pie),
            other => Err(IntakeError::validation(format!(
                "Unknown chart type '{other}' (expected bar, line, area, or pie)"
            ))),
        }
    }
}

/// Persisted as `{id, fileId, chartType, config, createdDate, name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub id: ChartId,
    #[serde(rename = "fileId")]
    pub dataset_id: DatasetId,
    pub chart_type: ChartType,
    pub config: serde_json::Value,
    pub created_date: DateTime<Utc>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub total_datasets: usize,
    pub total_charts: usize,
    pub total_rows: usize,
}

pub struct DatasetStore<B: TableBackend> {
    backend: Arc<B>,
}

impl<B: TableBackend> Clone for DatasetStore<B> {
    fn clone(&self) -> Self {
        DatasetStore {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: TableBackend> DatasetStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        DatasetStore { backend }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub async fn save(
        &self,
        name: &str,
        schema: &ColumnSchema,
        records: Vec<Record>,
        description: &str,
    ) -> Result<DatasetId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IntakeError::validation("Dataset name must not be empty"));
        }
        let dataset = Dataset {
            id: 0,
            name: name.to_string(),
            created_at: Utc::now(),
            schema: schema.clone(),
            row_count: records.len(),
            records,
            description: description.trim().to_string(),
        };
        let row_count = dataset.row_count;
        let id = self.backend.insert_dataset(dataset).await?;
        info!("Saved dataset #{id} '{name}' with {row_count} row(s)");
        Ok(id)
    }

    /// All datasets, most recently saved first.
    pub async fn list(&self) -> Result<Vec<Dataset>> {
        let mut datasets = self.backend.datasets().await?;
        datasets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(datasets)
    }

    pub async fn get(&self, id: DatasetId) -> Result<Dataset> {
        self.backend
            .dataset(id)
            .await?
            .ok_or_else(|| IntakeError::not_found("dataset", id))
    }

    /// Removes the dataset and every chart configuration that references it.
    pub async fn delete(&self, id: DatasetId) -> Result<()> {
        let charts = self
            .backend
            .delete_dataset(id)
            .await?
            .ok_or_else(|| IntakeError::not_found("dataset", id))?;
        info!("Deleted dataset #{id} and {charts} chart configuration(s)");
        Ok(())
    }

    pub async fn stats(&self) -> Result<DatasetStats> {
        let datasets = self.backend.datasets().await?;
        let total_charts = self.backend.count_charts().await?;
        Ok(DatasetStats {
            total_datasets: datasets.len(),
            total_charts,
            total_rows: datasets.iter().map(|d| d.row_count).sum(),
        })
    }

    pub async fn save_chart(
        &self,
        dataset_id: DatasetId,
        chart_type: ChartType,
        config: serde_json::Value,
        name: &str,
    ) -> Result<ChartId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IntakeError::validation("Chart name must not be empty"));
        }
        if self.backend.dataset(dataset_id).await?.is_none() {
            return Err(IntakeError::not_found("dataset", dataset_id));
        }
        let id = self
            .backend
            .insert_chart(ChartConfig {
                id: 0,
                dataset_id,
                chart_type,
                config,
                created_date: Utc::now(),
                name: name.to_string(),
            })
            .await?;
        debug!("Saved {chart_type} chart #{id} for dataset #{dataset_id}");
        Ok(id)
    }

    pub async fn charts(&self, dataset_id: DatasetId) -> Result<Vec<ChartConfig>> {
        let mut charts = self.backend.charts_for(dataset_id).await?;
        charts.sort_by_key(|c| c.id);
        Ok(charts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_shape_uses_camel_case_field_names() {
        let dataset = Dataset {
            id: 4,
            name: "march".to_string(),
            created_at: DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            schema: ColumnSchema::from_names(["A"]),
            records: vec![[("A", "1")].into_iter().collect()],
            row_count: 1,
            description: "first".to_string(),
        };
        let value = serde_json::to_value(&dataset).unwrap();
        for field in ["id", "name", "uploadDate", "headers", "data", "size", "description"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["data"][0]["A"], "1");
    }

    #[test]
    fn chart_type_parses_case_insensitively() {
        assert_eq!("PIE".parse::<ChartType>().unwrap(), ChartType::Pie);
        assert!("scatter".parse::<ChartType>().is_err());
    }
}
