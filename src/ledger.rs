//! The progress ledger: a durable, deduplicated list of records marked for
//! follow-up, kept in a single blob across sessions.
//!
//! Entries are unique by identity key (the serial column value, or a
//! synthetic key when the serial is blank). The first entry for a key wins.

use std::{collections::HashSet, sync::Arc};

use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::{IntakeError, Result},
    record::Record,
    storage::BlobBackend,
};

pub const DEFAULT_STORAGE_KEY: &str = "SAVED_PATIENTS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage_key: String,
    pub serial_column: String,
    /// Records with a blank value here, or one equal to a sentinel, are not tracked.
    pub required_column: String,
    pub sentinels: Vec<String>,
    pub search_columns: Vec<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            serial_column: "S. NO.".to_string(),
            required_column: "NAME".to_string(),
            sentinels: vec!["NAME".to_string(), "-".to_string()],
            search_columns: vec![
                "NAME".to_string(),
                "AGE".to_string(),
                "CONTACT \nNO.".to_string(),
            ],
        }
    }
}

impl LedgerConfig {
    fn is_trackable(&self, record: &Record) -> bool {
        let value = record.get(&self.required_column).trim();
        if value.is_empty() {
            return false;
        }
        let lowered = value.to_lowercase();
        !self
            .sentinels
            .iter()
            .any(|sentinel| sentinel.trim().to_lowercase() == lowered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub serial: String,
    #[serde(flatten)]
    pub record: Record,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub added: usize,
    pub duplicates: usize,
    pub ignored: usize,
}

pub struct ProgressLedger<B: BlobBackend> {
    backend: Arc<B>,
    config: LedgerConfig,
    entries: Vec<LedgerEntry>,
    // Keys known to be in durable storage as of the last load or persist.
    durable: HashSet<String>,
}

impl<B: BlobBackend> ProgressLedger<B> {
    /// An empty ledger; call [`ProgressLedger::load`] to read durable state.
    pub fn new(backend: Arc<B>, config: LedgerConfig) -> Self {
        ProgressLedger {
            backend,
            config,
            entries: Vec::new(),
            durable: HashSet::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.serial == key)
    }

    /// Replaces the in-memory view with durable state. A blob that fails to
    /// parse is removed and the ledger is left empty.
    pub async fn load(&mut self) -> Result<()> {
        let entries = self.read_durable().await;
        self.durable.clear();
        self.entries.clear();
        let entries = entries?;
        self.durable = entries.iter().map(|e| e.serial.clone()).collect();
        self.entries = entries;
        debug!("Loaded {} ledger entries", self.entries.len());
        Ok(())
    }

    /// Adds trackable records not yet present. Durable state is reloaded
    /// first and unsaved entries are kept. Nothing is persisted.
    pub async fn merge<'a, I>(&mut self, records: I) -> Result<MergeOutcome>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        self.reconcile().await?;

        let mut outcome = MergeOutcome::default();
        let mut seen = self
            .entries
            .iter()
            .map(|e| e.serial.clone())
            .collect::<HashSet<_>>();
        for record in records {
            if !self.config.is_trackable(record) {
                outcome.ignored += 1;
                continue;
            }
            let serial = record.identity_key(&self.config.serial_column);
            if !seen.insert(serial.clone()) {
                outcome.duplicates += 1;
                continue;
            }
            self.entries.push(LedgerEntry {
                serial,
                record: record.clone(),
            });
            outcome.added += 1;
        }
        info!(
            "Ledger merge: {} added, {} duplicate(s), {} ignored",
            outcome.added, outcome.duplicates, outcome.ignored
        );
        Ok(outcome)
    }

    /// Deletes one entry and persists the ledger.
    pub async fn remove(&mut self, key: &str) -> Result<LedgerEntry> {
        self.reconcile().await?;
        let position = self
            .entries
            .iter()
            .position(|e| e.serial == key)
            .ok_or_else(|| IntakeError::not_found("ledger entry", key))?;
        let removed = self.entries.remove(position);
        if let Err(err) = self.write().await {
            self.entries.insert(position, removed);
            return Err(err);
        }
        info!("Removed '{key}' from the ledger");
        Ok(removed)
    }

    /// Writes every entry as one JSON array under the storage key, after
    /// folding in whatever other writers persisted since the last read.
    pub async fn persist(&mut self) -> Result<()> {
        self.reconcile().await?;
        self.write().await
    }

    async fn write(&mut self) -> Result<()> {
        let serialized = serde_json::to_string(&self.entries).map_err(|err| {
            IntakeError::StorageUnavailable(format!("serializing ledger: {err}"))
        })?;
        self.backend.set(&self.config.storage_key, serialized).await?;
        self.durable = self.entries.iter().map(|e| e.serial.clone()).collect();
        info!("Persisted {} ledger entries", self.entries.len());
        Ok(())
    }

    /// Case-insensitive substring search over the search columns and the
    /// identity key. An empty term matches everything.
    pub fn search(&self, term: &str) -> Vec<&LedgerEntry> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.entries.iter().collect();
        }
        self.entries
            .iter()
            .filter(|entry| {
                self.config
                    .search_columns
                    .iter()
                    .map(|column| entry.record.get(column))
                    .chain(std::iter::once(entry.serial.as_str()))
                    .any(|value| value.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Durable entries first, then local entries that were never persisted.
    /// Entries this ledger persisted but which are gone from storage stay gone.
    async fn reconcile(&mut self) -> Result<()> {
        let durable = self.read_durable().await?;
        let durable_keys = durable
            .iter()
            .map(|e| e.serial.clone())
            .collect::<HashSet<_>>();
        let unsaved = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| !self.durable.contains(&e.serial));
        self.entries = durable
            .into_iter()
            .chain(unsaved)
            .unique_by(|e| e.serial.clone())
            .collect();
        self.durable = durable_keys;
        Ok(())
    }

    async fn read_durable(&self) -> Result<Vec<LedgerEntry>> {
        let key = &self.config.storage_key;
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<LedgerEntry>>(&raw) {
            Ok(entries) => Ok(entries.into_iter().unique_by(|e| e.serial.clone()).collect()),
            Err(err) => {
                warn!("Discarding corrupt ledger under '{key}': {err}");
                self.backend.remove(key).await?;
                Err(IntakeError::CorruptData {
                    key: key.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }
}
