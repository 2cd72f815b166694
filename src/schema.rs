//! Ordered, unique column names derived once per import.

use std::collections::HashSet;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColumnSchema {
    columns: Vec<String>,
}

impl ColumnSchema {
    /// Builds a schema from candidate names, suffixing repeats (`name_2`, `name_3`, ...)
    /// so every column stays addressable.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for name in names {
            let name = name.into();
            if seen.insert(name.clone()) {
                columns.push(name);
                continue;
            }
            let mut suffix = 2usize;
            let renamed = loop {
                let candidate = format!("{name}_{suffix}");
                if !seen.contains(&candidate) {
                    break candidate;
                }
                suffix += 1;
            };
            warn!("Duplicate column '{name}' renamed to '{renamed}'");
            seen.insert(renamed.clone());
            columns.push(renamed);
        }
        ColumnSchema { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.columns.iter()
    }
}

impl<'de> Deserialize<'de> for ColumnSchema {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let names = Vec::<String>::deserialize(deserializer)?;
        Ok(ColumnSchema::from_names(names))
    }
}

impl<'a> IntoIterator for &'a ColumnSchema {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
