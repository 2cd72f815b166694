//! Keyed records and the positional-to-keyed normalization step.
//!
//! [`normalize_rows()`] maps each [`RawRow`] onto a [`ColumnSchema`] by
//! position, producing one [`Record`] per input row in input order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{header::RawRow, schema::ColumnSchema};

const SYNTHETIC_KEY_HEX_LEN: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `column`, or `""` when the record has no such column.
    pub fn get(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Cells in schema order, missing columns rendered as `""`.
    pub fn to_row(&self, schema: &ColumnSchema) -> Vec<String> {
        schema.iter().map(|column| self.get(column).to_string()).collect()
    }

    /// The natural identity of the record, if `serial_column` holds a non-blank value.
    pub fn natural_key(&self, serial_column: &str) -> Option<&str> {
        let value = self.get(serial_column);
        if value.trim().is_empty() { None } else { Some(value) }
    }

    /// Natural identity when present, otherwise [`Record::synthetic_key`].
    pub fn identity_key(&self, serial_column: &str) -> String {
        self.natural_key(serial_column)
            .map(str::to_string)
            .unwrap_or_else(|| self.synthetic_key())
    }

    /// Key derived from every column and value, so equal records share it.
    pub fn synthetic_key(&self) -> String {
        let mut hasher = Sha256::new();
        for (column, value) in &self.values {
            hasher.update(column.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        format!("record-{}", &digest[..SYNTHETIC_KEY_HEX_LEN])
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Record {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

pub fn normalize_row(schema: &ColumnSchema, raw: &[String]) -> Record {
    schema
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = raw.get(idx).map(String::as_str).unwrap_or("");
            (column.clone(), value.to_string())
        })
        .collect()
}

pub fn normalize_rows(schema: &ColumnSchema, rows: &[RawRow]) -> Vec<Record> {
    rows.iter().map(|raw| normalize_row(schema, raw)).collect()
}

/// A record whose every value is its own column name.
pub fn header_record(schema: &ColumnSchema) -> Record {
    schema.iter().map(|c| (c.clone(), c.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_rows_pad_with_empty_strings_and_long_rows_truncate() {
        let schema = ColumnSchema::from_names(["a", "b", "c"]);
        let short = normalize_row(&schema, &["1".to_string()]);
        assert_eq!(short.get("a"), "1");
        assert_eq!(short.get("c"), "");
        assert!(short.contains("c"));

        let long = normalize_row(
            &schema,
            &["1", "2", "3", "4"].map(String::from),
        );
        assert_eq!(long.len(), 3);
    }

    #[test]
    fn identity_key_prefers_serial() {
        let record: Record = [("S. NO.", "12"), ("NAME", "Alice")].into_iter().collect();
        assert_eq!(record.identity_key("S. NO."), "12");

        let blank: Record = [("S. NO.", "  "), ("NAME", "Bob")].into_iter().collect();
        let first = blank.identity_key("S. NO.");
        assert!(first.starts_with("record-"));
        assert_eq!(first.len(), "record-".len() + 16);
        assert_eq!(first, blank.clone().identity_key("S. NO."));

        let other: Record = [("S. NO.", "  "), ("NAME", "Bea")].into_iter().collect();
        assert_ne!(first, other.identity_key("S. NO."));
    }
}
