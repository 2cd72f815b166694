//! Schema reconstruction from a two-row spreadsheet header.
//!
//! Exports handled here open with a block of metadata rows, then a primary
//! header naming the fixed per-record fields, then a secondary header naming
//! the repeated fields (one column per item of a list-valued field). The
//! primary row governs the first [`HeaderLayout::fixed_columns`] positions and
//! the secondary row governs everything after them.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{IntakeError, Result},
    schema::ColumnSchema,
};

/// One delimited line, cells in file order, nothing interpreted yet.
pub type RawRow = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderLayout {
    /// Leading rows preserved verbatim for re-attachment.
    pub metadata_rows: usize,
    pub primary_header_row: usize,
    pub secondary_header_row: usize,
    pub data_start_row: usize,
    /// Positions owned by the primary header; later positions are named by the secondary row.
    pub fixed_columns: usize,
    pub min_columns: usize,
}

impl Default for HeaderLayout {
    fn default() -> Self {
        HeaderLayout {
            metadata_rows: 3,
            primary_header_row: 2,
            secondary_header_row: 3,
            data_start_row: 4,
            fixed_columns: 10,
            min_columns: 2,
        }
    }
}

impl HeaderLayout {
    /// Smallest input that has every structural row plus one data row.
    pub fn min_rows(&self) -> usize {
        let last_structural = self
            .metadata_rows
            .max(self.primary_header_row + 1)
            .max(self.secondary_header_row + 1)
            .max(self.data_start_row);
        last_structural + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_start_row <= self.primary_header_row
            || self.data_start_row <= self.secondary_header_row
        {
            return Err(IntakeError::validation(format!(
                "data must start after both header rows (data row {}, headers {} and {})",
                self.data_start_row, self.primary_header_row, self.secondary_header_row
            )));
        }
        if self.min_columns == 0 {
            return Err(IntakeError::validation("min_columns must be at least 1"));
        }
        Ok(())
    }
}

/// Output of [`reconstruct`]: the derived schema plus the rows around it.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub schema: ColumnSchema,
    pub metadata: Vec<RawRow>,
    pub data: Vec<RawRow>,
}

pub fn reconstruct(mut rows: Vec<RawRow>, layout: &HeaderLayout) -> Result<Reconstruction> {
    layout.validate()?;
    let required = layout.min_rows();
    if rows.len() < required {
        return Err(IntakeError::InsufficientRows {
            found: rows.len(),
            required,
        });
    }

    let schema = derive_schema(
        &rows[layout.primary_header_row],
        &rows[layout.secondary_header_row],
        layout.fixed_columns,
    );
    if schema.len() < layout.min_columns {
        return Err(IntakeError::InsufficientHeaders {
            found: schema.len(),
            required: layout.min_columns,
        });
    }
    debug!(
        "Derived {} column(s): {} fixed, {} repeated",
        schema.len(),
        non_blank(rows[layout.primary_header_row].iter().take(layout.fixed_columns)).count(),
        non_blank(rows[layout.secondary_header_row].iter().skip(layout.fixed_columns)).count()
    );

    let data = rows.split_off(layout.data_start_row);
    rows.truncate(layout.metadata_rows);
    Ok(Reconstruction {
        schema,
        metadata: rows,
        data,
    })
}

pub fn derive_schema(primary: &[String], secondary: &[String], fixed_columns: usize) -> ColumnSchema {
    let fixed = non_blank(primary.iter().take(fixed_columns));
    let repeated = non_blank(secondary.iter().skip(fixed_columns));
    ColumnSchema::from_names(fixed.chain(repeated))
}

fn non_blank<'a, I>(cells: I) -> impl Iterator<Item = String> + 'a
where
    I: Iterator<Item = &'a String> + 'a,
{
    cells
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn min_rows_covers_default_layout() {
        assert_eq!(HeaderLayout::default().min_rows(), 5);
    }

    #[test]
    fn secondary_names_only_count_past_fixed_block() {
        let primary = row(&["ID", "NAME", "MEDS", ""]);
        let secondary = row(&["ignored", "", "DrugA", "DrugB"]);
        let schema = derive_schema(&primary, &secondary, 2);
        assert_eq!(schema.columns(), ["ID", "NAME", "DrugA", "DrugB"]);
    }

    #[test]
    fn layout_rejects_data_before_headers() {
        let layout = HeaderLayout {
            data_start_row: 3,
            ..HeaderLayout::default()
        };
        assert!(matches!(layout.validate(), Err(IntakeError::Validation(_))));
    }
}
