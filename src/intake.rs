//! One import from raw bytes to a filtered record view.
//!
//! An [`ImportSession`] owns the reconstructed schema, the normalized records,
//! the metadata rows that preceded the headers, and the active [`FilterSet`].

use std::{io::Read, path::Path};

use encoding_rs::Encoding;
use log::info;

use crate::{
    error::Result,
    filter::FilterSet,
    header::{self, HeaderLayout, RawRow},
    io_utils,
    record::{self, Record},
    schema::ColumnSchema,
};

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Defaults to the file extension (tab for `.tsv`, comma otherwise).
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            delimiter: None,
            encoding: encoding_rs::UTF_8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportSession {
    schema: ColumnSchema,
    metadata: Vec<RawRow>,
    records: Vec<Record>,
    filters: FilterSet,
}

impl ImportSession {
    pub fn from_path(path: &Path, layout: &HeaderLayout, options: &ReadOptions) -> Result<Self> {
        let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
        let reader = io_utils::open_input(path)?;
        let session = Self::read(reader, delimiter, options.encoding, layout)?;
        info!(
            "Imported {} record(s) with {} column(s) from {path:?} (delimiter '{}')",
            session.records.len(),
            session.schema.len(),
            io_utils::printable_delimiter(delimiter)
        );
        Ok(session)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        layout: &HeaderLayout,
        options: &ReadOptions,
    ) -> Result<Self> {
        let delimiter = options
            .delimiter
            .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
        Self::read(reader, delimiter, options.encoding, layout)
    }

    fn read<R: Read>(
        reader: R,
        delimiter: u8,
        encoding: &'static Encoding,
        layout: &HeaderLayout,
    ) -> Result<Self> {
        let rows = io_utils::read_raw_rows(reader, delimiter, encoding)?;
        Self::from_rows(rows, layout)
    }

    pub fn from_rows(rows: Vec<RawRow>, layout: &HeaderLayout) -> Result<Self> {
        let reconstruction = header::reconstruct(rows, layout)?;
        let records = record::normalize_rows(&reconstruction.schema, &reconstruction.data);
        Ok(ImportSession {
            schema: reconstruction.schema,
            metadata: reconstruction.metadata,
            records,
            filters: FilterSet::new(),
        })
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn metadata(&self) -> &[RawRow] {
        &self.metadata
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterSet {
        &mut self.filters
    }

    /// Records passing every active filter, in input order.
    pub fn filtered(&self) -> Vec<&Record> {
        self.filters.apply(&self.records)
    }

    /// Metadata rows mapped onto the schema, then a header record, then the
    /// filtered records. This is the row set handed on for tracking.
    pub fn carry_forward(&self) -> Vec<Record> {
        self.metadata
            .iter()
            .map(|row| record::normalize_row(&self.schema, row))
            .chain(std::iter::once(record::header_record(&self.schema)))
            .chain(self.filtered().into_iter().cloned())
            .collect()
    }
}
