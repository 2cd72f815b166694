//! Re-serialization of records to the delimited format and the matching
//! single-header reader.

use std::{
    io::{Read, Write},
    path::Path,
};

use log::info;

use crate::{
    dataset::{DatasetId, DatasetStore},
    error::{IntakeError, Result},
    io_utils,
    record::{self, Record},
    schema::ColumnSchema,
    storage::TableBackend,
};

/// Writes a header line from `schema` followed by one line per record.
pub fn write_records<'a, W, I>(writer: W, schema: &ColumnSchema, records: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Record>,
{
    write_records_with_delimiter(writer, schema, records, io_utils::DEFAULT_CSV_DELIMITER)
}

pub fn write_records_with_delimiter<'a, W, I>(
    writer: W,
    schema: &ColumnSchema,
    records: I,
    delimiter: u8,
) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Record>,
{
    let mut csv_writer = io_utils::open_csv_writer(writer, delimiter);
    csv_writer.write_record(schema.iter())?;
    let mut written = 0usize;
    for record in records {
        csv_writer.write_record(record.to_row(schema))?;
        written += 1;
    }
    csv_writer.flush()?;
    Ok(written)
}

pub fn records_to_string<'a, I>(schema: &ColumnSchema, records: I) -> Result<String>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut buffer = Vec::new();
    write_records(&mut buffer, schema, records)?;
    String::from_utf8(buffer).map_err(|err| IntakeError::Parse {
        line: None,
        message: err.to_string(),
    })
}

/// Reads a uniform CSV whose first line is the header.
pub fn read_uniform<R: Read>(reader: R) -> Result<(ColumnSchema, Vec<Record>)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let schema = ColumnSchema::from_names(headers.iter());
    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        let cells = row.iter().map(str::to_string).collect::<Vec<_>>();
        records.push(record::normalize_row(&schema, &cells));
    }
    Ok((schema, records))
}

/// Writes stored dataset `id` to `path` (stdout for `-`), returning the row count.
pub async fn export_dataset<B: TableBackend>(
    store: &DatasetStore<B>,
    id: DatasetId,
    path: &Path,
) -> Result<usize> {
    let dataset = store.get(id).await?;
    let writer = io_utils::open_output(Some(path))?;
    let written = write_records(writer, &dataset.schema, &dataset.records)?;
    info!("Exported {written} row(s) from dataset #{id} to {path:?}");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_are_written_unquoted() {
        let schema = ColumnSchema::from_names(["ID", "NAME"]);
        let record: Record = [("ID", "1"), ("NAME", "Alice")].into_iter().collect();
        let text = records_to_string(&schema, [&record]).unwrap();
        assert_eq!(text, "ID,NAME\n1,Alice\n");
    }

    #[test]
    fn embedded_delimiters_and_newlines_are_escaped() {
        let schema = ColumnSchema::from_names(["CONTACT \nNO.", "NOTE"]);
        let record: Record = [("CONTACT \nNO.", "555"), ("NOTE", "say \"hi\", then go")]
            .into_iter()
            .collect();
        let text = records_to_string(&schema, [&record]).unwrap();
        assert_eq!(text, "\"CONTACT \nNO.\",NOTE\n555,\"say \"\"hi\"\", then go\"\n");

        let (schema_back, records_back) = read_uniform(text.as_bytes()).unwrap();
        assert_eq!(schema_back, schema);
        assert_eq!(records_back, vec![record]);
    }
}
