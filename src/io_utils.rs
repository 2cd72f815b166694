//! I/O utilities for delimited reading and writing.
//!
//! All spreadsheet-export I/O in csv-intake flows through this module. It provides:
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding via `encoding_rs_io`, defaulting to UTF-8 with
//!   BOM removal.
//! - **Raw rows**: every line is read positionally with no header
//!   interpretation; empty lines are skipped and rows may differ in width.
//! - **Writers**: output uses `QuoteStyle::Necessary` so plain values are written
//!   byte-for-byte and only values with delimiters, quotes, or newlines are quoted.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::{QuoteStyle, Terminator};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::{
    error::{IntakeError, Result},
    header::RawRow,
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| IntakeError::validation(format!("Unknown encoding '{value}'"))),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Wraps `reader` so that its bytes are transcoded from `encoding` into UTF-8.
pub fn decoding_reader<R: Read>(reader: R, encoding: &'static Encoding) -> impl Read {
    DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_override(true)
        .strip_bom(true)
        .build(reader)
}

pub fn open_raw_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader)
}

pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_dash(path) {
        return Ok(Box::new(std::io::stdin().lock()));
    }
    let file = File::open(path).map_err(|err| IntakeError::Parse {
        line: None,
        message: format!("opening input file {path:?}: {err}"),
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Reads every non-empty line of the input as a positional row.
pub fn read_raw_rows<R: Read>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<RawRow>> {
    let mut csv_reader = open_raw_reader(decoding_reader(reader, encoding), delimiter);
    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) && record.len() <= 1 {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

pub fn open_csv_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer)
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) if !is_dash(p) => {
            let file = File::create(p).map_err(|err| {
                IntakeError::StorageUnavailable(format!("creating output file {p:?}: {err}"))
            })?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => Ok(Box::new(std::io::stdout())),
    }
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_rows_keep_ragged_widths_and_skip_blank_lines() {
        let input = "a,b,c\n\nd\n\"e,1\",f\n";
        let rows = read_raw_rows(input.as_bytes(), b',', UTF_8).unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["d".to_string()],
                vec!["e,1".to_string(), "f".to_string()],
            ]
        );
    }

    #[test]
    fn latin1_input_is_transcoded() {
        let bytes = b"caf\xe9,x\n";
        let encoding = resolve_encoding(Some("latin1")).unwrap();
        let rows = read_raw_rows(&bytes[..], b',', encoding).unwrap();
        assert_eq!(rows[0][0], "café");
    }

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(b';')), b';');
    }
}
