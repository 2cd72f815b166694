use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{dataset::ChartType, view::DEFAULT_PAGE_SIZE};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Import multi-header spreadsheet exports, filter them, and keep datasets, attachments, and a follow-up ledger",
    long_about = None
)]
pub struct Cli {
    /// Store directory for datasets, attachments, and the ledger
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// YAML configuration file (header layout, attachment limits, ledger columns)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a register export, filter and preview it, optionally save or track it
    Import(ImportArgs),
    /// Manage saved datasets and their chart configurations
    #[command(subcommand)]
    Datasets(DatasetCommands),
    /// Manage per-record attachments
    #[command(subcommand)]
    Attach(AttachCommands),
    /// Inspect and edit the follow-up ledger
    #[command(subcommand)]
    Ledger(LedgerCommands),
    /// Write or print the effective configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Input file to import (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Row-level filters such as `AGE > 25` or `NAME contains 'sh'`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Override the number of leading columns named by the primary header row
    #[arg(long = "fixed-columns")]
    pub fixed_columns: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// 1-based page of records to preview
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    /// Records per preview page
    #[arg(long = "page-size", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,
    /// Maximum number of columns shown in the preview table
    #[arg(long = "max-columns", default_value_t = 8)]
    pub max_columns: usize,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Sort directive of the form `column[:asc|desc]`
    #[arg(long)]
    pub sort: Option<String>,
    #[command(flatten)]
    pub preview: PreviewArgs,
    /// Write the filtered records as CSV instead of previewing them (`-` for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Save the filtered records as a dataset with this name
    #[arg(long)]
    pub save: Option<String>,
    /// Description stored with a saved dataset
    #[arg(long, default_value = "")]
    pub description: String,
    /// Merge the filtered records into the follow-up ledger and persist it
    #[arg(long)]
    pub track: bool,
}

#[derive(Debug, Subcommand)]
pub enum DatasetCommands {
    /// List saved datasets, most recent first
    List,
    /// Preview a saved dataset
    Show {
        id: u64,
        #[command(flatten)]
        preview: PreviewArgs,
    },
    /// Delete a dataset together with its chart configurations
    Delete { id: u64 },
    /// Totals across every saved dataset
    Stats,
    /// Write a saved dataset as CSV
    Export {
        id: u64,
        /// Output file (stdout if omitted)
        #[arg(short = 'o', long = "output", default_value = "-")]
        output: PathBuf,
    },
    /// Save a chart configuration for a dataset
    ChartAdd(ChartAddArgs),
    /// List chart configurations of a dataset
    Charts { id: u64 },
}

#[derive(Debug, Args)]
pub struct ChartAddArgs {
    pub id: u64,
    /// Chart type: bar, line, area, or pie
    #[arg(long = "type", value_parser = parse_chart_type)]
    pub chart_type: ChartType,
    #[arg(long)]
    pub name: String,
    /// Chart settings as a JSON object (axes, title, colour)
    #[arg(long, default_value = "{}")]
    pub config: String,
}

#[derive(Debug, Subcommand)]
pub enum AttachCommands {
    /// Upload files for one record
    Upload {
        owner: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List a record's attachments
    List { owner: String },
    /// Remove one attachment by id
    Remove { owner: String, id: String },
    /// Remove every attachment of a record
    Clear { owner: String },
    /// Report attachment storage usage
    Usage,
}

#[derive(Debug, Subcommand)]
pub enum LedgerCommands {
    /// List every tracked record
    List,
    /// Search tracked records by name, age, contact, or key
    Search { term: String },
    /// Remove a tracked record by key
    Remove { key: String },
    /// Import a file and merge its filtered records into the ledger
    Merge(SourceArgs),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write the effective configuration as YAML
    Init {
        output: PathBuf,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration as YAML
    Show,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

fn parse_chart_type(value: &str) -> Result<ChartType, String> {
    value.parse().map_err(|err: crate::error::IntakeError| err.to_string())
}
