pub mod attachment;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod filter;
pub mod header;
pub mod intake;
pub mod io_utils;
pub mod ledger;
pub mod record;
pub mod schema;
pub mod storage;
pub mod table;
pub mod view;

use std::{
    env,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, info, warn};

use crate::{
    attachment::{AttachmentStore, NewAttachment},
    cli::{
        AttachCommands, ChartAddArgs, Cli, Commands, ConfigCommands, DatasetCommands, ImportArgs,
        LedgerCommands, PreviewArgs, SourceArgs,
    },
    config::IntakeConfig,
    dataset::DatasetStore,
    intake::{ImportSession, ReadOptions},
    ledger::ProgressLedger,
    record::Record,
    schema::ColumnSchema,
    storage::{FileBlobs, FileTables},
    view::{Page, SortDirective},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_intake", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = IntakeConfig::load_or_default(cli.config.as_deref())?;
    let workspace = Workspace::new(config, cli.store.as_deref());
    debug!("Using store directory {:?}", workspace.store_dir);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Starting async runtime")?;
    runtime.block_on(dispatch(cli.command, &workspace))
}

/// Settings resolved once per invocation.
struct Workspace {
    config: IntakeConfig,
    store_dir: PathBuf,
}

impl Workspace {
    fn new(config: IntakeConfig, store_override: Option<&Path>) -> Self {
        let store_dir = config.resolve_store_dir(store_override);
        Workspace { config, store_dir }
    }

    async fn datasets(&self) -> Result<DatasetStore<FileTables>> {
        let tables = FileTables::open(&self.store_dir)
            .await
            .with_context(|| format!("Opening table store in {:?}", self.store_dir))?;
        Ok(DatasetStore::new(Arc::new(tables)))
    }

    async fn blobs(&self) -> Result<Arc<FileBlobs>> {
        let blobs =
            FileBlobs::open_with_capacity(&self.store_dir, self.config.attachments.budget_bytes)
                .await
                .with_context(|| format!("Opening blob store in {:?}", self.store_dir))?;
        Ok(Arc::new(blobs))
    }

    async fn attachments(&self) -> Result<AttachmentStore<FileBlobs>> {
        Ok(AttachmentStore::new(
            self.blobs().await?,
            self.config.attachments.clone(),
        ))
    }

    async fn ledger(&self) -> Result<ProgressLedger<FileBlobs>> {
        let mut ledger = ProgressLedger::new(self.blobs().await?, self.config.ledger.clone());
        ledger.load().await.context("Loading ledger")?;
        Ok(ledger)
    }

    fn open_session(&self, source: &SourceArgs) -> Result<ImportSession> {
        let mut layout = self.config.header.clone();
        if let Some(fixed) = source.fixed_columns {
            layout.fixed_columns = fixed;
        }
        let options = ReadOptions {
            delimiter: source.delimiter,
            encoding: io_utils::resolve_encoding(source.input_encoding.as_deref())?,
        };
        info!(
            "Importing '{}' (fixed columns: {})",
            source.input.display(),
            layout.fixed_columns
        );
        let mut session = ImportSession::from_path(&source.input, &layout, &options)
            .with_context(|| format!("Importing {:?}", source.input))?;
        for condition in filter::parse_filters(&source.filters)? {
            session.filters_mut().add(condition);
        }
        Ok(session)
    }
}

async fn dispatch(command: Commands, workspace: &Workspace) -> Result<()> {
    match command {
        Commands::Import(args) => handle_import(&args, workspace).await,
        Commands::Datasets(command) => handle_datasets(command, workspace).await,
        Commands::Attach(command) => handle_attach(command, workspace).await,
        Commands::Ledger(command) => handle_ledger(command, workspace).await,
        Commands::Config(command) => handle_config(command, workspace),
    }
}

fn handle_config(command: ConfigCommands, workspace: &Workspace) -> Result<()> {
    match command {
        ConfigCommands::Init { output, force } => {
            if output.exists() && !force {
                bail!("{output:?} already exists; pass --force to replace it");
            }
            workspace.config.save(&output)?;
            info!("Wrote configuration to {output:?}");
            println!("Wrote {}", output.display());
        }
        ConfigCommands::Show => print!("{}", workspace.config.to_yaml()?),
    }
    Ok(())
}

async fn handle_import(args: &ImportArgs, workspace: &Workspace) -> Result<()> {
    let session = workspace.open_session(&args.source)?;
    let mut rows = session.filtered();
    if let Some(sort) = &args.sort {
        let directive: SortDirective = sort.parse()?;
        view::sort_records(&mut rows, &directive);
    }
    info!(
        "{} of {} record(s) match {} filter(s)",
        rows.len(),
        session.records().len(),
        session.filters().len()
    );

    match &args.output {
        Some(output) => {
            let writer = io_utils::open_output(Some(output))?;
            let written = export::write_records(writer, session.schema(), rows.iter().copied())
                .with_context(|| format!("Writing records to {output:?}"))?;
            info!("Wrote {written} record(s) to {output:?}");
        }
        None => print_preview(session.schema(), &rows, &args.preview),
    }

    if let Some(name) = &args.save {
        let store = workspace.datasets().await?;
        let records = rows.iter().map(|record| (*record).clone()).collect::<Vec<_>>();
        let id = store
            .save(name, session.schema(), records, &args.description)
            .await
            .with_context(|| format!("Saving dataset '{name}'"))?;
        println!("Saved dataset #{id} '{}' ({} rows)", name.trim(), rows.len());
    }

    if args.track {
        merge_into_ledger(&session, workspace).await?;
    }
    Ok(())
}

async fn merge_into_ledger(session: &ImportSession, workspace: &Workspace) -> Result<()> {
    let mut ledger = workspace.ledger().await?;
    let carried = session.carry_forward();
    let outcome = ledger.merge(&carried).await.context("Merging into ledger")?;
    ledger.persist().await.context("Persisting ledger")?;
    println!(
        "Ledger: {} added, {} already tracked, {} ignored ({} total)",
        outcome.added,
        outcome.duplicates,
        outcome.ignored,
        ledger.len()
    );
    Ok(())
}

fn print_preview(schema: &ColumnSchema, rows: &[&Record], preview: &PreviewArgs) {
    let page = Page::new(preview.page, preview.page_size);
    let shown = page.slice(rows);
    print!(
        "{}",
        table::render_records(schema, shown.iter().copied(), preview.max_columns)
    );
    println!(
        "Page {} of {} ({} record(s))",
        page.number,
        page.total_pages(rows.len()).max(1),
        rows.len()
    );
}

async fn handle_datasets(command: DatasetCommands, workspace: &Workspace) -> Result<()> {
    let store = workspace.datasets().await?;
    match command {
        DatasetCommands::List => {
            let rows = store
                .list()
                .await?
                .into_iter()
                .map(|dataset| {
                    vec![
                        dataset.id.to_string(),
                        dataset.name,
                        dataset.row_count.to_string(),
                        dataset.schema.len().to_string(),
                        dataset.created_at.format("%Y-%m-%d %H:%M").to_string(),
                        dataset.description,
                    ]
                })
                .collect::<Vec<_>>();
            if rows.is_empty() {
                println!("No datasets saved.");
            } else {
                table::print_table(
                    &headers(&["id", "name", "rows", "columns", "uploaded", "description"]),
                    &rows,
                );
            }
        }
        DatasetCommands::Show { id, preview } => {
            let dataset = store.get(id).await?;
            println!("#{} {} ({} rows)", dataset.id, dataset.name, dataset.row_count);
            println!("Columns: {}", dataset.schema.iter().join(", "));
            let rows = dataset.records.iter().collect::<Vec<_>>();
            print_preview(&dataset.schema, &rows, &preview);
        }
        DatasetCommands::Delete { id } => {
            store
                .delete(id)
                .await
                .with_context(|| format!("Deleting dataset #{id}"))?;
            println!("Deleted dataset #{id}");
        }
        DatasetCommands::Stats => {
            let stats = store.stats().await?;
            println!(
                "{} dataset(s), {} chart configuration(s), {} row(s)",
                stats.total_datasets, stats.total_charts, stats.total_rows
            );
        }
        DatasetCommands::Export { id, output } => {
            let written = export::export_dataset(&store, id, &output)
                .await
                .with_context(|| format!("Exporting dataset #{id}"))?;
            debug!("Exported {written} row(s)");
        }
        DatasetCommands::ChartAdd(args) => add_chart(&store, &args).await?,
        DatasetCommands::Charts { id } => {
            let rows = store
                .charts(id)
                .await?
                .into_iter()
                .map(|chart| {
                    vec![
                        chart.id.to_string(),
                        chart.chart_type.to_string(),
                        chart.name,
                        chart.created_date.format("%Y-%m-%d %H:%M").to_string(),
                        chart.config.to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            if rows.is_empty() {
                println!("No chart configurations for dataset #{id}.");
            } else {
                table::print_table(&headers(&["id", "type", "name", "created", "config"]), &rows);
            }
        }
    }
    Ok(())
}

async fn add_chart(store: &DatasetStore<FileTables>, args: &ChartAddArgs) -> Result<()> {
    let config: serde_json::Value = serde_json::from_str(&args.config)
        .with_context(|| format!("Parsing chart config '{}'", args.config))?;
    if !config.is_object() {
        bail!("Chart config must be a JSON object");
    }
    let chart_id = store
        .save_chart(args.id, args.chart_type, config, &args.name)
        .await
        .with_context(|| format!("Saving chart for dataset #{}", args.id))?;
    println!("Saved {} chart #{chart_id} for dataset #{}", args.chart_type, args.id);
    Ok(())
}

async fn handle_attach(command: AttachCommands, workspace: &Workspace) -> Result<()> {
    let store = workspace.attachments().await?;
    match command {
        AttachCommands::Upload { owner, files } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(
                    NewAttachment::from_path(path)
                        .await
                        .with_context(|| format!("Reading {path:?}"))?,
                );
            }
            let report = store
                .upload(&owner, uploads)
                .await
                .with_context(|| format!("Uploading attachments for '{owner}'"))?;
            for attachment in &report.accepted {
                println!(
                    "Attached {} ({} bytes) as {}",
                    attachment.file_name, attachment.size_bytes, attachment.id
                );
            }
            for rejected in &report.rejected {
                if rejected.error.is_recoverable() {
                    warn!("Rejected {}: {}", rejected.file_name, rejected.error);
                } else {
                    log::error!("Rejected {}: {}", rejected.file_name, rejected.error);
                }
                eprintln!("rejected {}: {}", rejected.file_name, rejected.error);
            }
            if let Some(failed) = report.rejected.iter().find(|r| !r.error.is_recoverable()) {
                bail!("Storage failed while uploading '{}'", failed.file_name);
            }
            if report.accepted.is_empty() {
                bail!("No attachments were accepted for '{owner}'");
            }
        }
        AttachCommands::List { owner } => {
            let attachments = store
                .list(&owner)
                .await
                .with_context(|| format!("Listing attachments for '{owner}'"))?;
            if attachments.is_empty() {
                println!("No attachments for '{owner}'.");
                return Ok(());
            }
            let rows = attachments
                .into_iter()
                .map(|a| {
                    vec![
                        a.id,
                        a.file_name,
                        a.mime_type,
                        a.size_bytes.to_string(),
                        a.uploaded_at.format("%Y-%m-%d %H:%M").to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            table::print_table(&headers(&["id", "file", "type", "bytes", "uploaded"]), &rows);
        }
        AttachCommands::Remove { owner, id } => {
            store
                .remove(&owner, &id)
                .await
                .with_context(|| format!("Removing attachment {id} from '{owner}'"))?;
            println!("Removed attachment {id}");
        }
        AttachCommands::Clear { owner } => {
            let removed = store.clear(&owner).await?;
            println!("Removed {removed} attachment(s) from '{owner}'");
        }
        AttachCommands::Usage => {
            let usage = store.usage().await?;
            println!(
                "Used {} of {} bytes ({} remaining)",
                usage.used, usage.budget, usage.remaining
            );
        }
    }
    Ok(())
}

async fn handle_ledger(command: LedgerCommands, workspace: &Workspace) -> Result<()> {
    match command {
        LedgerCommands::Merge(source) => {
            let session = workspace.open_session(&source)?;
            merge_into_ledger(&session, workspace).await?;
        }
        LedgerCommands::List => {
            let ledger = workspace.ledger().await?;
            print_ledger(&ledger, ledger.entries().iter().collect());
        }
        LedgerCommands::Search { term } => {
            let ledger = workspace.ledger().await?;
            print_ledger(&ledger, ledger.search(&term));
        }
        LedgerCommands::Remove { key } => {
            let mut ledger = workspace.ledger().await?;
            ledger
                .remove(&key)
                .await
                .with_context(|| format!("Removing '{key}' from the ledger"))?;
            println!("Removed '{key}' ({} remaining)", ledger.len());
        }
    }
    Ok(())
}

fn print_ledger(ledger: &ProgressLedger<FileBlobs>, entries: Vec<&ledger::LedgerEntry>) {
    if entries.is_empty() {
        println!("No tracked records.");
        return;
    }
    let columns = &ledger.config().search_columns;
    let mut header = vec!["key".to_string()];
    header.extend(columns.iter().map(|c| c.split_whitespace().join(" ")));
    let rows = entries
        .iter()
        .map(|entry| {
            let mut row = vec![entry.serial.clone()];
            row.extend(columns.iter().map(|c| entry.record.get(c).to_string()));
            row
        })
        .collect::<Vec<_>>();
    table::print_table(&header, &rows);
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}
