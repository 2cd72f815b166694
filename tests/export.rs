mod common;

use std::sync::Arc;

use common::{REGISTER_FIXTURE, TestWorkspace, fixture_path};
use csv_intake::{
    dataset::DatasetStore,
    error::IntakeError,
    export::{export_dataset, read_uniform, records_to_string, write_records},
    header::HeaderLayout,
    intake::{ImportSession, ReadOptions},
    storage::MemoryTables,
};

fn register() -> ImportSession {
    ImportSession::from_path(
        &fixture_path(REGISTER_FIXTURE),
        &HeaderLayout::default(),
        &ReadOptions::default(),
    )
    .expect("import fixture")
}

#[test]
fn register_round_trips_through_uniform_csv() {
    let session = register();
    let text = records_to_string(session.schema(), session.records()).unwrap();
    let (schema, records) = read_uniform(text.as_bytes()).unwrap();
    assert_eq!(&schema, session.schema());
    assert_eq!(records, session.records());
}

#[test]
fn plain_rows_are_reproduced_byte_for_byte() {
    let input = "ID,NAME,AGE\n1,Asha,30\n2,Ravi,\n";
    let (schema, records) = read_uniform(input.as_bytes()).unwrap();
    let mut output = Vec::new();
    let written = write_records(&mut output, &schema, &records).unwrap();
    assert_eq!(written, 2);
    assert_eq!(String::from_utf8(output).unwrap(), input);
}

#[tokio::test]
async fn stored_dataset_exports_to_file() {
    let workspace = TestWorkspace::new();
    let session = register();
    let store = DatasetStore::new(Arc::new(MemoryTables::new()));
    let id = store
        .save("march", session.schema(), session.records().to_vec(), "")
        .await
        .unwrap();

    let path = workspace.path().join("march.csv");
    assert_eq!(export_dataset(&store, id, &path).await.unwrap(), 6);
    let (schema, records) = read_uniform(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(&schema, session.schema());
    assert_eq!(records.len(), 6);

    assert!(matches!(
        export_dataset(&store, id + 1, &path).await,
        Err(IntakeError::NotFound { .. })
    ));
}
