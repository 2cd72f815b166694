mod common;

use std::fs;

use common::{REGISTER_FIXTURE, TestWorkspace, fixture_path};
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn register() -> String {
    fixture_path(REGISTER_FIXTURE).display().to_string()
}

#[test]
fn import_previews_filtered_records() {
    let workspace = TestWorkspace::new();
    workspace
        .command()
        .args(["import", "-i", &register(), "--filter", "AGE > 25", "--sort", "AGE:desc"])
        .assert()
        .success()
        .stdout(contains("Mina Das"))
        .stdout(contains("Asha Rao"))
        .stdout(contains("Ravi Kumar").not())
        .stdout(contains("Page 1 of 1 (3 record(s))"));
}

#[test]
fn import_writes_filtered_csv() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("filtered.csv");
    workspace
        .command()
        .args([
            "import",
            "-i",
            &register(),
            "--filter",
            "SEX = m",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();
    let contents = fs::read_to_string(&output).unwrap();
    assert!(contents.starts_with("S. NO.,DATE,NAME,AGE,SEX,\"CONTACT \nNO.\""));
    assert_eq!(contents.lines().filter(|l| l.contains("Dr. ")).count(), 3);
}

#[test]
fn save_list_show_and_delete_dataset() {
    let workspace = TestWorkspace::new();
    workspace
        .command()
        .args(["import", "-i", &register(), "--save", "march", "--description", "all"])
        .assert()
        .success()
        .stdout(contains("Saved dataset #1 'march' (6 rows)"));

    workspace
        .command()
        .args(["datasets", "list"])
        .assert()
        .success()
        .stdout(contains("march"));

    workspace
        .command()
        .args(["datasets", "chart-add", "1", "--type", "bar", "--name", "ages", "--config", "{\"x\":\"NAME\"}"])
        .assert()
        .success();

    workspace
        .command()
        .args(["datasets", "stats"])
        .assert()
        .success()
        .stdout(contains("1 dataset(s), 1 chart configuration(s), 6 row(s)"));

    workspace
        .command()
        .args(["datasets", "export", "1"])
        .assert()
        .success()
        .stdout(contains("Leela"));

    workspace
        .command()
        .args(["datasets", "delete", "1"])
        .assert()
        .success();

    workspace
        .command()
        .args(["datasets", "stats"])
        .assert()
        .success()
        .stdout(contains("0 dataset(s), 0 chart configuration(s), 0 row(s)"));

    workspace
        .command()
        .args(["datasets", "show", "1"])
        .assert()
        .failure()
        .stderr(contains("not found"));
}

#[test]
fn chart_type_is_validated() {
    let workspace = TestWorkspace::new();
    workspace
        .command()
        .args(["datasets", "chart-add", "1", "--type", "scatter", "--name", "x"])
        .assert()
        .failure()
        .stderr(contains("Unknown chart type"));
}

#[test]
fn track_skips_headers_and_sentinels() {
    let workspace = TestWorkspace::new();
    workspace
        .command()
        .args(["import", "-i", &register(), "--filter", "AGE > 25", "--track"])
        .assert()
        .success()
        .stdout(contains("Ledger: 2 added, 0 already tracked, 5 ignored (2 total)"));

    workspace
        .command()
        .args(["ledger", "merge", "-i", &register(), "--filter", "AGE > 25"])
        .assert()
        .success()
        .stdout(contains("Ledger: 0 added, 2 already tracked"));

    workspace
        .command()
        .args(["ledger", "search", "mina"])
        .assert()
        .success()
        .stdout(contains("Mina Das"))
        .stdout(contains("Asha Rao").not());

    workspace
        .command()
        .args(["ledger", "remove", "4"])
        .assert()
        .success()
        .stdout(contains("(1 remaining)"));

    workspace
        .command()
        .args(["ledger", "remove", "4"])
        .assert()
        .failure();
}

#[test]
fn tracking_the_same_import_twice_adds_nothing() {
    let workspace = TestWorkspace::new();
    workspace
        .command()
        .args(["import", "-i", &register(), "--track"])
        .assert()
        .success()
        .stdout(contains("Ledger: 5 added, 0 already tracked, 5 ignored (5 total)"));

    workspace
        .command()
        .args(["import", "-i", &register(), "--track"])
        .assert()
        .success()
        .stdout(contains("Ledger: 0 added, 5 already tracked, 5 ignored (5 total)"));

    workspace
        .command()
        .args(["ledger", "search", "walk-in"])
        .assert()
        .success()
        .stdout(contains("record-"));
}

#[test]
fn attachments_upload_list_and_usage() {
    let workspace = TestWorkspace::new();
    let scan = workspace.write_bytes("scan.pdf", b"%PDF-1.4 test");
    let note = workspace.write("note.txt", "plain text");

    workspace
        .command()
        .args(["attach", "upload", "4"])
        .arg(&scan)
        .arg(&note)
        .assert()
        .success()
        .stdout(contains("Attached scan.pdf (13 bytes)"))
        .stderr(contains("rejected note.txt"));

    workspace
        .command()
        .args(["attach", "list", "4"])
        .assert()
        .success()
        .stdout(contains("scan.pdf"))
        .stdout(contains("application/pdf"));

    workspace
        .command()
        .args(["attach", "upload", "4"])
        .arg(&scan)
        .assert()
        .failure()
        .stderr(contains("already attached"));

    workspace
        .command()
        .args(["attach", "usage"])
        .assert()
        .success()
        .stdout(contains("of 5242880 bytes"));

    workspace
        .command()
        .args(["attach", "clear", "4"])
        .assert()
        .success()
        .stdout(contains("Removed 1 attachment(s)"));
}

#[test]
fn config_file_overrides_fixed_columns() {
    let workspace = TestWorkspace::new();
    let config = workspace.write("intake.yaml", "header:\n  fixed_columns: 3\n");
    workspace
        .command()
        .arg("--config")
        .arg(&config)
        .args(["import", "-i", &register(), "--max-columns", "20"])
        .assert()
        .success()
        // Only the first three primary names remain; the rest comes from the secondary row.
        .stdout(contains("DrugA"))
        .stdout(contains("DIAGNOSIS").not());
}

#[test]
fn config_init_writes_a_loadable_file() {
    let workspace = TestWorkspace::new();
    let config = workspace.path().join("intake.yaml");
    workspace
        .command()
        .args(["config", "init"])
        .arg(&config)
        .assert()
        .success();
    let written = fs::read_to_string(&config).unwrap();
    assert!(written.contains("fixed_columns: 10"));
    assert!(written.contains("max_owner_blob_bytes: 4194304"));

    workspace
        .command()
        .args(["config", "init"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("--force"));

    workspace
        .command()
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("storage_key: SAVED_PATIENTS"));
}

#[test]
fn too_short_input_fails_cleanly() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("short.csv", "a,b\nc,d\n");
    workspace
        .command()
        .args(["import", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("error:"))
        .stderr(contains("at least 5 are required"));
}
