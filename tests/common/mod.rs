#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use csv_intake::record::Record;
use tempfile::{TempDir, tempdir};

pub const REGISTER_FIXTURE: &str = "clinic_register.csv";
pub const REGISTER_COLUMNS: usize = 13;
pub const REGISTER_RECORDS: usize = 6;

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn record(pairs: &[(&str, &str)]) -> Record {
    pairs.iter().copied().collect()
}

/// Scratch directory holding input files and a store directory.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Store directory used by CLI invocations from this workspace.
    pub fn store(&self) -> PathBuf {
        self.temp_dir.path().join("store")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// A `csv-intake` command already pointed at this workspace's store.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("csv-intake").expect("binary exists");
        cmd.arg("--store").arg(self.store()).env("RUST_LOG", "warn");
        cmd
    }
}
