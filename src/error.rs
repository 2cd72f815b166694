//! Error taxonomy shared by ingestion, filtering, and storage.
//!
//! Library functions return [`IntakeError`]; the CLI layer wraps these in
//! `anyhow` context before reporting them.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IntakeError>;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("failed to parse delimited input{}: {message}", line_suffix(*line))]
    Parse { line: Option<u64>, message: String },
    #[error("input has {found} row(s); at least {required} are required (metadata, two header rows, data)")]
    InsufficientRows { found: usize, required: usize },
    #[error("could not determine headers: found {found} column name(s), at least {required} required")]
    InsufficientHeaders { found: usize, required: usize },
    #[error("{0}")]
    Validation(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("storage limit exceeded: write needs {required} byte(s) but only {available} remain")]
    StorageQuotaExceeded { required: u64, available: u64 },
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },
    #[error("\"{file_name}\" is already attached to '{owner}'")]
    DuplicateAttachment { owner: String, file_name: String },
    #[error("stored data under '{key}' was corrupt and has been discarded: {reason}")]
    CorruptData { key: String, reason: String },
}

fn line_suffix(line: Option<u64>) -> String {
    match line {
        Some(line) => format!(" at line {line}"),
        None => String::new(),
    }
}

impl IntakeError {
    pub fn validation(message: impl Into<String>) -> Self {
        IntakeError::Validation(message.into())
    }

    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        IntakeError::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Errors that leave stored state intact and can be retried or ignored.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IntakeError::CorruptData { .. }
                | IntakeError::StorageQuotaExceeded { .. }
                | IntakeError::DuplicateAttachment { .. }
                | IntakeError::Validation(_)
        )
    }
}

impl From<csv::Error> for IntakeError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            return IntakeError::StorageUnavailable(err.to_string());
        }
        let line = err.position().map(|pos| pos.line());
        IntakeError::Parse {
            line,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for IntakeError {
    fn from(err: std::io::Error) -> Self {
        IntakeError::StorageUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_mention_line_when_known() {
        let err = IntakeError::Parse {
            line: Some(7),
            message: "unterminated quote".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to parse delimited input at line 7: unterminated quote"
        );
    }

    #[test]
    fn quota_errors_are_recoverable() {
        let err = IntakeError::StorageQuotaExceeded {
            required: 10,
            available: 2,
        };
        assert!(err.is_recoverable());
        assert!(!IntakeError::StorageUnavailable("disk".into()).is_recoverable());
    }
}
