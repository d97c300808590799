use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while turning one JSON line into a [`LogRecord`](crate::record::LogRecord).
#[derive(Debug, Error)]
pub enum RecordError {
    /// The line is not valid JSON, or a required key is missing / has the wrong type
    #[error("invalid record: {0}")]
    Json(#[from] serde_json::Error),
    /// A field was present but couldn't be interpreted
    #[error("invalid value for field '{field}': '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// Errors raised by record store queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("timeline interval must be at least one second, got {0}")]
    InvalidInterval(u64),
}

/// Errors raised while ingesting a single log file.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not open '{}': {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("could not read line {line} of '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        line: usize,
        source: io::Error,
    },
    #[error("malformed line {line} of '{}' ({source}): {}", .path.display(), preview(.content))]
    Malformed {
        path: PathBuf,
        line: usize,
        content: String,
        source: RecordError,
    },
}

impl IngestError {
    /// Path of the file whose ingestion failed.
    pub fn path(&self) -> &Path {
        match self {
            IngestError::Open { path, .. }
            | IngestError::Read { path, .. }
            | IngestError::Malformed { path, .. } => path,
        }
    }
}

/// Errors raised while unpacking a support bundle.
#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("expected a .zip file, got '{}'", .0.display())]
    NotAZip(PathBuf),
    #[error("i/o error on '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("could not read archive '{}': {source}", .path.display())]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    #[error("could not walk '{}': {source}", .path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("invalid log file pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("no log files found in '{}'", .0.display())]
    NoLogFiles(PathBuf),
}

const PREVIEW_CHARS: usize = 120;

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{:?}…", head)
    } else {
        format!("{:?}", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_error_names_file_and_line() {
        let err = IngestError::Malformed {
            path: PathBuf::from("/tmp/router-request.log"),
            line: 7,
            content: "{not json".to_string(),
            source: RecordError::InvalidField {
                field: "time",
                value: "yesterday".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("line 7"));
        assert!(msg.contains("/tmp/router-request.log"));
        assert!(msg.contains("{not json"));
        assert_eq!(err.path(), Path::new("/tmp/router-request.log"));
    }

    #[test]
    fn long_lines_are_truncated_in_messages() {
        let long = "x".repeat(500);
        let shown = preview(&long);
        assert!(shown.ends_with('…'));
        assert!(shown.len() < 200);
    }
}
