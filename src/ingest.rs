use crate::error::IngestError;
use crate::record::parse_record;
use crate::store::{InsertOutcome, RecordStore};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Settings threaded into the [`Ingestor`] at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Drop requests from `127.0.0.1` (the router's own health checks)
    pub filter_self: bool,
    /// Tag given to records that carry no `_tag`
    pub default_tag: String,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            filter_self: true,
            default_tag: String::new(),
        }
    }
}

/// Tally of what happened to each line of one or more files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    pub accepted: usize,
    pub skipped_duplicate: usize,
    pub skipped_filtered: usize,
}

impl AddAssign for IngestResult {
    fn add_assign(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_filtered += other.skipped_filtered;
    }
}

/// What [`Ingestor::ingest_all`] does when a file holds a malformed line.
///
/// A file that cannot be opened or read always aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Abort,
    SkipFile,
}

/// Outcome of ingesting a list of files.
#[derive(Debug, Default, Serialize)]
pub struct IngestSummary {
    pub totals: IngestResult,
    pub files_ingested: usize,
    pub files_failed: Vec<PathBuf>,
}

pub struct Ingestor {
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Ingest one newline-delimited JSON file into `store`.
    ///
    /// The first malformed line aborts the file; records accepted before it stay in the store.
    pub fn ingest(&self, store: &mut RecordStore, path: &Path) -> Result<IngestResult, IngestError> {
        let file = File::open(path).map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Indexing \"{}\"", path.display());
        let result = self.ingest_reader(store, path, BufReader::new(file))?;
        debug!(
            accepted = result.accepted,
            duplicates = result.skipped_duplicate,
            filtered = result.skipped_filtered,
            "Indexed \"{}\"",
            path.display()
        );
        Ok(result)
    }

    /// Ingest lines from `reader`; `path` is only used in error reports.
    pub fn ingest_reader<R: BufRead>(
        &self,
        store: &mut RecordStore,
        path: &Path,
        reader: R,
    ) -> Result<IngestResult, IngestError> {
        let mut result = IngestResult::default();

        for (idx, line) in reader.lines().enumerate() {
            let line_num = idx + 1;
            let line = line.map_err(|source| IngestError::Read {
                path: path.to_path_buf(),
                line: line_num,
                source,
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let record = parse_record(&line, &self.options.default_tag).map_err(|source| {
                IngestError::Malformed {
                    path: path.to_path_buf(),
                    line: line_num,
                    content: line.clone(),
                    source,
                }
            })?;

            if self.options.filter_self && record.is_loopback() {
                result.skipped_filtered += 1;
                continue;
            }

            match store.insert(record) {
                InsertOutcome::Inserted => result.accepted += 1,
                InsertOutcome::DuplicateSkipped => result.skipped_duplicate += 1,
            }
        }

        Ok(result)
    }

    /// Ingest `paths` in order.
    pub fn ingest_all<P: AsRef<Path>>(
        &self,
        store: &mut RecordStore,
        paths: &[P],
        policy: FailurePolicy,
    ) -> Result<IngestSummary, IngestError> {
        let mut summary = IngestSummary::default();
        for path in paths {
            match self.ingest(store, path.as_ref()) {
                Ok(result) => {
                    summary.totals += result;
                    summary.files_ingested += 1;
                }
                Err(e @ IngestError::Malformed { .. }) if policy == FailurePolicy::SkipFile => {
                    warn!("Skipping file: {}", e);
                    summary.files_failed.push(e.path().to_path_buf());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }
}
