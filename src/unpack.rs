//! Support bundle unpacking.
//!
//! A bundle is a `.zip` that may hold further `.zip` archives and gzipped
//! logs at any depth. Everything is expanded next to where it was found,
//! then the tree is searched for files whose name matches a [`LogFilePattern`].

use crate::error::UnpackError;
use flate2::read::MultiGzDecoder;
use regex::Regex;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Router request logs, including rotated ones (`router-request.2024-01-15.log`).
pub const DEFAULT_LOG_PATTERN: &str = r"^router-request.*\.log$";

/// Length of the bundle stem used to name the extraction directory.
const EXTRACT_DIR_CHARS: usize = 15;

static DEFAULT_REGEX: OnceLock<Regex> = OnceLock::new();

/// File-name pattern selecting the log files to ingest.
#[derive(Debug, Clone)]
pub struct LogFilePattern(Regex);

impl LogFilePattern {
    pub fn new(pattern: &str) -> Result<Self, UnpackError> {
        Ok(Self(Regex::new(pattern)?))
    }

    /// Match against a bare file name, not a full path.
    pub fn matches(&self, file_name: &str) -> bool {
        self.0.is_match(file_name)
    }
}

impl Default for LogFilePattern {
    fn default() -> Self {
        Self(
            DEFAULT_REGEX
                .get_or_init(|| {
                    Regex::new(DEFAULT_LOG_PATTERN)
                        .expect("hard-coded regex should always compile")
                })
                .clone(),
        )
    }
}

/// Directory a bundle is extracted into: a sibling named after the first
/// characters of the bundle's stem.
pub fn extraction_dir(bundle: &Path) -> PathBuf {
    let stem: String = bundle
        .file_stem()
        .map(|s| s.to_string_lossy().chars().take(EXTRACT_DIR_CHARS).collect())
        .unwrap_or_default();
    bundle
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(stem)
}

/// Unpack `bundle` and return the log files in it, sorted by path.
pub fn unpack(bundle: &Path, pattern: &LogFilePattern) -> Result<Vec<PathBuf>, UnpackError> {
    if !has_extension(bundle, "zip") {
        return Err(UnpackError::NotAZip(bundle.to_path_buf()));
    }

    let dir = extraction_dir(bundle);
    info!("Unpacking \"{}\" to {}", bundle.display(), dir.display());
    extract_zip(bundle, &dir)?;

    info!("Unpacking nested archives in {}", dir.display());
    expand_nested(&dir)?;

    info!("Locating relevant log files");
    let log_files = find_log_files(&dir, pattern)?;
    for file in &log_files {
        info!(
            "Found \"{}\"",
            file.strip_prefix(&dir).unwrap_or(file).display()
        );
    }

    if log_files.is_empty() {
        return Err(UnpackError::NoLogFiles(bundle.to_path_buf()));
    }
    Ok(log_files)
}

/// Every regular file below `root` whose name matches `pattern`, sorted by path.
pub fn find_log_files(root: &Path, pattern: &LogFilePattern) -> Result<Vec<PathBuf>, UnpackError> {
    let mut files: Vec<PathBuf> = walk_files(root)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .map(|name| pattern.matches(&name.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Expand nested `.zip` and `.gz` files in place until none are left unprocessed.
fn expand_nested(root: &Path) -> Result<(), UnpackError> {
    let mut done: HashSet<PathBuf> = HashSet::new();
    loop {
        let pending: Vec<PathBuf> = walk_files(root)?
            .into_iter()
            .filter(|p| (has_extension(p, "zip") || has_extension(p, "gz")) && !done.contains(p))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        for path in pending {
            if has_extension(&path, "zip") {
                let parent = path.parent().unwrap_or(root).to_path_buf();
                debug!("Extracting nested \"{}\"", path.display());
                extract_zip(&path, &parent)?;
            } else {
                debug!("Decompressing \"{}\"", path.display());
                gunzip(&path)?;
            }
            done.insert(path);
        }
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), UnpackError> {
    let zip_err = |source| UnpackError::Zip {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(|source| io_err(archive_path, source))?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_err)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(
                "Skipping entry \"{}\" in \"{}\": path escapes the archive",
                entry.name(),
                archive_path.display()
            );
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|source| io_err(&outpath, source))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }
        let mut outfile = File::create(&outpath).map_err(|source| io_err(&outpath, source))?;
        io::copy(&mut entry, &mut outfile).map_err(|source| io_err(&outpath, source))?;
    }
    Ok(())
}

/// Decompress `x.gz` to `x` next to it, including every member of a
/// multi-member (concatenated) gzip file.
fn gunzip(path: &Path) -> Result<PathBuf, UnpackError> {
    let target = path.with_extension("");
    let input = File::open(path).map_err(|source| io_err(path, source))?;
    let mut decoder = MultiGzDecoder::new(input);
    let mut output = File::create(&target).map_err(|source| io_err(&target, source))?;
    io::copy(&mut decoder, &mut output).map_err(|source| io_err(path, source))?;
    Ok(target)
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>, UnpackError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| UnpackError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn io_err(path: &Path, source: io::Error) -> UnpackError {
    UnpackError::Io {
        path: path.to_path_buf(),
        source,
    }
}
