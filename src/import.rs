use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::debug;
use rayon::prelude::*;
use tower_lsp::lsp_types::Url;
use walkdir::WalkDir;

use crate::library::CompanyEntry;
use crate::store::StoreError;

/// Check if a file path looks like a library document (.json), case-insensitive.
pub fn is_library_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn modified_ms(path: &Path) -> Option<i64> {
    let modified: SystemTime = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).timestamp_millis())
}

fn file_url(path: &Path) -> String {
    path.canonicalize()
        .ok()
        .and_then(|p| Url::from_file_path(p).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read one library document and stamp it the way a fresh download is
/// stamped: the file's modification time stands in for Last-Modified.
pub fn read_library(path: &Path) -> Result<CompanyEntry, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut entry: CompanyEntry =
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    if entry.company_code.trim().is_empty() {
        return Err(StoreError::MissingCode);
    }

    let remote = modified_ms(path);
    entry.source_url = file_url(path);
    entry.local_timestamp = Some(Utc::now().timestamp_millis());
    entry.remote_timestamp = remote;
    entry.local_remote_timestamp = remote;
    Ok(entry)
}

/// Resolve files and directories into library documents, in a stable order.
pub fn collect_library_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .flat_map(|p| {
            if p.is_dir() {
                let mut files: Vec<PathBuf> = WalkDir::new(p)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && is_library_file(e.path()))
                    .map(|e| e.into_path())
                    .collect();
                files.sort();
                files
            } else {
                vec![p.clone()]
            }
        })
        .collect()
}

/// Read every library under `paths` in parallel. Results keep the order of
/// `collect_library_files`.
pub fn import_paths(paths: &[PathBuf]) -> Vec<(PathBuf, Result<CompanyEntry, StoreError>)> {
    collect_library_files(paths)
        .into_par_iter()
        .map(|path| {
            let result = read_library(&path);
            (path, result)
        })
        .collect()
}

/// Refresh `remote_timestamp` for entries whose source is a local file.
/// Returns how many entries now report an update.
pub fn check_updates(entries: &mut [CompanyEntry]) -> usize {
    for entry in entries.iter_mut() {
        let Some(path) = Url::parse(&entry.source_url)
            .ok()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
        else {
            continue;
        };
        match modified_ms(&path) {
            Some(ms) => entry.remote_timestamp = Some(ms),
            None => debug!("cannot stat {}", path.display()),
        }
    }
    entries.iter().filter(|e| e.has_update()).count()
}
