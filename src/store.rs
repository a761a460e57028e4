use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::index::MetadataIndex;
use crate::library::CompanyEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid library JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("library has no company code")]
    MissingCode,
    #[error("company `{0}` already exists")]
    DuplicateCode(String),
    #[error("unknown company `{0}`")]
    UnknownCode(String),
    #[error("store has no backing file")]
    NoPath,
}

/// The ordered company library collection, persisted as a JSON array.
///
/// Every mutation bumps `version` and rebuilds the shared index snapshot, so
/// readers holding an older snapshot are never affected.
#[derive(Debug, Default)]
pub struct CompanyStore {
    path: Option<PathBuf>,
    entries: Vec<CompanyEntry>,
    version: u64,
    snapshot: Arc<MetadataIndex>,
}

impl CompanyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Point the store at another backing file (or none) and load it. On
    /// failure the current entries are kept.
    pub fn rebind(&mut self, path: Option<PathBuf>) -> Result<(), StoreError> {
        self.path = path;
        if self.path.is_some() {
            self.reload()
        } else {
            self.replace_all(Vec::new());
            Ok(())
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[CompanyEntry] {
        &self.entries
    }

    pub fn get(&self, code: &str) -> Option<&CompanyEntry> {
        self.entries.iter().find(|e| e.company_code == code)
    }

    /// The index for the current version. Cheap to clone and safe to keep
    /// across later mutations.
    pub fn snapshot(&self) -> Arc<MetadataIndex> {
        Arc::clone(&self.snapshot)
    }

    /// Re-read the backing file, replacing the in-memory entries.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let path = self.path.clone().ok_or(StoreError::NoPath)?;
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("store {} does not exist yet", path.display());
                Vec::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        self.replace_all(entries);
        Ok(())
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let path = self.path.as_ref().ok_or(StoreError::NoPath)?;
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            StoreError::Json {
                path: path.clone(),
                source,
            }
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Replace the whole collection, dropping later duplicates of a code.
    pub fn replace_all(&mut self, entries: Vec<CompanyEntry>) {
        let mut unique: Vec<CompanyEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if unique.iter().any(|e| e.company_code == entry.company_code) {
                warn!("duplicate company `{}` ignored", entry.company_code);
                continue;
            }
            unique.push(entry);
        }
        self.entries = unique;
        self.bump();
    }

    /// Append a new company at the end of the search order.
    pub fn add(&mut self, entry: CompanyEntry) -> Result<(), StoreError> {
        if entry.company_code.trim().is_empty() {
            return Err(StoreError::MissingCode);
        }
        if self.get(&entry.company_code).is_some() {
            return Err(StoreError::DuplicateCode(entry.company_code));
        }
        self.entries.push(entry);
        self.bump();
        Ok(())
    }

    /// Replace an existing company in place, keeping its position.
    pub fn replace(&mut self, entry: CompanyEntry) -> Result<(), StoreError> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.company_code == entry.company_code)
            .ok_or_else(|| StoreError::UnknownCode(entry.company_code.clone()))?;
        *slot = entry;
        self.bump();
        Ok(())
    }

    /// Replace when the code exists, otherwise append. Returns true when an
    /// existing entry was replaced.
    pub fn upsert(&mut self, entry: CompanyEntry) -> Result<bool, StoreError> {
        if self.get(&entry.company_code).is_some() {
            self.replace(entry)?;
            Ok(true)
        } else {
            self.add(entry)?;
            Ok(false)
        }
    }

    pub fn remove(&mut self, code: &str) -> Result<CompanyEntry, StoreError> {
        let pos = self.position(code)?;
        let removed = self.entries.remove(pos);
        self.bump();
        Ok(removed)
    }

    /// Move a company to `index` in the search order (clamped to the end).
    pub fn move_to(&mut self, code: &str, index: usize) -> Result<(), StoreError> {
        let pos = self.position(code)?;
        let entry = self.entries.remove(pos);
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
        self.bump();
        Ok(())
    }

    fn position(&self, code: &str) -> Result<usize, StoreError> {
        self.entries
            .iter()
            .position(|e| e.company_code == code)
            .ok_or_else(|| StoreError::UnknownCode(code.to_string()))
    }

    fn bump(&mut self) {
        self.version += 1;
        self.snapshot = Arc::new(MetadataIndex::build(&self.entries));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ClassDef;

    fn entry(code: &str) -> CompanyEntry {
        CompanyEntry {
            company_code: code.to_string(),
            description: format!("{code} company"),
            ..Default::default()
        }
    }

    fn codes(store: &CompanyStore) -> Vec<&str> {
        store.entries().iter().map(|e| e.company_code.as_str()).collect()
    }

    #[test]
    fn add_rejects_duplicates_and_blank_codes() {
        let mut store = CompanyStore::new();
        store.add(entry("CD")).unwrap();
        assert!(matches!(store.add(entry("CD")), Err(StoreError::DuplicateCode(_))));
        assert!(matches!(store.add(entry(" ")), Err(StoreError::MissingCode)));
        // Codes are case-sensitive.
        store.add(entry("cd")).unwrap();
        assert_eq!(codes(&store), vec!["CD", "cd"]);
    }

    #[test]
    fn mutations_bump_version_and_snapshot() {
        let mut store = CompanyStore::new();
        let before = store.snapshot();
        let v0 = store.version();

        let mut lk = entry("LK");
        lk.classes.push(ClassDef {
            class_name: "Foo".to_string(),
            constructors: vec![],
        });
        store.add(lk).unwrap();

        assert!(store.version() > v0);
        assert!(before.classes().is_empty());
        assert_eq!(store.snapshot().classes().len(), 1);
    }

    #[test]
    fn reorder_and_remove() {
        let mut store = CompanyStore::new();
        for code in ["A", "B", "C"] {
            store.add(entry(code)).unwrap();
        }
        store.move_to("C", 0).unwrap();
        assert_eq!(codes(&store), vec!["C", "A", "B"]);
        store.move_to("C", 99).unwrap();
        assert_eq!(codes(&store), vec!["A", "B", "C"]);

        let removed = store.remove("B").unwrap();
        assert_eq!(removed.company_code, "B");
        assert_eq!(codes(&store), vec!["A", "C"]);
        assert!(matches!(store.remove("B"), Err(StoreError::UnknownCode(_))));
        assert!(matches!(store.move_to("Z", 0), Err(StoreError::UnknownCode(_))));
    }

    #[test]
    fn replace_keeps_position() {
        let mut store = CompanyStore::new();
        store.add(entry("A")).unwrap();
        store.add(entry("B")).unwrap();

        let mut newer = entry("A");
        newer.description = "updated".to_string();
        assert!(store.upsert(newer).unwrap());
        assert!(!store.upsert(entry("C")).unwrap());

        assert_eq!(codes(&store), vec!["A", "B", "C"]);
        assert_eq!(store.get("A").unwrap().description, "updated");
        assert!(matches!(store.replace(entry("Z")), Err(StoreError::UnknownCode(_))));
    }

    #[test]
    fn replace_all_drops_duplicate_codes() {
        let mut store = CompanyStore::new();
        let mut second = entry("A");
        second.description = "second".to_string();
        store.replace_all(vec![entry("A"), second, entry("B")]);
        assert_eq!(codes(&store), vec!["A", "B"]);
        assert_eq!(store.get("A").unwrap().description, "A company");
    }

    #[test]
    fn save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("companies.json");

        let mut store = CompanyStore::open(&path).unwrap();
        assert!(store.entries().is_empty());
        store.add(entry("CD")).unwrap();
        store.add(entry("LK")).unwrap();
        store.save().unwrap();

        let reopened = CompanyStore::open(&path).unwrap();
        assert_eq!(codes(&reopened), vec!["CD", "LK"]);
        assert_eq!(reopened.get("LK").unwrap().description, "LK company");
    }

    #[test]
    fn rebind_keeps_version_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companies.json");
        let mut seeded = CompanyStore::open(&path).unwrap();
        seeded.add(entry("CD")).unwrap();
        seeded.save().unwrap();

        let mut store = CompanyStore::new();
        store.add(entry("OLD")).unwrap();
        let v = store.version();
        store.rebind(Some(path.clone())).unwrap();
        assert_eq!(codes(&store), vec!["CD"]);
        assert!(store.version() > v);

        std::fs::write(&path, "oops").unwrap();
        assert!(store.rebind(Some(path)).is_err());
        assert_eq!(codes(&store), vec!["CD"]);

        store.rebind(None).unwrap();
        assert!(store.entries().is_empty());
        assert!(store.path().is_none());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companies.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(CompanyStore::open(&path), Err(StoreError::Json { .. })));
    }

    #[test]
    fn in_memory_store_cannot_save() {
        let store = CompanyStore::new();
        assert!(matches!(store.save(), Err(StoreError::NoPath)));
    }
}
