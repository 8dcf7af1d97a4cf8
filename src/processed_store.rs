// src/processed_store.rs

use crate::dedup::DedupKey;
use crate::error::StoreError;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Append-only log of processed invoice keys, one per line.
pub struct ProcessedStore {
    path: PathBuf,
}

impl ProcessedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every key in the log. A missing file is an empty set.
    pub fn load(&self) -> Result<HashSet<DedupKey>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No processed-key log yet, starting empty");
                return Ok(HashSet::new());
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let keys: HashSet<DedupKey> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| DedupKey::from(l.to_string()))
            .collect();

        info!(path = %self.path.display(), keys = keys.len(), "Loaded processed-key log");
        Ok(keys)
    }

    /// Append one key. The file is opened and closed per call.
    pub fn save(&self, key: &DedupKey) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        writeln!(file, "{key}").map_err(|e| self.io_err(e))?;

        debug!(key = %key, "Appended processed key");
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// In-memory view of the log, kept in step with the file.
pub struct ProcessedKeys {
    keys: HashSet<DedupKey>,
    store: ProcessedStore,
}

impl ProcessedKeys {
    pub fn open(store: ProcessedStore) -> Result<Self, StoreError> {
        let keys = store.load()?;
        Ok(Self { keys, store })
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    /// Insert into the set, then append to disk.
    pub fn record(&mut self, key: DedupKey) -> Result<(), StoreError> {
        if self.keys.insert(key.clone()) {
            self.store.save(&key)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn log_path(&self) -> &Path {
        self.store.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = ProcessedStore::new(dir.path().join("processed_invoices.txt"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_saved_keys_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/processed_invoices.txt");

        let store = ProcessedStore::new(&path);
        store.save(&DedupKey::from("INV-1::ACC-9::100.00::2024-01-01".to_string())).unwrap();
        store.save(&DedupKey::from("FALLBACK::hash123".to_string())).unwrap();

        let reloaded = ProcessedStore::new(&path).load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(&DedupKey::from("FALLBACK::hash123".to_string())));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "INV-1::ACC-9::100.00::2024-01-01\nFALLBACK::hash123\n");
    }

    #[test]
    fn test_load_trims_and_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "  a::b::c::d  \r\n\n\nFALLBACK::x\n").unwrap();

        let keys = ProcessedStore::new(&path).load().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&DedupKey::from("a::b::c::d".to_string())));
    }

    #[test]
    fn test_record_keeps_set_and_log_in_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut keys = ProcessedKeys::open(ProcessedStore::new(&path)).unwrap();

        let key = DedupKey::from("INV-7::NA::NA::NA".to_string());
        keys.record(key.clone()).unwrap();
        keys.record(key.clone()).unwrap();

        assert!(keys.contains(&key));
        assert_eq!(keys.len(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);

        let reopened = ProcessedKeys::open(ProcessedStore::new(&path)).unwrap();
        assert!(reopened.contains(&key));
    }
}
