//! Store - JSONL-backed record storage
//!
//! Each collection is a `{name}.jsonl` file of full record snapshots.
//! Replay on open is last-write-wins; deletes append a tombstone line.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::{Filter, Record};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store directory is locked by another process: {0}")]
    Locked(String),
}

/// Tombstone marker key in the JSONL log
const TOMBSTONE_KEY: &str = "_deleted";

/// JSONL-backed record store
///
/// Not internally synchronized - callers serialize access, typically by
/// owning the store inside an actor task.
pub struct Store {
    dir: PathBuf,
    // Held for the lifetime of the store; the lock releases on drop
    _lock: File,
    collections: HashMap<String, HashMap<String, Value>>,
}

impl Store {
    /// Open a store directory, creating it if needed
    ///
    /// Takes an exclusive advisory lock on `{dir}/.lock` and replays all
    /// collection logs into memory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        debug!(dir = %dir.display(), "Store::open: called");
        fs::create_dir_all(&dir)?;

        let lock_path = dir.join(".lock");
        let lock = OpenOptions::new().create(true).write(true).open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(dir.display().to_string()))?;

        let mut store = Self {
            dir,
            _lock: lock,
            collections: HashMap::new(),
        };
        store.sync()?;
        Ok(store)
    }

    /// Reload all collections from their JSONL logs
    pub fn sync(&mut self) -> Result<(), StoreError> {
        debug!(dir = %self.dir.display(), "Store::sync: called");
        self.collections.clear();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };

            let mut records: HashMap<String, Value> = HashMap::new();
            let file = File::open(&path)?;
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let value: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        // A torn write at the tail is recoverable; skip it
                        warn!(collection = %name, lineno, error = %e, "Skipping malformed log line");
                        continue;
                    }
                };
                if let Some(id) = value.get(TOMBSTONE_KEY).and_then(|v| v.as_str()) {
                    records.remove(id);
                } else if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
                    records.insert(id.to_string(), value);
                } else {
                    warn!(collection = %name, lineno, "Skipping log line without id");
                }
            }

            debug!(collection = %name, count = records.len(), "Store::sync: replayed collection");
            self.collections.insert(name, records);
        }

        Ok(())
    }

    /// Create a new record, failing if the id already exists
    pub fn create<T: Record>(&mut self, record: T) -> Result<String, StoreError> {
        let id = record.id().to_string();
        let collection = T::collection_name();
        debug!(%id, collection, "Store::create: called");

        if self
            .collections
            .get(collection)
            .is_some_and(|c| c.contains_key(&id))
        {
            return Err(StoreError::Duplicate(id));
        }

        let value = serde_json::to_value(&record)?;
        self.append(collection, &value)?;
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), value);
        Ok(id)
    }

    /// Get a record by id
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let collection = T::collection_name();
        debug!(%id, collection, "Store::get: called");
        match self.collections.get(collection).and_then(|c| c.get(id)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Update an existing record, failing if it does not exist
    pub fn update<T: Record>(&mut self, record: T) -> Result<(), StoreError> {
        let id = record.id().to_string();
        let collection = T::collection_name();
        debug!(%id, collection, "Store::update: called");

        if !self
            .collections
            .get(collection)
            .is_some_and(|c| c.contains_key(&id))
        {
            return Err(StoreError::NotFound(id));
        }

        let value = serde_json::to_value(&record)?;
        self.append(collection, &value)?;
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, value);
        Ok(())
    }

    /// Delete a record by id, appending a tombstone
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<(), StoreError> {
        let collection = T::collection_name();
        debug!(%id, collection, "Store::delete: called");

        let existed = self
            .collections
            .get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false);
        if !existed {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let tombstone = serde_json::json!({ TOMBSTONE_KEY: id });
        self.append(collection, &tombstone)?;
        Ok(())
    }

    /// List records matching all of the given filters
    ///
    /// Results are ordered by `updated_at`, then id, for determinism.
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>, StoreError> {
        let collection = T::collection_name();
        debug!(collection, filter_count = filters.len(), "Store::list: called");

        let mut records: Vec<T> = Vec::new();
        if let Some(values) = self.collections.get(collection) {
            for value in values.values() {
                let record: T = serde_json::from_value(value.clone())?;
                let fields = record.indexed_fields();
                if filters.iter().all(|f| f.matches(&fields)) {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| {
            a.updated_at()
                .cmp(&b.updated_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(records)
    }

    /// Rewrite all collection logs down to the live record set
    pub fn compact(&mut self) -> Result<(), StoreError> {
        debug!(dir = %self.dir.display(), "Store::compact: called");
        for (name, records) in &self.collections {
            let path = self.collection_path(name);
            let tmp = path.with_extension("jsonl.tmp");
            {
                let mut file = File::create(&tmp)?;
                for value in records.values() {
                    serde_json::to_writer(&mut file, value)?;
                    file.write_all(b"\n")?;
                }
                file.flush()?;
            }
            fs::rename(&tmp, &path)?;
            info!(collection = %name, count = records.len(), "Compacted collection log");
        }
        Ok(())
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.jsonl"))
    }

    fn append(&self, collection: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        serde_json::to_writer(&mut file, value)?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}
