//! Batch persistence.
//!
//! [`BatchStore`] is injected into the coordinator as `Arc<dyn BatchStore>`.
//! [`MemoryStore`] keeps everything in process; [`FileStore`] mirrors the same
//! table to a JSON file after every mutation so batches survive a restart.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::FactoryError;
use crate::state_machine::Batch;

pub trait BatchStore: Send + Sync {
    /// Fails with `DuplicateBatch` if the id is taken; the store is left unchanged.
    fn insert(&self, batch: Batch) -> Result<(), FactoryError>;

    /// Replaces an existing batch. Fails with `NotFound` if absent.
    fn update(&self, batch: Batch) -> Result<(), FactoryError>;

    fn get(&self, batch_id: &str) -> Result<Batch, FactoryError>;

    /// All batches in insertion order.
    fn list(&self) -> Vec<Batch>;
}

/// Insertion-ordered batch table.
#[derive(Debug, Default)]
struct Table {
    batches: Vec<Batch>,
    index: HashMap<String, usize>,
}

impl Table {
    fn from_batches(batches: Vec<Batch>) -> Result<Self, FactoryError> {
        let mut table = Table::default();
        for batch in batches {
            table.insert(batch)?;
        }
        Ok(table)
    }

    fn insert(&mut self, batch: Batch) -> Result<(), FactoryError> {
        if self.index.contains_key(&batch.batch_id) {
            return Err(FactoryError::DuplicateBatch(batch.batch_id));
        }
        self.index.insert(batch.batch_id.clone(), self.batches.len());
        self.batches.push(batch);
        Ok(())
    }

    /// Undo the most recent insert.
    fn pop(&mut self) {
        if let Some(batch) = self.batches.pop() {
            self.index.remove(&batch.batch_id);
        }
    }

    /// Swap in a new version, returning the previous one.
    fn replace(&mut self, batch: Batch) -> Result<Batch, FactoryError> {
        let Some(&position) = self.index.get(&batch.batch_id) else {
            return Err(FactoryError::NotFound(format!("batch {}", batch.batch_id)));
        };
        Ok(std::mem::replace(&mut self.batches[position], batch))
    }

    fn get(&self, batch_id: &str) -> Result<Batch, FactoryError> {
        self.index
            .get(batch_id)
            .map(|&position| self.batches[position].clone())
            .ok_or_else(|| FactoryError::NotFound(format!("batch {batch_id}")))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchStore for MemoryStore {
    fn insert(&self, batch: Batch) -> Result<(), FactoryError> {
        self.table.lock().insert(batch)
    }

    fn update(&self, batch: Batch) -> Result<(), FactoryError> {
        self.table.lock().replace(batch).map(|_| ())
    }

    fn get(&self, batch_id: &str) -> Result<Batch, FactoryError> {
        self.table.lock().get(batch_id)
    }

    fn list(&self) -> Vec<Batch> {
        self.table.lock().batches.clone()
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    batches: &'a [Batch],
}

#[derive(Deserialize)]
struct Snapshot {
    batches: Vec<Batch>,
}

/// A [`MemoryStore`]-like table persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    table: Mutex<Table>,
}

impl FileStore {
    /// Open (or create) the store at `path`.
    ///
    /// Features left `running` by a previous process are marked failed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FactoryError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut batches = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str::<Snapshot>(&contents)?.batches
        } else {
            Vec::new()
        };

        let mut recovered = 0;
        for batch in &mut batches {
            recovered += batch.recover_interrupted();
        }
        if recovered > 0 {
            warn!(recovered, "marked interrupted features as failed");
        }

        let store = Self {
            path,
            table: Mutex::new(Table::from_batches(batches)?),
        };
        if recovered > 0 {
            store.persist(&store.table.lock())?;
        }
        info!(path = %store.path.display(), batches = store.table.lock().batches.len(), "file store opened");
        Ok(store)
    }

    /// Write the table to a temp file and rename it over the store file.
    ///
    /// Blocking; async callers go through `spawn_blocking`.
    fn persist(&self, table: &Table) -> Result<(), FactoryError> {
        let json = serde_json::to_string_pretty(&SnapshotRef {
            batches: &table.batches,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| FactoryError::Storage(format!("{}: {e}", self.path.display())))
    }
}

impl BatchStore for FileStore {
    fn insert(&self, batch: Batch) -> Result<(), FactoryError> {
        let mut table = self.table.lock();
        table.insert(batch)?;
        if let Err(e) = self.persist(&table) {
            table.pop();
            return Err(e);
        }
        Ok(())
    }

    fn update(&self, batch: Batch) -> Result<(), FactoryError> {
        let mut table = self.table.lock();
        let previous = table.replace(batch)?;
        if let Err(e) = self.persist(&table) {
            table.replace(previous)?;
            return Err(e);
        }
        Ok(())
    }

    fn get(&self, batch_id: &str) -> Result<Batch, FactoryError> {
        self.table.lock().get(batch_id)
    }

    fn list(&self) -> Vec<Batch> {
        self.table.lock().batches.clone()
    }
}
