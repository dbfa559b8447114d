//! Record store - in-memory cache of every record, mirrored to the document store
//!
//! Reads and in-place mutations only touch memory. Persisting is explicit:
//! `save`/`persist` snapshot the value and hand it to a background task that
//! upserts it, so the caller never waits on storage. The returned handle can
//! be awaited or dropped; `flush` waits for everything still in flight.

use crate::db::Database;
use crate::models::{ChannelHistories, Record, RecordKind, UnreadBuffer};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Background write; resolves to whether the document was stored
pub type PendingWrite = JoinHandle<bool>;

/// Where the document store lives
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub uri: String,
    pub database_name: String,
}

pub struct RecordStore {
    db: RwLock<Option<Arc<Database>>>,
    cache: Mutex<BTreeMap<RecordKind, Record>>,
    writes: TaskTracker,
    /// Held across close/wait/reopen so one flush cannot reopen the tracker under another
    flush_lock: tokio::sync::Mutex<()>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            db: RwLock::new(None),
            cache: Mutex::new(BTreeMap::new()),
            writes: TaskTracker::new(),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Connect to the document store. Returns false on any failure; there is no retry.
    pub fn init(&self, config: &StorageConfig) -> bool {
        match Database::open(&config.uri, &config.database_name) {
            Ok(db) => {
                *self.db.write() = Some(Arc::new(db));
                log::info!("[STORE] Connected to database '{}'", config.database_name);
                true
            }
            Err(e) => {
                log::error!(
                    "[STORE] Failed to connect to database '{}': {}",
                    config.database_name,
                    e
                );
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.db.read().is_some()
    }

    fn database(&self) -> Option<Arc<Database>> {
        self.db.read().clone()
    }

    /// Load every record into memory, creating missing documents with their defaults.
    /// A record that fails to load falls back to its default.
    pub fn load_all(&self) {
        let Some(db) = self.database() else {
            log::error!("[STORE] Database not initialized, skipping load");
            return;
        };

        let mut loaded = BTreeMap::new();
        for kind in RecordKind::all() {
            let record = match load_record(&db, kind) {
                Ok(record) => {
                    log::debug!("[STORE] Loaded '{}' ({} items)", kind, record.len());
                    record
                }
                Err(e) => {
                    log::error!("[STORE] Failed to load '{}', using default: {}", kind, e);
                    kind.default_record()
                }
            };
            loaded.insert(kind, record);
        }

        let count = loaded.len();
        *self.cache.lock() = loaded;
        log::info!("[STORE] Loaded {} records into memory", count);
    }

    /// Snapshot of a cached record
    pub fn get(&self, kind: RecordKind) -> Option<Record> {
        self.cache.lock().get(&kind).cloned()
    }

    /// Run `f` against the live cached record. Changes are not persisted
    /// until `persist` (or `save`) is called.
    ///
    /// The cache stays locked while `f` runs; `f` must not call back into the store.
    pub fn with_record<R>(&self, kind: RecordKind, f: impl FnOnce(&mut Record) -> R) -> Option<R> {
        let mut cache = self.cache.lock();
        cache.get_mut(&kind).map(f)
    }

    pub fn with_history<R>(&self, f: impl FnOnce(&mut ChannelHistories) -> R) -> Option<R> {
        self.with_record(RecordKind::History, |record| record.as_history_mut().map(f))
            .flatten()
    }

    pub fn with_memory<R>(&self, f: impl FnOnce(&mut Vec<String>) -> R) -> Option<R> {
        self.with_record(RecordKind::Memory, |record| record.as_memory_mut().map(f))
            .flatten()
    }

    pub fn with_unread<R>(&self, f: impl FnOnce(&mut UnreadBuffer) -> R) -> Option<R> {
        self.with_record(RecordKind::Unread, |record| record.as_unread_mut().map(f))
            .flatten()
    }

    /// Persist a copy of `record` in the background.
    /// Returns `None` without writing when storage is not initialized.
    pub fn save(&self, record: &Record) -> Option<PendingWrite> {
        self.spawn_write(record.clone())
    }

    /// Persist the current cached value of `kind`
    pub fn persist(&self, kind: RecordKind) -> Option<PendingWrite> {
        let record = self.get(kind)?;
        self.spawn_write(record)
    }

    /// Overwrite the cached value of the record's kind and persist it
    pub fn replace(&self, record: Record) -> Option<PendingWrite> {
        self.cache.lock().insert(record.kind(), record.clone());
        self.spawn_write(record)
    }

    /// Persist every cached record
    pub fn save_all(&self) -> Vec<PendingWrite> {
        if !self.is_initialized() {
            log::error!("[STORE] Database not initialized, skipping save of all records");
            return Vec::new();
        }

        let records: Vec<Record> = self.cache.lock().values().cloned().collect();
        log::info!("[STORE] Saving {} cached records", records.len());
        records
            .into_iter()
            .filter_map(|record| self.spawn_write(record))
            .collect()
    }

    /// Wait until every background write issued so far has finished
    pub async fn flush(&self) {
        let _flushing = self.flush_lock.lock().await;
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    /// Number of background writes still running
    #[cfg(test)]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// The document currently held in storage for `kind`
    #[cfg(test)]
    pub fn stored_document(&self, kind: RecordKind) -> Option<Value> {
        self.database()?.find_document(kind.collection()).ok()?
    }

    fn spawn_write(&self, record: Record) -> Option<PendingWrite> {
        let Some(db) = self.database() else {
            log::warn!("[STORE] Database not initialized, '{}' not saved", record.kind());
            return None;
        };
        Some(self.writes.spawn_blocking(move || write_record(&db, &record)))
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn load_record(db: &Database, kind: RecordKind) -> Result<Record, String> {
    let collection = kind.collection();
    let document = db
        .find_document(collection)
        .map_err(|e| format!("query failed: {}", e))?;

    match document {
        Some(document) => match document.get("data") {
            Some(data) => Record::from_value(kind, data.clone())
                .map_err(|e| format!("unexpected '{}' data shape: {}", collection, e)),
            None => Ok(kind.default_record()),
        },
        None => {
            log::info!("[STORE] No '{}' document found, initializing", collection);
            let default = kind.default_record();
            db.insert_document_if_absent(collection, &wrap(&default)?)
                .map_err(|e| format!("insert failed: {}", e))?;
            Ok(default)
        }
    }
}

fn write_record(db: &Database, record: &Record) -> bool {
    let collection = record.kind().collection();
    let result = wrap(record).and_then(|document| {
        db.upsert_document(collection, &document)
            .map_err(|e| e.to_string())
    });

    match result {
        Ok(()) => {
            log::debug!("[STORE] Saved '{}'", collection);
            true
        }
        Err(e) => {
            log::error!("[STORE] Failed to save '{}': {}", collection, e);
            false
        }
    }
}

/// `{ data: <record> }`
fn wrap(record: &Record) -> Result<Value, String> {
    let data = record
        .to_value()
        .map_err(|e| format!("failed to encode '{}': {}", record.kind(), e))?;
    Ok(json!({ "data": data }))
}
