//! SQLite document store - connection management and schema
//!
//! This file contains:
//! - Database struct definition
//! - Location resolution from the configured URI and database name
//! - Schema creation
//!
//! Document operations are in the tables/ subdirectory.

use parking_lot::Mutex;
use rusqlite::{Connection, Result as SqliteResult};
use std::path::{Path, PathBuf};

/// URIs that select a private in-memory store
const MEMORY_URIS: [&str; 2] = ["sqlite::memory:", ":memory:"];

/// Main database wrapper; one connection shared behind a Mutex
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the store for `database_name` under `uri` and initialize its schema
    pub fn open(uri: &str, database_name: &str) -> SqliteResult<Self> {
        let conn = match resolve_location(uri, database_name) {
            None => Connection::open_in_memory()?,
            Some(path) => {
                // Create parent directory if it doesn't exist
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).ok();
                    }
                }
                Connection::open(&path)?
            }
        };

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Create the documents table
    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock();

        // One row per collection: each collection holds exactly one document
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

/// Map a storage URI and database name to a database file.
///
/// `None` means an in-memory store. Otherwise the URI (with an optional
/// `sqlite://` prefix) names the directory holding `<database_name>.db`.
pub fn resolve_location(uri: &str, database_name: &str) -> Option<PathBuf> {
    let uri = uri.trim();
    if MEMORY_URIS.contains(&uri) {
        return None;
    }

    let dir = uri.strip_prefix("sqlite://").unwrap_or(uri);
    let dir = if dir.is_empty() { "." } else { dir };
    Some(Path::new(dir).join(format!("{}.db", database_name)))
}
