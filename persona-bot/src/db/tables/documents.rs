//! Document operations - one JSON document per collection

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Result as SqliteResult};
use serde_json::Value;

use super::super::Database;

fn encode(document: &Value) -> SqliteResult<String> {
    serde_json::to_string(document).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

impl Database {
    /// Get the document stored in a collection, if any
    pub fn find_document(&self, collection: &str) -> SqliteResult<Option<Value>> {
        let conn = self.conn.lock();

        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))),
            None => Ok(None),
        }
    }

    /// Insert a document only when the collection is still empty.
    /// Returns true if the document was inserted.
    pub fn insert_document_if_absent(&self, collection: &str, document: &Value) -> SqliteResult<bool> {
        let json = encode(document)?;
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "INSERT OR IGNORE INTO documents (collection, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![collection, json, now],
        )?;

        Ok(rows_affected > 0)
    }

    /// Replace the collection's document, creating it if missing
    pub fn upsert_document(&self, collection: &str, document: &Value) -> SqliteResult<()> {
        let json = encode(document)?;
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        // Use INSERT OR REPLACE for upsert behavior, keeping the original created_at
        conn.execute(
            "INSERT OR REPLACE INTO documents (collection, data, created_at, updated_at)
             VALUES (
                ?1, ?2,
                COALESCE((SELECT created_at FROM documents WHERE collection = ?1), ?3),
                ?3
             )",
            params![collection, json, now],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use serde_json::json;

    fn memory_db() -> Database {
        Database::open("sqlite::memory:", "test").unwrap()
    }

    #[test]
    fn test_missing_collection_has_no_document() {
        let db = memory_db();
        assert_eq!(db.find_document("memory").unwrap(), None);
    }

    #[test]
    fn test_insert_if_absent_keeps_existing_document() {
        let db = memory_db();

        assert!(db.insert_document_if_absent("memory", &json!({"data": []})).unwrap());
        assert!(!db.insert_document_if_absent("memory", &json!({"data": ["other"]})).unwrap());

        assert_eq!(db.find_document("memory").unwrap(), Some(json!({"data": []})));
    }

    #[test]
    fn test_upsert_overwrites() {
        let db = memory_db();

        db.upsert_document("setting", &json!({"data": {"mode": "calm"}})).unwrap();
        db.upsert_document("setting", &json!({"data": {"mode": "cheerful"}})).unwrap();

        assert_eq!(
            db.find_document("setting").unwrap(),
            Some(json!({"data": {"mode": "cheerful"}}))
        );
    }

    #[test]
    fn test_collections_are_independent() {
        let db = memory_db();

        db.upsert_document("emotion", &json!({"data": {"joy": 5}})).unwrap();

        assert_eq!(db.find_document("schedule").unwrap(), None);
        assert!(db.find_document("emotion").unwrap().is_some());
    }
}
