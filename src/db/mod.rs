pub mod queries;
pub mod schema;
pub mod write;

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::model::{Footnote, Reference};
use crate::store::{stored_reference_id, PasteStore};

/// Get the database file path
/// `PASTE_NORMALIZER_DB` overrides the default under `$HOME`
pub fn get_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PASTE_NORMALIZER_DB") {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow!("HOME environment variable not set"))?;
    Ok(PathBuf::from(home).join(".paste-normalizer").join("store.db"))
}

/// Open or create the database at `path` (or [`get_db_path`]), applying schema if needed
pub fn open_or_create_db(path: Option<&Path>) -> Result<Connection> {
    let db_path = match path {
        Some(p) => p.to_path_buf(),
        None => get_db_path()?,
    };

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(&db_path)?;
    schema::initialize_schema(&conn)?;

    Ok(conn)
}

#[cfg(test)]
pub fn open_test_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schema::initialize_schema(&conn)?;
    Ok(conn)
}

/// [`PasteStore`] backed by SQLite.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            conn: open_or_create_db(path)?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

impl PasteStore for SqliteStore {
    fn put_footnote(&mut self, book_id: &str, footnote: &Footnote) -> Result<()> {
        write::upsert_footnote(&self.conn, book_id, footnote)
    }

    fn put_reference(&mut self, book_id: &str, reference: &Reference) -> Result<()> {
        let reference_id = stored_reference_id(reference)?;
        write::upsert_reference(&self.conn, book_id, reference_id, reference)
    }

    fn get_footnote(&self, book_id: &str, footnote_id: &str) -> Result<Option<Footnote>> {
        queries::get_footnote(&self.conn, book_id, footnote_id)
    }

    fn get_reference(&self, book_id: &str, reference_id: &str) -> Result<Option<Reference>> {
        queries::get_reference(&self.conn, book_id, reference_id)
    }

    fn list_footnotes(&self, book_id: &str) -> Result<Vec<Footnote>> {
        queries::list_footnotes(&self.conn, book_id)
    }

    fn list_references(&self, book_id: &str) -> Result<Vec<Reference>> {
        queries::list_references(&self.conn, book_id)
    }

    fn delete_book(&mut self, book_id: &str) -> Result<usize> {
        write::delete_book(&self.conn, book_id)
    }
}
