// Query operations on the database
use crate::model::{Footnote, Reference};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;

fn get_record<T: DeserializeOwned>(conn: &Connection, sql: &str, book_id: &str, id: &str) -> Result<Option<T>> {
    let record: Option<String> = conn
        .query_row(sql, [book_id, id], |row| row.get(0))
        .optional()?;

    match record {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn list_records<T: DeserializeOwned>(conn: &Connection, sql: &str, book_id: &str) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([book_id], |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(serde_json::from_str(&row?)?);
    }
    Ok(records)
}

/// Get one stored footnote
pub fn get_footnote(conn: &Connection, book_id: &str, footnote_id: &str) -> Result<Option<Footnote>> {
    get_record(
        conn,
        "SELECT record FROM footnotes WHERE book_id = ?1 AND footnote_id = ?2",
        book_id,
        footnote_id,
    )
}

/// Get one stored reference
pub fn get_reference(conn: &Connection, book_id: &str, reference_id: &str) -> Result<Option<Reference>> {
    get_record(
        conn,
        "SELECT record FROM bibliography WHERE book_id = ?1 AND reference_id = ?2",
        book_id,
        reference_id,
    )
}

/// All footnotes of a book, oldest first
pub fn list_footnotes(conn: &Connection, book_id: &str) -> Result<Vec<Footnote>> {
    list_records(
        conn,
        "SELECT record FROM footnotes WHERE book_id = ?1 ORDER BY rowid",
        book_id,
    )
}

/// All references of a book, oldest first
pub fn list_references(conn: &Connection, book_id: &str) -> Result<Vec<Reference>> {
    list_records(
        conn,
        "SELECT record FROM bibliography WHERE book_id = ?1 ORDER BY rowid",
        book_id,
    )
}
