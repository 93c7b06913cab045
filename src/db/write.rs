// Write operations on the database
use crate::model::{Footnote, Reference};
use anyhow::Result;
use rusqlite::Connection;

/// Insert a footnote, or replace the record stored under the same key
/// `created_at` keeps the first insertion time
pub fn upsert_footnote(conn: &Connection, book_id: &str, footnote: &Footnote) -> Result<()> {
    let record = serde_json::to_string(footnote)?;
    let now = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO footnotes
         (book_id, footnote_id, original_identifier, kind, record, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(book_id, footnote_id) DO UPDATE SET
            original_identifier = excluded.original_identifier,
            kind = excluded.kind,
            record = excluded.record,
            updated_at = excluded.updated_at",
        (
            book_id,
            &footnote.footnote_id,
            &footnote.original_identifier,
            &footnote.kind,
            &record,
            &now,
        ),
    )?;

    Ok(())
}

/// Insert a finalized reference under `reference_id`, or replace its record
pub fn upsert_reference(
    conn: &Connection,
    book_id: &str,
    reference_id: &str,
    reference: &Reference,
) -> Result<()> {
    let record = serde_json::to_string(reference)?;
    let now = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO bibliography
         (book_id, reference_id, kind, record, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(book_id, reference_id) DO UPDATE SET
            kind = excluded.kind,
            record = excluded.record,
            updated_at = excluded.updated_at",
        (book_id, reference_id, &reference.kind, &record, &now),
    )?;

    Ok(())
}

/// Delete all footnotes and references of a book, returning the number of rows removed
pub fn delete_book(conn: &Connection, book_id: &str) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let footnotes = tx.execute("DELETE FROM footnotes WHERE book_id = ?1", [book_id])?;
    let references = tx.execute("DELETE FROM bibliography WHERE book_id = ?1", [book_id])?;
    tx.commit()?;
    Ok(footnotes + references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn footnote(content: &str) -> Footnote {
        Footnote {
            footnote_id: "bookFn17".to_string(),
            content: content.to_string(),
            original_identifier: "7".to_string(),
            ref_id: "bookFnref17".to_string(),
            kind: "general".to_string(),
            correlation_id: None,
        }
    }

    #[test]
    fn test_upsert_footnote_replaces_record() {
        let conn = db::open_test_db().unwrap();

        upsert_footnote(&conn, "book", &footnote("first")).unwrap();
        let created: String = conn
            .query_row("SELECT created_at FROM footnotes", [], |row| row.get(0))
            .unwrap();

        upsert_footnote(&conn, "book", &footnote("second")).unwrap();

        let (count, record, created_after): (i64, String, String) = conn
            .query_row(
                "SELECT COUNT(*), record, created_at FROM footnotes",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert!(record.contains("second"));
        assert_eq!(created, created_after);
    }

    #[test]
    fn test_delete_book_counts_rows() {
        let conn = db::open_test_db().unwrap();
        upsert_footnote(&conn, "book", &footnote("x")).unwrap();
        let reference =
            Reference::resolved("smith2020".into(), "S".into(), "S".into(), "general", Vec::new());
        upsert_reference(&conn, "book", "smith2020", &reference).unwrap();
        upsert_reference(&conn, "other", "smith2020", &reference).unwrap();

        assert_eq!(delete_book(&conn, "book").unwrap(), 2);
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM bibliography", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
