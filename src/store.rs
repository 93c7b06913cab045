// Persistence of extracted footnotes and references, keyed by book.

use anyhow::{anyhow, Result};

use crate::model::{Footnote, PasteResult, Reference};

/// Put/get contract for the records a paste produces.
///
/// Records are stored verbatim and keyed by `(book_id, footnote_id)` or
/// `(book_id, reference_id)`; putting an existing key replaces the record.
pub trait PasteStore {
    fn put_footnote(&mut self, book_id: &str, footnote: &Footnote) -> Result<()>;

    /// Fails on a reference that has not been finalized yet.
    fn put_reference(&mut self, book_id: &str, reference: &Reference) -> Result<()>;

    fn get_footnote(&self, book_id: &str, footnote_id: &str) -> Result<Option<Footnote>>;

    fn get_reference(&self, book_id: &str, reference_id: &str) -> Result<Option<Reference>>;

    /// Footnotes of a book in first-insertion order.
    fn list_footnotes(&self, book_id: &str) -> Result<Vec<Footnote>>;

    /// References of a book in first-insertion order.
    fn list_references(&self, book_id: &str) -> Result<Vec<Reference>>;

    /// Remove every record of a book, returning how many were removed.
    fn delete_book(&mut self, book_id: &str) -> Result<usize>;

    /// Store every footnote and reference of a paste result.
    fn save_result(&mut self, book_id: &str, result: &PasteResult) -> Result<()> {
        for footnote in &result.footnotes {
            self.put_footnote(book_id, footnote)?;
        }
        for reference in &result.references {
            self.put_reference(book_id, reference)?;
        }
        Ok(())
    }
}

/// Id under which a reference is stored.
pub(crate) fn stored_reference_id(reference: &Reference) -> Result<&str> {
    reference
        .reference_id
        .as_deref()
        .filter(|_| !reference.needs_key_generation)
        .ok_or_else(|| anyhow!("Cannot store a reference that still needs key generation"))
}

/// Store kept in process memory; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    footnotes: Vec<(String, Footnote)>,
    references: Vec<(String, Reference)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn upsert<T>(records: &mut Vec<(String, T)>, book_id: &str, record: T, same: impl Fn(&T) -> bool) {
    match records.iter_mut().find(|(book, r)| book == book_id && same(r)) {
        Some(slot) => slot.1 = record,
        None => records.push((book_id.to_string(), record)),
    }
}

impl PasteStore for MemoryStore {
    fn put_footnote(&mut self, book_id: &str, footnote: &Footnote) -> Result<()> {
        upsert(&mut self.footnotes, book_id, footnote.clone(), |f| {
            f.footnote_id == footnote.footnote_id
        });
        Ok(())
    }

    fn put_reference(&mut self, book_id: &str, reference: &Reference) -> Result<()> {
        let id = stored_reference_id(reference)?;
        upsert(&mut self.references, book_id, reference.clone(), |r| r.id() == id);
        Ok(())
    }

    fn get_footnote(&self, book_id: &str, footnote_id: &str) -> Result<Option<Footnote>> {
        Ok(self
            .footnotes
            .iter()
            .find(|(book, f)| book == book_id && f.footnote_id == footnote_id)
            .map(|(_, f)| f.clone()))
    }

    fn get_reference(&self, book_id: &str, reference_id: &str) -> Result<Option<Reference>> {
        Ok(self
            .references
            .iter()
            .find(|(book, r)| book == book_id && r.id() == reference_id)
            .map(|(_, r)| r.clone()))
    }

    fn list_footnotes(&self, book_id: &str) -> Result<Vec<Footnote>> {
        Ok(self
            .footnotes
            .iter()
            .filter(|(book, _)| book == book_id)
            .map(|(_, f)| f.clone())
            .collect())
    }

    fn list_references(&self, book_id: &str) -> Result<Vec<Reference>> {
        Ok(self
            .references
            .iter()
            .filter(|(book, _)| book == book_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn delete_book(&mut self, book_id: &str) -> Result<usize> {
        let before = self.footnotes.len() + self.references.len();
        self.footnotes.retain(|(book, _)| book != book_id);
        self.references.retain(|(book, _)| book != book_id);
        Ok(before - self.footnotes.len() - self.references.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footnote(id: &str, content: &str) -> Footnote {
        Footnote {
            footnote_id: id.to_string(),
            content: content.to_string(),
            original_identifier: "1".to_string(),
            ref_id: format!("{id}ref"),
            kind: "test".to_string(),
            correlation_id: None,
        }
    }

    #[test]
    fn test_put_replaces_same_key() {
        let mut store = MemoryStore::new();
        store.put_footnote("b", &footnote("bFn11", "old")).unwrap();
        store.put_footnote("b", &footnote("bFn11", "new")).unwrap();
        store.put_footnote("other", &footnote("bFn11", "elsewhere")).unwrap();
        let listed = store.list_footnotes("b").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "new");
        assert_eq!(
            store.get_footnote("other", "bFn11").unwrap().unwrap().content,
            "elsewhere"
        );
    }

    #[test]
    fn test_pending_reference_rejected() {
        let mut store = MemoryStore::new();
        let pending = Reference::pending("x".into(), "x".into(), "general");
        assert!(store.put_reference("b", &pending).is_err());
    }

    #[test]
    fn test_delete_book() {
        let mut store = MemoryStore::new();
        store.put_footnote("b", &footnote("f1", "a")).unwrap();
        store
            .put_reference(
                "b",
                &Reference::resolved("smith2020".into(), "S".into(), "S".into(), "t", Vec::new()),
            )
            .unwrap();
        store.put_footnote("c", &footnote("f1", "a")).unwrap();
        assert_eq!(store.delete_book("b").unwrap(), 2);
        assert!(store.get_reference("b", "smith2020").unwrap().is_none());
        assert_eq!(store.list_footnotes("c").unwrap().len(), 1);
    }
}
