use std::cell::Cell;

/// Mints the ids of one paste run.
///
/// Every id minted by one instance shares the same timestamp component, so a
/// footnote id and its back-reference id can be derived independently from
/// the marker text.
#[derive(Debug)]
pub struct IdMinter {
    book_id: String,
    stamp: i64,
    fallback_counter: Cell<u32>,
}

impl IdMinter {
    /// Create a minter; `stamp` defaults to the current time in milliseconds.
    pub fn new(book_id: &str, stamp: Option<i64>) -> Self {
        Self {
            book_id: book_id.to_string(),
            stamp: stamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            fallback_counter: Cell::new(0),
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// `{book}Fn{stamp}{identifier}`
    pub fn footnote_id(&self, identifier: &str) -> String {
        format!("{}Fn{}{}", self.book_id, self.stamp, identifier)
    }

    /// `{book}Fnref{stamp}{identifier}`
    pub fn footnote_ref_id(&self, identifier: &str) -> String {
        format!("{}Fnref{}{}", self.book_id, self.stamp, identifier)
    }

    /// Id for a reference that produced no keys: `ref_{stamp}_{n}`.
    pub fn fallback_reference_id(&self) -> String {
        let next = self.fallback_counter.get() + 1;
        self.fallback_counter.set(next);
        format!("ref_{}_{}", self.stamp, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_share_stamp() {
        let ids = IdMinter::new("book1", Some(42));
        assert_eq!(ids.footnote_id("7"), "book1Fn427");
        assert_eq!(ids.footnote_ref_id("7"), "book1Fnref427");
    }

    #[test]
    fn test_fallback_ids_are_unique() {
        let ids = IdMinter::new("b", Some(5));
        assert_eq!(ids.fallback_reference_id(), "ref_5_1");
        assert_eq!(ids.fallback_reference_id(), "ref_5_2");
    }
}
