//! Markdown output formatters for CLI commands

use crate::model::{DetectionReport, FormatEntry, PasteResult, StoredBook};

/// Format a PasteResult as markdown
pub fn paste(result: &PasteResult) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Paste ({})\n\n", result.format_id));

    md.push_str("## HTML\n\n```html\n");
    md.push_str(&result.html);
    md.push_str("\n```\n");

    if !result.footnotes.is_empty() {
        md.push_str(&format!("\n## Footnotes ({})\n\n", result.footnotes.len()));
        for footnote in &result.footnotes {
            md.push_str(&format!(
                "- **{}** `{}`: {}\n",
                footnote.original_identifier, footnote.footnote_id, footnote.content
            ));
        }
    }

    if !result.references.is_empty() {
        md.push_str(&format!("\n## References ({})\n\n", result.references.len()));
        for reference in &result.references {
            md.push_str(&format!("- `{}`: {}\n", reference.id(), reference.original_text));
        }
    }

    md
}

/// Format a DetectionReport as markdown
pub fn detection(report: &DetectionReport) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Detected: {}\n\n", report.detected));

    if report.candidates.is_empty() {
        md.push_str("No selectors matched.\n");
    } else {
        for candidate in &report.candidates {
            md.push_str(&format!(
                "## {} (priority {})\n\n",
                candidate.format, candidate.priority
            ));
            for hit in &candidate.matched_selectors {
                md.push_str(&format!("- `{}` × {}\n", hit.selector, hit.count));
            }
            md.push('\n');
        }
    }

    md
}

/// Format registered formats as markdown
pub fn formats(entries: &[FormatEntry]) -> String {
    let mut md = String::new();

    for entry in entries {
        md.push_str(&format!(
            "- **{}** ({}): {}\n",
            entry.id, entry.priority, entry.description
        ));
        for selector in &entry.selectors {
            md.push_str(&format!("  - `{}`\n", selector));
        }
    }

    md
}

/// Format generated keys as markdown
pub fn keys(keys: &[String]) -> String {
    if keys.is_empty() {
        return "No keys.\n".to_string();
    }
    keys.iter().map(|k| format!("- `{}`\n", k)).collect()
}

/// Format a StoredBook as markdown
pub fn stored_book(book: &StoredBook) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Book {}\n\n", book.book_id));

    md.push_str(&format!("## Footnotes ({})\n\n", book.footnotes.len()));
    for footnote in &book.footnotes {
        md.push_str(&format!(
            "- `{}` [{}]: {}\n",
            footnote.footnote_id, footnote.kind, footnote.content
        ));
    }

    md.push_str(&format!("\n## References ({})\n\n", book.references.len()));
    for reference in &book.references {
        md.push_str(&format!(
            "- `{}` [{}]: {}\n",
            reference.id(),
            reference.kind,
            reference.original_text
        ));
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Footnote, FormatMatch, Reference, SelectorHit};

    #[test]
    fn test_detection_with_candidates() {
        let report = DetectionReport {
            detected: "springer".to_string(),
            candidates: vec![FormatMatch {
                format: "springer".to_string(),
                priority: 8,
                matched_selectors: vec![SelectorHit {
                    selector: "[id^=\"ref-CR\"]".to_string(),
                    count: 3,
                }],
            }],
        };
        let md = detection(&report);
        assert!(md.starts_with("# Detected: springer\n"));
        assert!(md.contains("## springer (priority 8)"));
        assert!(md.contains("- `[id^=\"ref-CR\"]` × 3"));
    }

    #[test]
    fn test_detection_without_candidates() {
        let report = DetectionReport {
            detected: "general".to_string(),
            candidates: vec![],
        };
        assert_eq!(detection(&report), "# Detected: general\n\nNo selectors matched.\n");
    }

    #[test]
    fn test_keys() {
        assert_eq!(keys(&[]), "No keys.\n");
        assert_eq!(
            keys(&["smith2020".to_string(), "s2020".to_string()]),
            "- `smith2020`\n- `s2020`\n"
        );
    }

    #[test]
    fn test_paste_lists_records() {
        let result = PasteResult {
            html: "<p>x</p>".to_string(),
            footnotes: vec![Footnote {
                footnote_id: "bFn11".to_string(),
                content: "Note.".to_string(),
                original_identifier: "1".to_string(),
                ref_id: "bFnref11".to_string(),
                kind: "general".to_string(),
                correlation_id: None,
            }],
            references: vec![Reference::resolved(
                "smith2020".into(),
                "Smith".into(),
                "Smith 2020".into(),
                "general",
                Vec::new(),
            )],
            format_id: "general".to_string(),
        };
        let md = paste(&result);
        assert!(md.contains("## Footnotes (1)\n\n- **1** `bFn11`: Note.\n"));
        assert!(md.contains("- `smith2020`: Smith 2020\n"));
    }
}
