//! Footnote marker linking.
//!
//! Converts numeral-bearing markers into the canonical
//! `<sup id="{refId}" fn-count-id="{n}"><a href="#{footnoteId}">n</a></sup>`
//! structure. Markers are found as `<sup>` elements, bare anchors with a
//! footnote-shaped fragment, markdown `[n]`/`[^n]` text and, when the format
//! allows it, numerals directly after sentence punctuation.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{footnote_marker, is_canonical_marker};
use crate::dom::{NodeId, Tree};
use crate::model::Footnote;

static FOOTNOTE_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)#(?:_?ftn|fn|note|_edn)(\d+)$").unwrap()
});

static MARKDOWN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^?(\d+)\]").unwrap());

static PLAIN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?])\s*(\d{1,2})").unwrap());

static PLAIN_MARKER_FOLLOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s+[A-Z]|\s*$)").unwrap());

static YEAR_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(in|since|by|from|until|after|before)\s*$").unwrap()
});

static NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

/// Characters of context inspected before a plain-text marker.
const PLAIN_MARKER_CONTEXT: usize = 10;

/// `originalIdentifier -> (footnoteId, refId)`
type FootnoteMap<'a> = HashMap<&'a str, (&'a str, &'a str)>;

fn build_footnote_map(footnotes: &[Footnote]) -> FootnoteMap<'_> {
    footnotes
        .iter()
        .map(|f| {
            (
                f.original_identifier.as_str(),
                (f.footnote_id.as_str(), f.ref_id.as_str()),
            )
        })
        .collect()
}

fn in_static_content(tree: &Tree, node: NodeId) -> Result<bool> {
    Ok(tree.closest(node, "[data-static-content]")?.is_some())
}

fn fragment_identifier(href: &str) -> Option<String> {
    FOOTNOTE_FRAGMENT.captures(href).map(|c| c[1].to_string())
}

/// Link footnote markers to extracted footnotes.
///
/// # Arguments
/// * `allow_plain_text` - Enable the punctuation-then-numeral heuristic
///
/// # Returns
/// Number of markers linked.
pub fn link_footnotes(tree: &mut Tree, footnotes: &[Footnote], allow_plain_text: bool) -> Result<usize> {
    if footnotes.is_empty() {
        return Ok(0);
    }
    let mapping = build_footnote_map(footnotes);

    let mut linked = link_sup_markers(tree, &mapping)?;
    linked += link_bare_anchors(tree, &mapping)?;
    linked += link_text_markers(tree, &mapping, allow_plain_text)?;

    info!(linked, footnotes = footnotes.len(), "footnote linking complete");
    Ok(linked)
}

fn link_sup_markers(tree: &mut Tree, mapping: &FootnoteMap<'_>) -> Result<usize> {
    let mut linked = 0;
    for sup in tree.select(tree.root(), "sup")? {
        if !tree.is_attached(sup) || is_canonical_marker(tree, sup) || in_static_content(tree, sup)? {
            continue;
        }

        let from_anchor = tree
            .select_first(sup, "a[href]")?
            .and_then(|a| tree.attr(a, "href"))
            .and_then(fragment_identifier)
            .filter(|id| mapping.contains_key(id.as_str()));

        let identifier = match from_anchor {
            Some(id) => Some(id),
            None => {
                let text = tree.text_content(sup).trim().to_string();
                let count = tree.attr(sup, "fn-count-id").map(str::to_string);
                if mapping.contains_key(text.as_str()) {
                    Some(text)
                } else if let Some(count) = count.filter(|c| mapping.contains_key(c.as_str())) {
                    Some(count)
                } else {
                    if NUMERAL.is_match(&text) {
                        warn!(marker = %text, "footnote marker has no matching definition");
                    }
                    None
                }
            }
        };

        if let Some(identifier) = identifier {
            if let Some(&(footnote_id, ref_id)) = mapping.get(identifier.as_str()) {
                let marker = footnote_marker(tree, &identifier, footnote_id, ref_id);
                tree.replace(sup, marker);
                linked += 1;
            }
        }
    }
    Ok(linked)
}

fn link_bare_anchors(tree: &mut Tree, mapping: &FootnoteMap<'_>) -> Result<usize> {
    let mut linked = 0;
    for anchor in tree.select(tree.root(), "a[href]")? {
        if !tree.is_attached(anchor)
            || tree.closest(anchor, "sup")?.is_some()
            || in_static_content(tree, anchor)?
        {
            continue;
        }
        let Some(identifier) = tree.attr(anchor, "href").and_then(fragment_identifier) else {
            continue;
        };
        match mapping.get(identifier.as_str()) {
            Some(&(footnote_id, ref_id)) => {
                let marker = footnote_marker(tree, &identifier, footnote_id, ref_id);
                tree.replace(anchor, marker);
                linked += 1;
            }
            None => debug!(identifier = %identifier, "footnote anchor without definition"),
        }
    }
    Ok(linked)
}

/// A marker found inside a text node: byte range to replace, text kept in front
/// of the marker, and the identifier.
struct TextMarker {
    start: usize,
    end: usize,
    keep: String,
    identifier: String,
}

fn find_text_markers(text: &str, mapping: &FootnoteMap<'_>, allow_plain_text: bool) -> Vec<TextMarker> {
    let mut markers = Vec::new();

    for caps in MARKDOWN_MARKER.captures_iter(text) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if text[whole.end()..].starts_with(':') {
            continue;
        }
        if mapping.contains_key(number.as_str()) {
            markers.push(TextMarker {
                start: whole.start(),
                end: whole.end(),
                keep: String::new(),
                identifier: number.as_str().to_string(),
            });
        }
    }

    if allow_plain_text {
        for caps in PLAIN_MARKER.captures_iter(text) {
            let (Some(whole), Some(punct), Some(number)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            if !PLAIN_MARKER_FOLLOW.is_match(&text[whole.end()..]) {
                continue;
            }
            let context: String = {
                let before: Vec<char> = text[..whole.start()].chars().collect();
                let from = before.len().saturating_sub(PLAIN_MARKER_CONTEXT);
                before[from..].iter().collect()
            };
            let looks_like_year = YEAR_CONTEXT.is_match(&context);
            let looks_like_section = context.ends_with(|c: char| c.is_ascii_digit());
            let overlaps = markers
                .iter()
                .any(|m| whole.start() < m.end && m.start < whole.end());
            if looks_like_year || looks_like_section || overlaps {
                continue;
            }
            if mapping.contains_key(number.as_str()) {
                markers.push(TextMarker {
                    start: whole.start(),
                    end: whole.end(),
                    keep: punct.as_str().to_string(),
                    identifier: number.as_str().to_string(),
                });
            }
        }
    }

    markers.sort_by_key(|m| m.start);
    markers
}

fn link_text_markers(tree: &mut Tree, mapping: &FootnoteMap<'_>, allow_plain_text: bool) -> Result<usize> {
    let mut linked = 0;
    for node in tree.text_nodes(tree.root()) {
        let Some(parent) = tree.parent(node) else {
            continue;
        };
        if matches!(tree.tag(parent), Some("script" | "style" | "a" | "sup"))
            || in_static_content(tree, parent)?
        {
            continue;
        }
        let text = tree.text(node).unwrap_or_default().to_string();
        let markers = find_text_markers(&text, mapping, allow_plain_text);
        if markers.is_empty() {
            continue;
        }

        let mut cursor = 0;
        for marker in markers {
            let Some(&(footnote_id, ref_id)) = mapping.get(marker.identifier.as_str()) else {
                continue;
            };
            let before = format!("{}{}", &text[cursor..marker.start], marker.keep);
            if !before.is_empty() {
                let before_node = tree.create_text(&before);
                tree.insert_before(node, before_node);
            }
            let sup = footnote_marker(tree, &marker.identifier, footnote_id, ref_id);
            tree.insert_before(node, sup);
            cursor = marker.end;
            linked += 1;
        }
        let rest = text[cursor..].to_string();
        if rest.is_empty() {
            tree.detach(node);
        } else {
            tree.replace_text(node, &rest);
        }
    }
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footnote(n: &str) -> Footnote {
        Footnote {
            footnote_id: format!("bFn1{n}"),
            content: format!("Note {n}"),
            original_identifier: n.to_string(),
            ref_id: format!("bFnref1{n}"),
            kind: "test".to_string(),
            correlation_id: None,
        }
    }

    fn marker(n: &str) -> String {
        format!(
            r##"<sup id="bFnref1{n}" fn-count-id="{n}"><a href="#bFn1{n}" class="footnote-ref">{n}</a></sup>"##
        )
    }

    #[test]
    fn test_links_simplified_sup() {
        let mut tree = Tree::parse(r#"<p>Text<sup fn-count-id="1">1</sup></p>"#);
        let linked = link_footnotes(&mut tree, &[footnote("1")], false).unwrap();
        assert_eq!(linked, 1);
        assert_eq!(tree.to_html(), format!("<p>Text{}</p>", marker("1")));
    }

    #[test]
    fn test_links_sup_with_anchor_fragment() {
        let mut tree = Tree::parse(r##"<p>Text<sup><a href="doc.html#_ftn2">[2]</a></sup></p>"##);
        link_footnotes(&mut tree, &[footnote("2")], false).unwrap();
        assert_eq!(tree.to_html(), format!("<p>Text{}</p>", marker("2")));
    }

    #[test]
    fn test_links_bare_anchor() {
        let mut tree = Tree::parse(r##"<p>Text<a href="#fn3">[3]</a> more</p>"##);
        link_footnotes(&mut tree, &[footnote("3")], false).unwrap();
        assert_eq!(tree.to_html(), format!("<p>Text{} more</p>", marker("3")));
    }

    #[test]
    fn test_markdown_marker_but_not_definition() {
        let mut tree = Tree::parse("<p>Claim[^1] and [1]: def</p>");
        link_footnotes(&mut tree, &[footnote("1")], false).unwrap();
        assert_eq!(
            tree.to_html(),
            format!("<p>Claim{} and [1]: def</p>", marker("1"))
        );
    }

    #[test]
    fn test_plain_text_heuristic() {
        let mut tree = Tree::parse("<p>End of claim.4 Next sentence.</p>");
        link_footnotes(&mut tree, &[footnote("4")], true).unwrap();
        assert_eq!(
            tree.to_html(),
            format!("<p>End of claim.{} Next sentence.</p>", marker("4"))
        );
    }

    #[test]
    fn test_plain_text_heuristic_disabled() {
        let html = "<p>End of claim.4 Next sentence.</p>";
        let mut tree = Tree::parse(html);
        assert_eq!(link_footnotes(&mut tree, &[footnote("4")], false).unwrap(), 0);
        assert_eq!(tree.to_html(), html);
    }

    #[test]
    fn test_plain_text_rejects_section_numbers_and_lowercase() {
        let html = "<p>See section 3.2 Results and page 4. 5 items.</p>";
        let mut tree = Tree::parse(html);
        let fns = [footnote("2"), footnote("5")];
        assert_eq!(link_footnotes(&mut tree, &fns, true).unwrap(), 0);
        assert_eq!(tree.to_html(), html);
    }

    #[test]
    fn test_unmatched_marker_left_alone() {
        let html = "<p>Text<sup>9</sup></p>";
        let mut tree = Tree::parse(html);
        assert_eq!(link_footnotes(&mut tree, &[footnote("1")], false).unwrap(), 0);
        assert_eq!(tree.to_html(), html);
    }

    #[test]
    fn test_static_content_skipped() {
        let html = r#"<p data-static-content="footnotes">1. Note [1]</p>"#;
        let mut tree = Tree::parse(html);
        assert_eq!(link_footnotes(&mut tree, &[footnote("1")], true).unwrap(), 0);
        assert_eq!(tree.to_html(), html);
    }
}
