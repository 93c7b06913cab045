//! Citation linking.
//!
//! References are finalized (ids and keys assigned) before the static
//! bibliography is rendered, then in-text citations are resolved in two
//! passes: publisher anchors whose fragment names a known key or correlation
//! id, then parenthesized `(Author, Year)` spans in body text.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{citation_anchor, href_fragment, CITATION_CLASS};
use crate::dom::{NodeId, Tree};
use crate::ids::IdMinter;
use crate::keys::{generate_keys, initials_before};
use crate::model::Reference;

static CITATION_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^)]*?\d{4}[^)]*?)\)").unwrap()
});

static SUB_CITATION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*").unwrap());

static YEAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}[a-z]?)").unwrap());

static LEADING_ACRONYM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\p{Lu}{2,})").unwrap());

/// Narrative prefixes stripped before key lookup and restored in the output.
const CITATION_PREFIXES: &[&str] = &["Cited in ", "Quoted in ", "see ", "e.g., ", "cf. "];

/// Selector for the appended bibliography.
const STATIC_BIBLIOGRAPHY: &str = r#"[data-static-content="bibliography"]"#;

/// Assign ids and keys to every pending reference and make ids unique.
///
/// Pending references take their first generated key as id, or a fallback id
/// when no key can be generated. An id already used by an earlier reference
/// receives a `-{n}` suffix.
pub fn finalize_references(references: &mut [Reference], format_id: &str, ids: &IdMinter) {
    let mut taken: HashSet<String> = HashSet::new();
    for reference in references.iter_mut() {
        if reference.needs_key_generation {
            let keys = generate_keys(&reference.original_text, "", format_id);
            let id = match keys.first() {
                Some(first) => first.clone(),
                None => {
                    let fallback = ids.fallback_reference_id();
                    warn!(
                        reference = %truncate(&reference.original_text, 60),
                        id = %fallback,
                        "no keys generated for reference, using fallback id"
                    );
                    fallback
                }
            };
            reference.finalize(id, keys);
        }

        let base = reference.id().to_string();
        if taken.contains(&base) {
            let mut n = 2;
            while taken.contains(&format!("{base}-{n}")) {
                n += 1;
            }
            let unique = format!("{base}-{n}");
            debug!(from = %base, to = %unique, "reference id collision");
            reference.reference_id = Some(unique);
        }
        taken.insert(reference.id().to_string());
    }
}

/// Build the `key -> reference id` table. The first reference claiming a key keeps it.
pub fn build_reference_map(references: &[Reference]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for reference in references {
        let Some(id) = reference.reference_id.as_deref() else {
            continue;
        };
        for key in &reference.ref_keys {
            map.entry(key.clone()).or_insert_with(|| id.to_string());
        }
    }
    map
}

/// Link in-text citations to finalized references.
///
/// # Returns
/// Number of citations linked across both passes.
pub fn link_citations(tree: &mut Tree, references: &[Reference], format_id: &str) -> Result<usize> {
    if references.is_empty() {
        return Ok(0);
    }
    let mapping = build_reference_map(references);
    let mut anchor_targets = mapping.clone();
    for reference in references {
        if let (Some(correlation), Some(id)) = (&reference.correlation_id, &reference.reference_id) {
            anchor_targets
                .entry(correlation.clone())
                .or_insert_with(|| id.clone());
        }
    }

    let anchors = link_anchor_citations(tree, &anchor_targets)?;
    let spans = link_text_citations(tree, &mapping, references, format_id)?;
    info!(
        keys = mapping.len(),
        anchors, spans, "citation linking complete"
    );
    Ok(anchors + spans)
}

fn in_static_bibliography(tree: &Tree, node: NodeId) -> Result<bool> {
    Ok(tree.closest(node, STATIC_BIBLIOGRAPHY)?.is_some())
}

/// Rewrite anchors whose href fragment names a known key or correlation id.
fn link_anchor_citations(tree: &mut Tree, targets: &HashMap<String, String>) -> Result<usize> {
    let mut converted = 0;
    for anchor in tree.select(tree.root(), "a[href]")? {
        if tree.has_class(anchor, CITATION_CLASS) || in_static_bibliography(tree, anchor)? {
            continue;
        }
        let Some(fragment) = tree.attr(anchor, "href").and_then(href_fragment) else {
            continue;
        };
        if let Some(id) = targets.get(&fragment) {
            let href = format!("#{id}");
            tree.set_attr(anchor, "href", &href);
            tree.add_class(anchor, CITATION_CLASS);
            converted += 1;
        }
    }
    Ok(converted)
}

enum Segment {
    Text(String),
    Link { reference_id: String, text: String },
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(existing)) = segments.last_mut() {
        existing.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

fn strip_citation_prefix(citation: &str) -> &str {
    for prefix in CITATION_PREFIXES {
        let matches = citation
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            return &citation[prefix.len()..];
        }
    }
    citation
}

/// Match an acronym citation such as `WHO 2019` against the initials of each
/// reference's author text.
fn acronym_fallback<'r>(citation: &str, references: &'r [Reference]) -> Option<&'r str> {
    let year = YEAR_TOKEN.captures(citation)?.get(1)?.as_str();
    let acronym = LEADING_ACRONYM.captures(citation)?.get(1)?.as_str();
    references
        .iter()
        .find(|r| initials_before(&r.original_text, year).as_deref() == Some(acronym))
        .and_then(|r| r.reference_id.as_deref())
}

fn resolve_citation(
    citation: &str,
    context: &str,
    mapping: &HashMap<String, String>,
    references: &[Reference],
    format_id: &str,
) -> Option<String> {
    let keys = generate_keys(citation, context, format_id);
    if let Some(id) = keys.iter().find_map(|k| mapping.get(k)) {
        return Some(id.clone());
    }
    if let Some(id) = acronym_fallback(citation, references) {
        return Some(id.to_string());
    }
    if keys.is_empty() {
        debug!(citation, "citation produced no keys");
    } else {
        warn!(citation, "citation did not resolve to a reference");
    }
    None
}

/// Build the replacement segments for one text node, or `None` when nothing links.
fn citation_segments(
    text: &str,
    mapping: &HashMap<String, String>,
    references: &[Reference],
    format_id: &str,
) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    let mut linked_any = false;

    for caps in CITATION_SPAN.captures_iter(text) {
        let (Some(whole), Some(block)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let context = &text[..whole.start()];
        let sub_citations: Vec<&str> = SUB_CITATION_SEPARATOR.split(block.as_str()).collect();

        let mut parts = Vec::new();
        let mut linked_here = false;
        for (index, sub) in sub_citations.iter().enumerate() {
            let trimmed = sub.trim();
            if !trimmed.is_empty() {
                let processed = strip_citation_prefix(trimmed);
                match resolve_citation(processed, context, mapping, references, format_id) {
                    Some(reference_id) => {
                        linked_here = true;
                        match YEAR_TOKEN.find(processed) {
                            Some(year) => {
                                let prefix = &trimmed[..trimmed.len() - processed.len()];
                                push_text(&mut parts, prefix);
                                push_text(&mut parts, &processed[..year.start()]);
                                parts.push(Segment::Link {
                                    reference_id,
                                    text: year.as_str().to_string(),
                                });
                                push_text(&mut parts, &processed[year.end()..]);
                            }
                            None => parts.push(Segment::Link {
                                reference_id,
                                text: trimmed.to_string(),
                            }),
                        }
                    }
                    None => push_text(&mut parts, trimmed),
                }
            }
            if index + 1 < sub_citations.len() {
                push_text(&mut parts, "; ");
            }
        }

        if !linked_here {
            continue;
        }
        linked_any = true;
        push_text(&mut segments, &text[cursor..whole.start()]);
        push_text(&mut segments, "(");
        for part in parts {
            match part {
                Segment::Text(t) => push_text(&mut segments, &t),
                link => segments.push(link),
            }
        }
        push_text(&mut segments, ")");
        cursor = whole.end();
    }

    if !linked_any {
        return None;
    }
    push_text(&mut segments, &text[cursor..]);
    Some(segments)
}

/// Resolve parenthesized citations in body text.
fn link_text_citations(
    tree: &mut Tree,
    mapping: &HashMap<String, String>,
    references: &[Reference],
    format_id: &str,
) -> Result<usize> {
    let mut linked = 0;
    for node in tree.text_nodes(tree.root()) {
        let Some(parent) = tree.parent(node) else {
            continue;
        };
        if matches!(tree.tag(parent), Some("script" | "style" | "a"))
            || in_static_bibliography(tree, parent)?
        {
            continue;
        }
        let text = tree.text(node).unwrap_or_default().to_string();
        let Some(segments) = citation_segments(&text, mapping, references, format_id) else {
            continue;
        };
        for segment in segments {
            let new_node = match segment {
                Segment::Text(t) => tree.create_text(&t),
                Segment::Link { reference_id, text } => {
                    linked += 1;
                    citation_anchor(tree, &reference_id, &text)
                }
            };
            tree.insert_before(node, new_node);
        }
        tree.detach(node);
    }
    Ok(linked)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalized(texts: &[&str]) -> Vec<Reference> {
        let mut refs: Vec<Reference> = texts
            .iter()
            .map(|t| Reference::pending((*t).to_string(), (*t).to_string(), "general"))
            .collect();
        finalize_references(&mut refs, "general", &IdMinter::new("b", Some(1)));
        refs
    }

    #[test]
    fn test_finalize_assigns_first_key_and_clears_flag() {
        let refs = finalized(&["Smith, J. (2020). Title."]);
        assert_eq!(refs[0].id(), "smith2020");
        assert!(!refs[0].needs_key_generation);
        assert!(refs[0].ref_keys.contains(&"smith2020".to_string()));
    }

    #[test]
    fn test_finalize_fallback_and_suffix() {
        let refs = finalized(&["Untitled pamphlet", "Smith, J. 2020.", "Smith, K. 2020."]);
        assert_eq!(refs[0].id(), "ref_1_1");
        assert_eq!(refs[0].ref_keys, vec!["ref_1_1"]);
        assert_eq!(refs[1].id(), "smith2020");
        assert_eq!(refs[2].id(), "smith2020-2");
    }

    #[test]
    fn test_mapping_is_first_wins() {
        let refs = finalized(&["Smith, J. 2020.", "Smith, K. 2020."]);
        let map = build_reference_map(&refs);
        assert_eq!(map.get("smith2020").map(String::as_str), Some("smith2020"));
    }

    #[test]
    fn test_links_parenthetical_citation() {
        let refs = finalized(&["Smith, J. (2020). Title."]);
        let mut tree = Tree::parse("<p>The result (Smith, 2020: 12) holds.</p>");
        let linked = link_citations(&mut tree, &refs, "general").unwrap();
        assert_eq!(linked, 1);
        assert_eq!(
            tree.to_html(),
            r##"<p>The result (Smith, <a href="#smith2020" class="in-text-citation">2020</a>: 12) holds.</p>"##
        );
    }

    #[test]
    fn test_links_multiple_with_prefix() {
        let refs = finalized(&["Smith, J. (2020). Title.", "Jones, A. (2019). Other."]);
        let mut tree = Tree::parse("<p>(see Jones 2019; Brown 2001; Smith 2020)</p>");
        link_citations(&mut tree, &refs, "general").unwrap();
        assert_eq!(
            tree.to_html(),
            r##"<p>(see Jones <a href="#jones2019" class="in-text-citation">2019</a>; Brown 2001; Smith <a href="#smith2020" class="in-text-citation">2020</a>)</p>"##
        );
    }

    #[test]
    fn test_year_only_citation_uses_preceding_text() {
        let refs = finalized(&["Dijk, T. van (2018). Discourse."]);
        let mut tree = Tree::parse("<p>as argued by Dijk (2018).</p>");
        link_citations(&mut tree, &refs, "general").unwrap();
        assert!(tree.to_html().contains(r##"<a href="#dijk2018" class="in-text-citation">2018</a>"##));
    }

    #[test]
    fn test_acronym_fallback() {
        let refs = finalized(&["World Health Organization (2019) Report."]);
        let mut tree = Tree::parse("<p>Data (WHO 2019) show.</p>");
        link_citations(&mut tree, &refs, "general").unwrap();
        assert!(tree.to_html().contains("WHO <a href=\"#"));
    }

    #[test]
    fn test_anchor_pass_uses_correlation_id() {
        let mut refs = vec![Reference::pending(
            "Smith 2020".into(),
            "Smith, J. 2020. Title.".into(),
            "general",
        )
        .with_correlation("bib12")];
        finalize_references(&mut refs, "general", &IdMinter::new("b", Some(1)));
        let mut tree = Tree::parse(r##"<p><a href="https://pub.example/a#bib12">Smith 2020</a></p>"##);
        link_citations(&mut tree, &refs, "general").unwrap();
        assert_eq!(
            tree.to_html(),
            r##"<p><a href="#smith2020" class="in-text-citation">Smith 2020</a></p>"##
        );
    }

    #[test]
    fn test_static_bibliography_is_skipped() {
        let refs = finalized(&["Smith, J. (2020). Title."]);
        let html = r#"<p data-static-content="bibliography" id="smith2020">Smith, J. (2020). Title.</p>"#;
        let mut tree = Tree::parse(html);
        assert_eq!(link_citations(&mut tree, &refs, "general").unwrap(), 0);
        assert_eq!(tree.to_html(), html);
    }

    #[test]
    fn test_unmatched_citation_left_as_text() {
        let refs = finalized(&["Smith, J. (2020). Title."]);
        let mut tree = Tree::parse("<p>the index rose (see 2017: 143)</p>");
        assert_eq!(link_citations(&mut tree, &refs, "general").unwrap(), 0);
        assert_eq!(tree.to_html(), "<p>the index rose (see 2017: 143)</p>");
    }
}
