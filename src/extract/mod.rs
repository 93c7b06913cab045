//! Format-specific extraction.
//!
//! Each publisher dialect gets one [`FormatExtractor`]. The pipeline drives
//! the extractor through a fixed stage order; the extractor only decides what
//! to pull out of the tree and how to reshape what is left.

pub mod cambridge;
pub mod general;
pub mod oup;
pub mod sage;
pub mod science_direct;
pub mod springer;
pub mod substack;
pub mod taylor_francis;
pub mod wiley;

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::debug;

use crate::dom::ops::collapse_whitespace;
use crate::dom::{NodeId, Tree};
use crate::ids::IdMinter;
use crate::link;
use crate::model::{Footnote, Reference};

pub use cambridge::CambridgeExtractor;
pub use general::GeneralExtractor;
pub use oup::OupExtractor;
pub use sage::SageExtractor;
pub use science_direct::ScienceDirectExtractor;
pub use springer::SpringerExtractor;
pub use substack::SubstackExtractor;
pub use taylor_francis::TaylorFrancisExtractor;
pub use wiley::WileyExtractor;

static NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[.):]?\s*").unwrap());

static ANY_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}[a-z]?").unwrap());

static IN_TEXT_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^)]*?\d{4}[^)]*?)\)").unwrap()
});

static AUTHOR_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z]{2,}.*\d{4}").unwrap());

static REFERENCE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-ZÖÄÜÉÈÊËÀÂÎÏÔÛÇ]|\[\d+\])").unwrap()
});

static FOUR_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}").unwrap());


/// One publisher dialect's extraction strategy.
///
/// Stage methods are called once per paste, in order: footnotes, references,
/// structure, then (after shared cleanup and finalization) the two link
/// methods. Footnote extraction must leave a `<sup fn-count-id="n">n</sup>`
/// marker in place of every publisher marker it recognizes.
pub trait FormatExtractor {
    /// Registry id of the format this extractor handles.
    fn format_id(&self) -> &'static str;

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>>;

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>>;

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()>;

    /// Whether a bare numeral after sentence punctuation may be read as a
    /// footnote marker. Formats with structural markers turn this off.
    fn allows_plain_text_markers(&self) -> bool {
        true
    }

    /// Link in-text citations. Runs after references are finalized.
    fn link_citations(&mut self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        link::citations::link_citations(tree, references, self.format_id())
    }

    /// Link footnote markers to extracted footnotes.
    fn link_footnotes(&mut self, tree: &mut Tree, footnotes: &[Footnote]) -> Result<usize> {
        link::footnotes::link_footnotes(tree, footnotes, self.allows_plain_text_markers())
    }
}

/// Build a footnote with ids minted for `identifier`.
pub(crate) fn new_footnote(ids: &IdMinter, identifier: &str, content: String, kind: &str) -> Footnote {
    Footnote {
        footnote_id: ids.footnote_id(identifier),
        content,
        original_identifier: identifier.to_string(),
        ref_id: ids.footnote_ref_id(identifier),
        kind: kind.to_string(),
        correlation_id: None,
    }
}

/// Replace a publisher marker with `<sup fn-count-id="{n}">{n}</sup>`.
///
/// When the marker sits inside a `<sup>`, the enclosing `<sup>` is replaced
/// instead so markers never nest.
pub(crate) fn simplify_marker(tree: &mut Tree, marker: NodeId, identifier: &str) -> NodeId {
    let target = match tree.parent(marker) {
        Some(parent) if tree.is_tag(parent, "sup") && tree.element_children(parent).len() == 1 => parent,
        _ => marker,
    };
    let sup = tree.create_element_with(
        "sup",
        vec![("fn-count-id".to_string(), identifier.to_string())],
    );
    tree.set_text(sup, identifier);
    tree.replace(target, sup);
    sup
}

/// Trimmed inner markup of `element`.
pub(crate) fn element_html(tree: &Tree, element: NodeId) -> String {
    tree.inner_html(element).trim().to_string()
}

/// Whitespace-collapsed text of `element`.
pub(crate) fn element_text(tree: &Tree, element: NodeId) -> String {
    collapse_whitespace(&tree.text_content(element))
}

/// Strip a leading `7.` / `7)` / `7:` numeral from the rendered text of
/// `element`, then drop leading inline elements left empty by the cut.
pub(crate) fn strip_leading_number(tree: &mut Tree, element: NodeId) {
    let text = tree.text_content(element);
    let Some(found) = NUMBER_PREFIX.find(&text) else {
        return;
    };
    if found.as_str().trim().is_empty() {
        return;
    }
    crate::dom::ops::trim_leading_text(tree, element, found.end());
    prune_empty_leading(tree, element);
}

/// Detach a leading `<a>` whose text is only the footnote number.
pub(crate) fn strip_leading_number_anchor(tree: &mut Tree, element: NodeId, identifier: &str) -> bool {
    let first = tree
        .children(element)
        .iter()
        .copied()
        .find(|&c| !tree.text(c).is_some_and(|t| t.trim().is_empty()));
    match first {
        Some(anchor)
            if tree.is_tag(anchor, "a") && tree.text_content(anchor).trim() == identifier =>
        {
            tree.detach(anchor);
            true
        }
        _ => false,
    }
}

fn prune_empty_leading(tree: &mut Tree, element: NodeId) {
    loop {
        let Some(first) = tree.first_child(element) else {
            return;
        };
        let empty_text = tree.text(first).is_some_and(|t| t.trim().is_empty());
        let empty_inline = tree.is_element(first)
            && !tree.is_tag(first, "img")
            && tree.select_with(first, &IMG_SELECTOR).is_empty()
            && tree.text_content(first).trim().is_empty();
        if empty_text || empty_inline {
            tree.detach(first);
        } else {
            if let Some(text) = tree.text(first).map(|t| t.trim_start().to_string()) {
                tree.replace_text(first, &text);
            } else if tree.is_element(first) {
                prune_empty_leading(tree, first);
            }
            return;
        }
    }
}

static IMG_SELECTOR: LazyLock<scraper::Selector> =
    LazyLock::new(|| scraper::Selector::parse("img").unwrap());

/// Normalize a zero-padded marker number: `0007` -> `7`.
pub(crate) fn normalize_identifier(digits: &str) -> String {
    digits
        .parse::<u64>()
        .map_or_else(|_| digits.to_string(), |n| n.to_string())
}

/// True when `text` is long enough and carries a year near its start.
pub(crate) fn is_valid_reference(text: &str, min_len: usize, max_year_position: usize) -> bool {
    if text.chars().count() < min_len {
        return false;
    }
    ANY_YEAR
        .find(text)
        .is_some_and(|m| text[..m.start()].chars().count() < max_year_position)
}

/// Push `reference` unless one with the same text is already present.
pub(crate) fn push_unique_reference(references: &mut Vec<Reference>, reference: Reference) -> bool {
    if references
        .iter()
        .any(|r| r.original_text == reference.original_text)
    {
        return false;
    }
    references.push(reference);
    true
}

/// True for text that opens like a bibliography entry: capitalized author or
/// `[n]`, with a year somewhere.
pub(crate) fn looks_like_reference_start(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() >= 10
        && REFERENCE_START.is_match(trimmed)
        && FOUR_DIGITS.is_match(trimmed)
}

/// True for a paragraph that cites in author-date style, e.g. `(Smith, 2019)`.
fn cites_in_body(text: &str) -> bool {
    IN_TEXT_CITATION.captures(text).is_some_and(|caps| {
        let inner = &caps[1];
        inner.contains(',') || AUTHOR_DATE.is_match(inner)
    })
}

/// How [`paragraph_references`] labels and splits what it finds.
pub(crate) struct ParagraphScan<'a> {
    /// Headings that open a bibliography section.
    pub heading: &'a Regex,
    /// Reference type for whole paragraphs.
    pub kind: &'a str,
    /// Split `<br>`-separated entries into separate references.
    pub split_breaks: bool,
}

/// Paragraph-level bibliography detection shared by the heuristic formats.
///
/// With a matching top-level heading, every following top-level paragraph is
/// scanned and the heading is removed once something was extracted. Without
/// one, every paragraph in the document is a candidate, except body text that
/// cites in author-date style. Extracted paragraphs are removed from the tree.
pub(crate) fn paragraph_references(tree: &mut Tree, scan: &ParagraphScan<'_>) -> Result<Vec<Reference>> {
    let top_level = tree.element_children(tree.root());
    let heading = top_level.iter().position(|&el| {
        tree.is_heading(el) && scan.heading.is_match(tree.text_content(el).trim())
    });

    let (candidates, in_section) = match heading {
        Some(index) => (
            top_level[index + 1..]
                .iter()
                .copied()
                .filter(|&el| tree.is_tag(el, "p"))
                .collect::<Vec<_>>(),
            true,
        ),
        None => (tree.select(tree.root(), "p")?, false),
    };

    let mut references = Vec::new();
    let mut consumed = Vec::new();
    for p in candidates {
        let text = element_text(tree, p);
        if text.is_empty() {
            continue;
        }
        if !in_section && cites_in_body(&text) {
            debug!(paragraph = %text, "skipping body paragraph with in-text citation");
            continue;
        }
        let found = references_in_paragraph(tree, p, scan, in_section);
        if !found.is_empty() {
            references.extend(found);
            consumed.push(p);
        }
    }

    for p in consumed {
        tree.detach(p);
    }
    if let (Some(index), false) = (heading, references.is_empty()) {
        tree.detach(top_level[index]);
    }
    Ok(references)
}

fn references_in_paragraph(
    tree: &Tree,
    paragraph: NodeId,
    scan: &ParagraphScan<'_>,
    in_section: bool,
) -> Vec<Reference> {
    if scan.split_breaks {
        let parts = split_on_breaks(tree, paragraph);
        if parts.len() > 1 {
            let reference_like = parts
                .iter()
                .filter(|(_, text)| looks_like_reference_start(text))
                .count();
            if in_section || reference_like * 10 >= parts.len() * 7 {
                let split: Vec<Reference> = parts
                    .into_iter()
                    .filter(|(_, text)| looks_like_reference_start(text))
                    .map(|(html, text)| Reference::pending(html, text, "html-br-split"))
                    .collect();
                if !split.is_empty() {
                    return split;
                }
            }
        }
    }

    let text = element_text(tree, paragraph);
    if looks_like_reference_start(&text) {
        vec![Reference::pending(
            element_html(tree, paragraph),
            text,
            scan.kind,
        )]
    } else {
        Vec::new()
    }
}

/// Split the children of `paragraph` at `<br>` into `(markup, text)` parts,
/// dropping empty parts.
fn split_on_breaks(tree: &Tree, paragraph: NodeId) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut html = String::new();
    let mut text = String::new();
    for child in tree.children(paragraph) {
        if tree.is_tag(child, "br") {
            parts.push((std::mem::take(&mut html), std::mem::take(&mut text)));
            continue;
        }
        html.push_str(&tree.outer_html(child));
        text.push_str(&tree.text_content(child));
    }
    parts.push((html, text));
    parts
        .into_iter()
        .map(|(h, t)| (h.trim().to_string(), collapse_whitespace(&t)))
        .filter(|(h, _)| !h.is_empty())
        .collect()
}
