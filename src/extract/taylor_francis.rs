// Taylor & Francis Online.
//
// Endnotes sit under a "Notes" heading or in `EN`/`FN` blocks referenced by
// `<a data-rid="EN0001">`; bibliography entries are `li[id^="CIT"]` items
// cited through `<a data-rid="CIT0001">` links.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{
    element_html, element_text, new_footnote, normalize_identifier, push_unique_reference, simplify_marker,
    strip_leading_number, FormatExtractor,
};
use crate::dom::ops::{
    clone_and_clean, is_reference_section_heading, remove_all, remove_sections_by_heading,
    remove_static_content, unwrap_containers,
};
use crate::dom::{escape_text, NodeId, Tree};
use crate::ids::IdMinter;
use crate::link::{self, CITATION_CLASS};
use crate::model::{Footnote, Reference};

static NOTES_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)notes").unwrap());

static REFERENCES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(references|bibliography|works cited)$").unwrap()
});

static DEFINITION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)[.)\s]").unwrap());

static NOTE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:en|fn)(\d+)").unwrap());

static CITATION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*citation\s*").unwrap());

const NOTE_BLOCKS: &str = r#"div[id^="EN"], div[id^="FN"], div[id^="en"], div[id^="fn"]"#;
const NOTE_LINKS: &str = r#"a[data-rid^="EN"], a[data-rid^="FN"], a[data-rid^="en"], a[data-rid^="fn"]"#;
const CITATION_LINKS: &str = r#"a[data-rid^="CIT"]"#;
const CITATION_LINK_ATTRS: &[&str] = &[
    "data-rid",
    "data-behaviour",
    "data-ref-type",
    "data-label",
    "data-registered",
];

#[derive(Debug, Default)]
pub struct TaylorFrancisExtractor;

impl TaylorFrancisExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// A located endnote definition before extraction.
struct NoteSource {
    identifier: String,
    element: NodeId,
    rid: Option<String>,
}

/// Unwrap citation links inside a note body, dropping their "Citation" prefix.
fn clean_note_body(tree: &mut Tree, body: NodeId) -> Result<()> {
    remove_all(tree, body, ".extra-links")?;
    for link in tree.select(body, CITATION_LINKS)? {
        strip_citation_prefix(tree, link);
        tree.unwrap(link);
    }
    Ok(())
}

fn strip_citation_prefix(tree: &mut Tree, link: NodeId) {
    let text = tree.text_content(link);
    if let Some(prefix) = CITATION_PREFIX.find(&text) {
        if prefix.end() > 0 && prefix.end() < text.len() {
            crate::dom::ops::trim_leading_text(tree, link, prefix.end());
        }
    }
}

impl TaylorFrancisExtractor {
    fn note_sources(&self, tree: &Tree) -> Result<Vec<NoteSource>> {
        let mut sources: Vec<NoteSource> = Vec::new();
        let push = |sources: &mut Vec<NoteSource>, source: NoteSource| {
            if !sources.iter().any(|s| s.identifier == source.identifier) {
                sources.push(source);
            }
        };

        let mut anchors: Vec<NodeId> = tree
            .select(tree.root(), "h1, h2, h3, h4, h5, h6")?
            .into_iter()
            .filter(|&h| NOTES_HEADING.is_match(tree.text_content(h).trim()))
            .collect();
        anchors.extend(tree.select(tree.root(), "#inline_frontnotes")?);
        for anchor in anchors {
            let mut scopes = vec![];
            let mut next = tree.next_element_sibling(anchor);
            while let Some(node) = next {
                if tree.is_heading(node) {
                    break;
                }
                scopes.push(node);
                next = tree.next_element_sibling(node);
            }
            if !tree.is_heading(anchor) {
                scopes.push(anchor);
            }
            for scope in scopes {
                let paragraphs = if tree.is_tag(scope, "p") {
                    vec![scope]
                } else {
                    tree.select(scope, "p")?
                };
                for p in paragraphs {
                    let text = element_text(tree, p);
                    if let Some(caps) = DEFINITION_PREFIX.captures(&text) {
                        push(
                            &mut sources,
                            NoteSource {
                                identifier: caps[1].to_string(),
                                element: p,
                                rid: None,
                            },
                        );
                    }
                }
            }
        }

        let mut blocks = tree.select(tree.root(), ".summation-section")?;
        blocks.extend(tree.select(tree.root(), NOTE_BLOCKS)?);
        for block in blocks {
            let rid = tree.attr(block, "id").map(str::to_string);
            let from_id = rid
                .as_deref()
                .and_then(|id| NOTE_ID.captures(id))
                .map(|c| normalize_identifier(&c[1]));
            let identifier = match tree.select_first(block, "sup")? {
                Some(sup) => Some(tree.text_content(sup).trim().to_string()).filter(|t| !t.is_empty()),
                None => None,
            }
            .or(from_id)
            .or_else(|| {
                DEFINITION_PREFIX
                    .captures(&element_text(tree, block))
                    .map(|c| c[1].to_string())
            });
            if let Some(identifier) = identifier {
                push(
                    &mut sources,
                    NoteSource {
                        identifier,
                        element: block,
                        rid: rid.filter(|id| NOTE_ID.is_match(id)),
                    },
                );
            }
        }
        Ok(sources)
    }

    fn link_citation_anchors(&self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let mut converted = 0;
        for link in tree.select(tree.root(), CITATION_LINKS)? {
            let rid = tree.attr(link, "data-rid").unwrap_or_default().to_string();
            let Some(reference_id) = references
                .iter()
                .find(|r| r.correlation_id.as_deref() == Some(rid.as_str()))
                .and_then(|r| r.reference_id.clone())
            else {
                warn!(rid = %rid, "taylor-francis: citation target not extracted");
                continue;
            };
            tree.set_attr(link, "href", &format!("#{reference_id}"));
            tree.set_attr(link, "class", CITATION_CLASS);
            for attr in CITATION_LINK_ATTRS {
                tree.remove_attr(link, attr);
            }
            converted += 1;
        }
        Ok(converted)
    }
}

impl FormatExtractor for TaylorFrancisExtractor {
    fn format_id(&self) -> &'static str {
        "taylor-francis"
    }

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut footnotes = Vec::new();
        for source in self.note_sources(tree)? {
            if !tree.is_attached(source.element) {
                continue;
            }
            let clean = clone_and_clean(tree, source.element, &[])?;
            strip_leading_number(tree, clean);
            clean_note_body(tree, clean)?;
            let content = element_html(tree, clean);
            if content.is_empty() {
                continue;
            }
            let mut footnote = new_footnote(ids, &source.identifier, content, "taylor-francis");
            footnote.correlation_id = source.rid;
            footnotes.push(footnote);
            tree.detach(source.element);
        }

        for link in tree.select(tree.root(), NOTE_LINKS)? {
            let rid = tree.attr(link, "data-rid").unwrap_or_default().to_string();
            let matched = footnotes.iter().find(|f| {
                f.correlation_id
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(&rid))
            });
            let Some(footnote) = matched else {
                continue;
            };
            let identifier = match tree.select_first(link, "sup")? {
                Some(sup) => tree.text_content(sup).trim().to_string(),
                None => footnote.original_identifier.clone(),
            };
            simplify_marker(tree, link, &identifier);
        }

        info!(count = footnotes.len(), "taylor-francis: footnotes extracted");
        Ok(footnotes)
    }

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let mut references = Vec::new();
        for item in tree.select(tree.root(), r#"li[id^="CIT"]"#)? {
            let id = tree.attr(item, "id").unwrap_or_default().to_string();
            let clean = clone_and_clean(tree, item, &[".extra-links"])?;
            let text = element_text(tree, clean);
            if text.chars().count() <= 10 {
                continue;
            }
            references.push(
                Reference::pending(escape_text(&text), text, "taylor-francis-cit").with_correlation(id),
            );
            tree.detach(item);
        }

        if references.is_empty() {
            for heading in tree.select(tree.root(), "h1, h2, h3, h4, h5, h6")? {
                if !REFERENCES_HEADING.is_match(tree.text_content(heading).trim()) {
                    continue;
                }
                let mut next = tree.next_element_sibling(heading);
                while let Some(container) = next {
                    if tree.is_heading(container) {
                        break;
                    }
                    next = tree.next_element_sibling(container);
                    let items = if tree.is_tag(container, "p") || tree.is_tag(container, "li") {
                        vec![container]
                    } else {
                        tree.select(container, "li, p")?
                    };
                    for item in items {
                        let text = element_text(tree, item);
                        if text.chars().count() <= 10 {
                            continue;
                        }
                        let content = element_html(tree, item);
                        if push_unique_reference(
                            &mut references,
                            Reference::pending(content, text, "taylor-francis-list"),
                        ) {
                            tree.detach(item);
                        }
                    }
                }
            }
            debug!(count = references.len(), "taylor-francis: list fallback");
        }

        info!(count = references.len(), "taylor-francis: references extracted");
        Ok(references)
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        let root = tree.root();
        remove_all(tree, root, ".extra-links")?;
        for link in tree.select(tree.root(), CITATION_LINKS)? {
            strip_citation_prefix(tree, link);
        }
        remove_sections_by_heading(tree, is_reference_section_heading)?;
        remove_static_content(tree)?;
        for span in tree.select(tree.root(), "span.ref-lnk")? {
            tree.unwrap(span);
        }
        unwrap_containers(tree, &[])
    }

    fn allows_plain_text_markers(&self) -> bool {
        false
    }

    fn link_citations(&mut self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let precise = self.link_citation_anchors(tree, references)?;
        let shared = link::citations::link_citations(tree, references, self.format_id())?;
        Ok(precise + shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endnote_block_and_marker() {
        let mut tree = Tree::parse(
            r#"<p>Claim<a data-rid="EN0001"><sup>1</sup></a>.</p><div id="EN0001"><p><sup>1</sup> See <a data-rid="CIT0002">Citation Smith 2019</a>.</p></div>"#,
        );
        let ids = IdMinter::new("b", Some(4));
        let footnotes = TaylorFrancisExtractor::new()
            .extract_footnotes(&mut tree, &ids)
            .unwrap();
        assert_eq!(footnotes.len(), 1);
        assert_eq!(footnotes[0].original_identifier, "1");
        assert_eq!(footnotes[0].correlation_id.as_deref(), Some("EN0001"));
        assert_eq!(footnotes[0].content, "<p>See Smith 2019.</p>");
        assert_eq!(tree.to_html(), r#"<p>Claim<sup fn-count-id="1">1</sup>.</p>"#);
    }

    #[test]
    fn test_notes_heading_paragraphs() {
        let mut tree = Tree::parse("<p>Body<sup>2</sup></p><h2>Notes</h2><p>2. A numbered note.</p>");
        let ids = IdMinter::new("b", Some(4));
        let footnotes = TaylorFrancisExtractor::new()
            .extract_footnotes(&mut tree, &ids)
            .unwrap();
        assert_eq!(footnotes.len(), 1);
        assert_eq!(footnotes[0].content, "A numbered note.");
        assert!(!tree.to_html().contains("A numbered note."));
    }

    #[test]
    fn test_cit_items_and_links() {
        let mut tree = Tree::parse(
            r##"<p>As shown (<a data-rid="CIT0001" href="#CIT0001">Citation Jones 2020</a>).</p><ul><li id="CIT0001">Jones, K. 2020. Findings. <span class="extra-links">Google Scholar</span></li></ul>"##,
        );
        let mut extractor = TaylorFrancisExtractor::new();
        let mut references = extractor.extract_references(&mut tree).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].original_text, "Jones, K. 2020. Findings.");
        extractor.transform_structure(&mut tree).unwrap();
        assert!(tree.to_html().contains(">Jones 2020</a>"));

        references[0].finalize("jones2020".into(), vec![]);
        let linked = extractor.link_citations(&mut tree, &references).unwrap();
        assert_eq!(linked, 1);
        assert!(tree
            .to_html()
            .contains(r##"<a href="#jones2020" class="in-text-citation">Jones 2020</a>"##));
    }
}
