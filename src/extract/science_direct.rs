// ScienceDirect (Elsevier).
//
// Bibliography entries are `span.reference` blocks inside numbered list
// items; in-text citations are `a.anchor` links carrying
// `data-xocs-content-type="reference"` and a `bib{n}` / `b{n}` target id.
// ScienceDirect pastes carry no footnotes.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use super::FormatExtractor;
use crate::dom::ops::{clone_and_clean, remove_sections_by_heading, unwrap_containers};
use crate::dom::{NodeId, Tree};
use crate::ids::IdMinter;
use crate::link::{self, CITATION_CLASS};
use crate::model::{Footnote, Reference};

static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(references|bibliography|works cited)$").unwrap()
});

static LIST_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(references|bibliography)$").unwrap()
});

static SPACE_BEFORE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([.,;:])").unwrap());

/// Inline tags kept when flattening an entry.
const KEPT_INLINE: &[&str] = &["a", "em", "i", "strong", "b", "sup", "sub"];

/// Block tags whose boundaries become spaces when flattening an entry.
const FLATTENED_BLOCKS: &[&str] = &["div", "p", "li", "ul", "ol", "br", "section"];

const ENTRY_CHROME: &[&str] = &[".ReferenceLinks", "a.pdf", r#"a[target="_blank"]"#, "svg"];

const CITATION_ANCHORS: &str = r#"a.anchor[data-xocs-content-type="reference"]"#;

const TEMP_BIB_ATTR: &str = "data-temp-bibid";

/// Extractor state: aliases of each extracted bibliography id, so the
/// structure pass can tell resolvable citation anchors from dangling ones.
#[derive(Debug, Default)]
pub struct ScienceDirectExtractor {
    bib_ids: HashMap<String, String>,
}

impl ScienceDirectExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn remember(&mut self, bib_id: &str) {
        self.bib_ids.insert(bib_id.to_string(), bib_id.to_string());
        if bib_id.starts_with('b') && !bib_id.starts_with("bib") {
            self.bib_ids.insert(format!("bi{bib_id}"), bib_id.to_string());
        }
    }
}

/// Entry markup (or plain text) with block structure flattened to a single line.
///
/// The flattened copy is built as a detached scratch element, so markup
/// output is serialized (and escaped) by the tree itself.
fn flatten_entry(tree: &mut Tree, element: NodeId, markup: bool) -> String {
    let scratch = tree.create_element("div");
    flatten_into(tree, element, scratch, markup);
    let flat = if markup {
        tree.inner_html(scratch)
    } else {
        tree.text_content(scratch)
    };
    let collapsed = flat.split_whitespace().collect::<Vec<_>>().join(" ");
    SPACE_BEFORE_PUNCTUATION.replace_all(&collapsed, "$1").into_owned()
}

fn push_space(tree: &mut Tree, target: NodeId) {
    let space = tree.create_text(" ");
    tree.append(target, space);
}

fn flatten_into(tree: &mut Tree, node: NodeId, target: NodeId, markup: bool) {
    for child in tree.children(node) {
        if let Some(text) = tree.text(child).map(str::to_string) {
            let copy = tree.create_text(&text);
            tree.append(target, copy);
            continue;
        }
        let Some(tag) = tree.tag(child).map(str::to_string) else {
            continue;
        };
        if markup && KEPT_INLINE.contains(&tag.as_str()) {
            let attrs = match tree.attr(child, "href").filter(|_| tag == "a") {
                Some(href) => vec![("href".to_string(), href.to_string())],
                None => Vec::new(),
            };
            let inline = tree.create_element_with(&tag, attrs);
            tree.append(target, inline);
            flatten_into(tree, child, inline, markup);
        } else if FLATTENED_BLOCKS.contains(&tag.as_str()) {
            push_space(tree, target);
            flatten_into(tree, child, target, markup);
            push_space(tree, target);
        } else {
            flatten_into(tree, child, target, markup);
        }
    }
}

/// Bibliography id of an entry: the list label's `#bb…` anchor, a
/// `data-xocs-content-id`, or `b` plus the digits of the span id.
fn bibliography_id(tree: &Tree, span: NodeId) -> Result<Option<String>> {
    if let Some(item) = tree.closest(span, "li")? {
        for anchor in tree.select(item, "span.label a.anchor")? {
            if let Some(href) = tree.attr(anchor, "href").filter(|h| h.starts_with("#bb")) {
                return Ok(Some(href[2..].to_string()));
            }
        }
        if let Some(anchor) = tree.select_first(item, r#"a[data-xocs-content-id^="b"]"#)? {
            return Ok(tree.attr(anchor, "data-xocs-content-id").map(str::to_string));
        }
    }
    let digits: String = tree
        .attr(span, "id")
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    Ok((!digits.is_empty()).then(|| format!("b{digits}")))
}

impl ScienceDirectExtractor {
    fn list_fallback(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let mut references = Vec::new();
        for heading in tree.select(tree.root(), "h1, h2, h3, h4, h5, h6")? {
            if !LIST_HEADING.is_match(tree.text_content(heading).trim()) {
                continue;
            }
            let mut lists = Vec::new();
            let mut next = tree.next_element_sibling(heading);
            while let Some(node) = next {
                if tree.is_heading(node) {
                    break;
                }
                if tree.is_tag(node, "ul") || tree.is_tag(node, "ol") {
                    lists.push(node);
                }
                next = tree.next_element_sibling(node);
            }
            for list in &lists {
                for item in tree.select(*list, "li")? {
                    let text = flatten_entry(tree, item, false);
                    if text.chars().count() > 20 {
                        let content = flatten_entry(tree, item, true);
                        references.push(Reference::pending(content, text, "science-direct-list"));
                    }
                }
            }
            if !lists.is_empty() {
                for list in lists {
                    tree.detach(list);
                }
                tree.detach(heading);
            }
        }
        Ok(references)
    }

    fn convert_citation_anchors(&self, tree: &mut Tree) -> Result<()> {
        let mut dangling = 0;
        for anchor in tree.select(tree.root(), CITATION_ANCHORS)? {
            let target = tree
                .attr(anchor, "data-xocs-content-id")
                .map(str::to_string)
                .or_else(|| {
                    tree.attr(anchor, "href")
                        .and_then(|h| h.strip_prefix('#'))
                        .map(str::to_string)
                });
            let bib_id = target.as_ref().and_then(|t| self.bib_ids.get(t)).cloned();
            match bib_id {
                Some(bib_id) => {
                    tree.set_attr(anchor, "href", &format!("#{bib_id}"));
                    tree.set_attr(anchor, TEMP_BIB_ATTR, &bib_id);
                    for attr in [
                        "data-xocs-content-type",
                        "data-xocs-content-id",
                        "data-sd-ui-side-panel-opener",
                    ] {
                        tree.remove_attr(anchor, attr);
                    }
                }
                None => {
                    let text = tree.text_content(anchor);
                    let replacement = tree.create_text(&text);
                    tree.replace(anchor, replacement);
                    dangling += 1;
                }
            }
        }
        if dangling > 0 {
            warn!(dangling, "science-direct: citation anchors without bibliography entry");
        }
        Ok(())
    }
}

impl FormatExtractor for ScienceDirectExtractor {
    fn format_id(&self) -> &'static str {
        "science-direct"
    }

    fn extract_footnotes(&mut self, _tree: &mut Tree, _ids: &IdMinter) -> Result<Vec<Footnote>> {
        Ok(Vec::new())
    }

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let mut references = Vec::new();
        let mut consumed = Vec::new();
        for span in tree.select(tree.root(), "span.reference[id]")? {
            let clean = clone_and_clean(tree, span, ENTRY_CHROME)?;
            let text = flatten_entry(tree, clean, false);
            if text.chars().count() <= 20 {
                continue;
            }
            let content = flatten_entry(tree, clean, true);
            let mut reference = Reference::pending(content, text, "science-direct");
            if let Some(bib_id) = bibliography_id(tree, span)? {
                self.remember(&bib_id);
                reference = reference.with_correlation(bib_id);
            }
            references.push(reference);
            consumed.push(tree.closest(span, "li")?.unwrap_or(span));
        }
        for node in consumed {
            tree.detach(node);
        }

        if references.is_empty() {
            references = self.list_fallback(tree)?;
        }
        info!(count = references.len(), "science-direct: references extracted");
        Ok(references)
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        let sections = remove_sections_by_heading(tree, |text| SECTION_HEADING.is_match(text))?;
        debug!(sections, "science-direct: removed bibliography sections");
        unwrap_containers(tree, &[])?;
        self.convert_citation_anchors(tree)
    }

    fn link_citations(&mut self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let mut converted = 0;
        for anchor in tree.select(tree.root(), &format!("a[{TEMP_BIB_ATTR}]"))? {
            let bib_id = tree.attr(anchor, TEMP_BIB_ATTR).unwrap_or_default().to_string();
            let reference_id = references
                .iter()
                .find(|r| r.correlation_id.as_deref() == Some(bib_id.as_str()))
                .and_then(|r| r.reference_id.clone());
            tree.remove_attr(anchor, TEMP_BIB_ATTR);
            match reference_id {
                Some(id) => {
                    tree.set_attr(anchor, "href", &format!("#{id}"));
                    tree.set_attr(anchor, "class", CITATION_CLASS);
                    converted += 1;
                }
                None => warn!(bib_id = %bib_id, "science-direct: no reference for citation anchor"),
            }
        }
        let shared = link::citations::link_citations(tree, references, self.format_id())?;
        Ok(converted + shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASTE: &str = r##"<p>Prior work <a class="anchor" data-xocs-content-type="reference" data-xocs-content-id="bib0005" href="#bib0005">[1]</a> and <a class="anchor" data-xocs-content-type="reference" data-xocs-content-id="bib0099" href="#bib0099">[9]</a>.</p><ol><li><span class="label"><a class="anchor" href="#bb0005">[1]</a></span><span class="reference" id="sref1"><div>A. Author, B. Writer</div><div>A <em>study</em> of things , Journal 12 (2019) 1-9</div><div class="ReferenceLinks"><a href="https://doi.org/x">Google Scholar</a></div></span></li></ol>"##;

    #[test]
    fn test_extracts_flattened_entry() {
        let mut tree = Tree::parse(PASTE);
        let mut extractor = ScienceDirectExtractor::new();
        let references = extractor.extract_references(&mut tree).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(
            references[0].content,
            "A. Author, B. Writer A <em>study</em> of things, Journal 12 (2019) 1-9"
        );
        assert_eq!(
            references[0].original_text,
            "A. Author, B. Writer A study of things, Journal 12 (2019) 1-9"
        );
        assert_eq!(references[0].correlation_id.as_deref(), Some("b0005"));
        assert!(!tree.to_html().contains("<li>"));
    }

    #[test]
    fn test_citation_anchors_mapped_or_unwrapped() {
        let mut tree = Tree::parse(PASTE);
        let mut extractor = ScienceDirectExtractor::new();
        let mut references = extractor.extract_references(&mut tree).unwrap();
        extractor.transform_structure(&mut tree).unwrap();
        let html = tree.to_html();
        assert!(html.contains(r#"data-temp-bibid="b0005""#));
        assert!(html.contains(" and [9]."));

        references[0].finalize("author2019".into(), vec![]);
        let linked = extractor.link_citations(&mut tree, &references).unwrap();
        assert_eq!(linked, 1);
        assert!(tree
            .to_html()
            .contains(r##"class="in-text-citation" href="#author2019">[1]</a>"##));
    }

    #[test]
    fn test_list_fallback() {
        let mut tree = Tree::parse(
            "<p>Body</p><h2>References</h2><ul><li>Smith, J. 2019. A sufficiently long entry.</li></ul>",
        );
        let references = ScienceDirectExtractor::new().extract_references(&mut tree).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].kind, "science-direct-list");
        assert_eq!(tree.to_html(), "<p>Body</p>");
    }
}
