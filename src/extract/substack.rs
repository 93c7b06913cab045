// Substack newsletters.
//
// Markers are `<a data-component-name="FootnoteAnchorToDOM">` links; each
// definition is a `.footnote-content` block next to a back link
// `#footnote-anchor-{n}-{post}`. Substack posts have no bibliography.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info};

use super::{element_html, new_footnote, simplify_marker, strip_leading_number, FormatExtractor};
use crate::dom::ops::{clone_and_clean, remove_sections_by_heading, remove_static_content, unwrap_containers};
use crate::dom::{NodeId, Tree};
use crate::ids::IdMinter;
use crate::model::{Footnote, Reference};

static BACK_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#footnote-anchor-(\d+)-").unwrap());

static CONTAINER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"footnote-(\d+)-").unwrap());

static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)").unwrap());

static NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

static NOTES_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(footnotes|notes|endnotes)$").unwrap());

const BACK_LINKS: &str = r##"a[href*="#footnote-anchor-"]"##;
const INLINE_TAGS: &[&str] = &["a", "span", "sup", "em", "i", "strong", "b"];

#[derive(Debug, Default)]
pub struct SubstackExtractor;

impl SubstackExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn back_link_number(tree: &Tree, scope: NodeId) -> Result<Option<String>> {
    for link in tree.select(scope, BACK_LINKS)? {
        if let Some(caps) = tree.attr(link, "href").and_then(|h| BACK_LINK.captures(h)) {
            return Ok(Some(caps[1].to_string()));
        }
    }
    Ok(None)
}

/// Footnote number of a `.footnote-content` block.
fn footnote_number(tree: &Tree, content: NodeId) -> Result<Option<String>> {
    if let Some(number) = back_link_number(tree, content)? {
        return Ok(Some(number));
    }
    for ancestor in tree.ancestors(content) {
        if let Some(caps) = tree.attr(ancestor, "id").and_then(|id| CONTAINER_ID.captures(id)) {
            return Ok(Some(caps[1].to_string()));
        }
    }
    if let Some(parent) = tree.parent(content) {
        if let Some(number) = back_link_number(tree, parent)? {
            return Ok(Some(number));
        }
    }
    Ok(LEADING_DIGITS
        .captures(&tree.text_content(content))
        .map(|c| c[1].to_string()))
}

fn is_footnote_wrapper(tree: &Tree, node: NodeId) -> bool {
    tree.has_class(node, "footnote") || tree.attr(node, "id").is_some_and(|id| id.contains("footnote"))
}

impl FormatExtractor for SubstackExtractor {
    fn format_id(&self) -> &'static str {
        "substack"
    }

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut markers = 0;
        for anchor in tree.select(tree.root(), r#"a[data-component-name="FootnoteAnchorToDOM"]"#)? {
            let number = tree.text_content(anchor).trim().to_string();
            if NUMERAL.is_match(&number) {
                simplify_marker(tree, anchor, &number);
                markers += 1;
            }
        }

        let mut footnotes = Vec::new();
        for content in tree.select(tree.root(), ".footnote-content")? {
            if !tree.is_attached(content) {
                continue;
            }
            let Some(identifier) = footnote_number(tree, content)? else {
                debug!("substack: footnote content without number");
                continue;
            };
            let clean = clone_and_clean(tree, content, &[BACK_LINKS])?;
            strip_leading_number(tree, clean);
            let body = element_html(tree, clean);
            if body.is_empty() {
                continue;
            }
            footnotes.push(new_footnote(ids, &identifier, body, "substack"));

            let parent = tree.parent(content);
            tree.detach(content);
            if let Some(parent) = parent.filter(|&p| p != tree.root()) {
                if tree.text_content(parent).trim().is_empty() || is_footnote_wrapper(tree, parent) {
                    tree.detach(parent);
                }
            }
        }

        for wrapper in tree.select(tree.root(), r#"[class*="footnote"], [id*="footnote"]"#)? {
            if !tree.is_attached(wrapper) || tree.tag(wrapper).is_some_and(|t| INLINE_TAGS.contains(&t)) {
                continue;
            }
            if tree.text_content(wrapper).trim().is_empty()
                || tree.select_first(wrapper, ".footnote-content")?.is_some()
            {
                tree.detach(wrapper);
            }
        }

        info!(markers, count = footnotes.len(), "substack: footnotes extracted");
        Ok(footnotes)
    }

    fn extract_references(&mut self, _tree: &mut Tree) -> Result<Vec<Reference>> {
        Ok(Vec::new())
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        remove_sections_by_heading(tree, |text| NOTES_HEADING.is_match(text))?;
        remove_static_content(tree)?;
        unwrap_containers(tree, &[])?;
        for node in tree.select(tree.root(), "[data-component-name]")? {
            tree.remove_attr(node, "data-component-name");
        }
        for anchor in tree.select(tree.root(), "a.footnote-anchor")? {
            if tree
                .attr(anchor, "href")
                .is_some_and(|h| h.contains("#footnote-anchor-"))
            {
                tree.detach(anchor);
            }
        }
        Ok(())
    }
}
