// Fallback extractor for markup no publisher format claims.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info};

use super::{
    element_html, new_footnote, paragraph_references, simplify_marker, strip_leading_number,
    strip_leading_number_anchor, FormatExtractor, ParagraphScan,
};
use crate::dom::ops::{trim_leading_text, unwrap_containers, wrap_loose_nodes};
use crate::dom::{NodeId, Tree};
use crate::ids::IdMinter;
use crate::model::{Footnote, Reference};

static DEFINITION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)[.)\s:]").unwrap());

static MARKDOWN_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\[\^?(\d+)\]\s*:\s*(.+)$").unwrap()
});

static MARKDOWN_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[\^?\d+\]\s*:\s*").unwrap());

static NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(references|bibliography|works cited|sources)$")
        .unwrap()
});

/// Heuristic extractor: numeric `<sup>` markers matched to numbered
/// paragraphs or list items, markdown `[^n]:` definitions, and a trailing
/// bibliography.
#[derive(Debug, Default)]
pub struct GeneralExtractor;

impl GeneralExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Numeral carried by a `<sup>`: its text, else its `fn-count-id`.
fn sup_identifier(tree: &Tree, sup: NodeId) -> Option<String> {
    let text = tree.text_content(sup).trim().to_string();
    let identifier = if text.is_empty() {
        tree.attr(sup, "fn-count-id")?.trim().to_string()
    } else {
        text
    };
    NUMERAL.is_match(&identifier).then_some(identifier)
}

/// Numbered-definition identifier of an element: `7. text`, `7) text`, ...
fn definition_identifier(tree: &Tree, element: NodeId) -> Option<String> {
    let text = tree.text_content(element);
    let text = text.trim();
    let caps = DEFINITION_PREFIX.captures(text)?;
    (text.len() > caps[0].len()).then(|| caps[1].to_string())
}

impl GeneralExtractor {
    fn numbered_definitions(&self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut markers: Vec<String> = Vec::new();
        for sup in tree.select(tree.root(), "sup")? {
            if let Some(identifier) = sup_identifier(tree, sup) {
                if !markers.contains(&identifier) {
                    markers.push(identifier);
                }
            }
        }
        if markers.is_empty() {
            return Ok(Vec::new());
        }

        let mut definitions: HashMap<String, NodeId> = HashMap::new();
        for p in tree.select(tree.root(), "p")? {
            if let Some(identifier) = definition_identifier(tree, p) {
                definitions.insert(identifier, p);
            }
        }
        for li in tree.select(tree.root(), "li")? {
            let anchored = tree
                .select_first(li, "a")?
                .map(|a| tree.text_content(a).trim().to_string())
                .filter(|t| NUMERAL.is_match(t));
            let identifier = match anchored {
                Some(number) if markers.contains(&number) && !definitions.contains_key(&number) => {
                    Some(number)
                }
                _ => definition_identifier(tree, li)
                    .filter(|n| markers.contains(n) && !definitions.contains_key(n)),
            };
            if let Some(identifier) = identifier {
                definitions.insert(identifier, li);
            }
        }

        if let Some(missing) = markers.iter().find(|m| !definitions.contains_key(*m)) {
            debug!(marker = %missing, "numbered footnote definition missing, skipping heuristic");
            return Ok(Vec::new());
        }

        let mut footnotes = Vec::new();
        for identifier in &markers {
            let Some(&element) = definitions.get(identifier) else {
                continue;
            };
            if !strip_leading_number_anchor(tree, element, identifier) {
                strip_leading_number(tree, element);
            }
            let content = element_html(tree, element);
            footnotes.push(new_footnote(ids, identifier, content, "html-paragraph-heuristic"));

            let parent = tree.parent(element);
            tree.detach(element);
            if let Some(list) = parent.filter(|&l| tree.is_tag(l, "ul") || tree.is_tag(l, "ol")) {
                if tree.element_children(list).is_empty() {
                    tree.detach(list);
                }
            }
        }

        for sup in tree.select(tree.root(), "sup")? {
            if let Some(identifier) = sup_identifier(tree, sup).filter(|i| markers.contains(i)) {
                simplify_marker(tree, sup, &identifier);
            }
        }
        Ok(footnotes)
    }

    fn markdown_definitions(
        &self,
        tree: &mut Tree,
        ids: &IdMinter,
        taken: &[Footnote],
    ) -> Result<Vec<Footnote>> {
        let mut footnotes: Vec<Footnote> = Vec::new();
        for p in tree.select(tree.root(), "p")? {
            let text = tree.text_content(p);
            let Some(caps) = MARKDOWN_DEFINITION.captures(text.trim()) else {
                continue;
            };
            let identifier = caps[1].to_string();
            let already = taken
                .iter()
                .chain(footnotes.iter())
                .any(|f| f.original_identifier == identifier);
            if already {
                continue;
            }
            if let Some(label) = MARKDOWN_LABEL.find(&text) {
                trim_leading_text(tree, p, label.end());
            }
            let content = element_html(tree, p);
            footnotes.push(new_footnote(ids, &identifier, content, "markdown-html"));
            tree.detach(p);
        }
        Ok(footnotes)
    }
}

impl FormatExtractor for GeneralExtractor {
    fn format_id(&self) -> &'static str {
        "general"
    }

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut footnotes = self.numbered_definitions(tree, ids)?;
        let markdown = self.markdown_definitions(tree, ids, &footnotes)?;
        footnotes.extend(markdown);
        info!(count = footnotes.len(), "general: footnotes extracted");
        Ok(footnotes)
    }

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let references = paragraph_references(
            tree,
            &ParagraphScan {
                heading: &SECTION_HEADING,
                kind: "html-paragraph",
                split_breaks: true,
            },
        )?;
        info!(count = references.len(), "general: references extracted");
        Ok(references)
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        unwrap_containers(tree, &[])?;
        let root = tree.root();
        wrap_loose_nodes(tree, root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> IdMinter {
        IdMinter::new("book", Some(1))
    }

    #[test]
    fn test_numbered_paragraph_footnotes() {
        let mut tree = Tree::parse(
            "<p>Claim<sup>1</sup> and more<sup>2</sup>.</p><p>1. First note.</p><p>2) Second note.</p>",
        );
        let footnotes = GeneralExtractor::new().extract_footnotes(&mut tree, &ids()).unwrap();
        assert_eq!(footnotes.len(), 2);
        assert_eq!(footnotes[0].content, "First note.");
        assert_eq!(footnotes[0].footnote_id, "bookFn11");
        assert_eq!(footnotes[1].content, "Second note.");
        assert_eq!(
            tree.to_html(),
            r#"<p>Claim<sup fn-count-id="1">1</sup> and more<sup fn-count-id="2">2</sup>.</p>"#
        );
    }

    #[test]
    fn test_missing_definition_extracts_nothing() {
        let mut tree = Tree::parse("<p>Claim<sup>1</sup><sup>2</sup></p><p>1. Only one.</p>");
        let footnotes = GeneralExtractor::new().extract_footnotes(&mut tree, &ids()).unwrap();
        assert!(footnotes.is_empty());
        assert!(tree.to_html().contains("1. Only one."));
    }

    #[test]
    fn test_list_item_definitions_remove_empty_list() {
        let mut tree = Tree::parse(
            r##"<p>Claim<sup>7</sup></p><ul><li><a href="#r7">7</a> Listed note.</li></ul>"##,
        );
        let footnotes = GeneralExtractor::new().extract_footnotes(&mut tree, &ids()).unwrap();
        assert_eq!(footnotes.len(), 1);
        assert_eq!(footnotes[0].content, "Listed note.");
        assert!(!tree.to_html().contains("<ul>"));
    }

    #[test]
    fn test_markdown_definitions() {
        let mut tree = Tree::parse("<p>Claim[^3] here.</p><p>[^3]: Markdown <em>note</em>.</p>");
        let footnotes = GeneralExtractor::new().extract_footnotes(&mut tree, &ids()).unwrap();
        assert_eq!(footnotes.len(), 1);
        assert_eq!(footnotes[0].original_identifier, "3");
        assert_eq!(footnotes[0].kind, "markdown-html");
        assert_eq!(footnotes[0].content, "Markdown <em>note</em>.");
        assert_eq!(tree.to_html(), "<p>Claim[^3] here.</p>");
    }

    #[test]
    fn test_transform_wraps_loose_text() {
        let mut tree = Tree::parse("loose <div><p>block</p>tail</div>");
        GeneralExtractor::new().transform_structure(&mut tree).unwrap();
        assert_eq!(tree.to_html(), "<p>loose </p><p>block</p><p>tail</p>");
    }
}
