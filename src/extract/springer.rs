// Springer Nature (SpringerLink and nature.com article pages).

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{info, warn};

use super::{element_html, element_text, new_footnote, simplify_marker, FormatExtractor};
use crate::dom::ops::{
    clone_and_clean, is_reference_section_heading, remove_sections_by_heading, remove_static_content,
    unwrap_containers,
};
use crate::dom::Tree;
use crate::ids::IdMinter;
use crate::link::{self, href_fragment, reformat_citation_link, CitationParts};
use crate::model::{Footnote, Reference};

static FOOTNOTE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Fn(\d+)").unwrap());

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}[a-z]?)").unwrap());

const REFERENCE_CHROME: &[&str] = &[
    ".c-article-references__links",
    r#"a[target="_blank"]"#,
    "svg",
];

const TRACKING_ATTRS: &[&str] = &[
    "data-track",
    "data-track-action",
    "data-track-label",
    "data-test",
    "aria-label",
    "title",
];

#[derive(Debug, Default)]
pub struct SpringerExtractor;

impl SpringerExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SpringerExtractor {
    fn link_reference_anchors(&self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let mut converted = 0;
        for anchor in tree.select(tree.root(), r##"a[href*="#ref-CR"]"##)? {
            let Some(target) = tree.attr(anchor, "href").and_then(href_fragment) else {
                continue;
            };
            let Some(reference_id) = references
                .iter()
                .find(|r| r.correlation_id.as_deref() == Some(target.as_str()))
                .and_then(|r| r.reference_id.clone())
            else {
                warn!(target = %target, "springer: citation target not extracted");
                continue;
            };

            let text = tree.text_content(anchor).trim().to_string();
            let Some(year) = YEAR.find(&text) else {
                continue;
            };
            let narrative = text.contains('(');
            let author = text[..year.start()]
                .trim()
                .trim_end_matches('(')
                .trim()
                .to_string();
            let trailing = if narrative {
                String::new()
            } else {
                text[year.end()..].to_string()
            };
            let parts = CitationParts {
                author,
                year: year.as_str().to_string(),
                trailing,
                narrative,
            };
            reformat_citation_link(tree, anchor, &reference_id, &parts);
            for attr in TRACKING_ATTRS {
                tree.remove_attr(anchor, attr);
            }
            converted += 1;
        }
        Ok(converted)
    }
}

impl FormatExtractor for SpringerExtractor {
    fn format_id(&self) -> &'static str {
        "springer"
    }

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut footnotes = Vec::new();
        for element in tree.select(tree.root(), r#"[id^="Fn"]"#)? {
            let Some(identifier) = tree
                .attr(element, "id")
                .and_then(|id| FOOTNOTE_NUMBER.captures(id))
                .map(|c| c[1].to_string())
            else {
                continue;
            };
            let clean = clone_and_clean(tree, element, &[r##"a[href*="#Fn"]"##, ".label"])?;
            for sup in tree.select(clean, "sup")? {
                if tree.text_content(sup).trim() == identifier {
                    tree.detach(sup);
                }
            }
            let body = tree
                .select_first(clean, ".c-article-footnote--listed__content p, p")?
                .unwrap_or(clean);
            let content = element_html(tree, body);
            if content.is_empty() {
                continue;
            }
            footnotes.push(new_footnote(ids, &identifier, content, "springer"));
            tree.detach(element);
        }

        for link in tree.select(tree.root(), r##"a[href*="#Fn"]"##)? {
            let identifier = tree
                .attr(link, "href")
                .and_then(|href| FOOTNOTE_NUMBER.captures(href))
                .map(|c| c[1].to_string());
            if let Some(identifier) = identifier {
                simplify_marker(tree, link, &identifier);
            }
        }

        info!(count = footnotes.len(), "springer: footnotes extracted");
        Ok(footnotes)
    }

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let mut references = Vec::new();
        for item in tree.select(tree.root(), r#"[id^="ref-CR"]"#)? {
            let id = tree.attr(item, "id").unwrap_or_default().to_string();
            let clean = clone_and_clean(tree, item, REFERENCE_CHROME)?;
            let body = tree
                .select_first(clean, ".c-article-references__text, p")?
                .unwrap_or(clean);
            let text = element_text(tree, body);
            if text.chars().count() < 10 {
                continue;
            }
            let content = element_html(tree, body);
            references.push(
                Reference::pending(content, text, "springer-bibliography").with_correlation(id),
            );
            tree.detach(item);
        }
        info!(count = references.len(), "springer: references extracted");
        Ok(references)
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        remove_sections_by_heading(tree, is_reference_section_heading)?;
        remove_static_content(tree)?;
        unwrap_containers(tree, &["ul", "ol"])
    }

    fn allows_plain_text_markers(&self) -> bool {
        false
    }

    fn link_citations(&mut self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let precise = self.link_reference_anchors(tree, references)?;
        let shared = link::citations::link_citations(tree, references, self.format_id())?;
        Ok(precise + shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_list_item() {
        let mut tree = Tree::parse(
            r#"<p>Body</p><ul><li id="ref-CR1"><p class="c-article-references__text">Adams, R. (2001). Something. Press.</p><p class="c-article-references__links"><a href="x">Google Scholar</a></p></li></ul>"#,
        );
        let references = SpringerExtractor::new().extract_references(&mut tree).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].content, "Adams, R. (2001). Something. Press.");
        assert_eq!(references[0].correlation_id.as_deref(), Some("ref-CR1"));
        assert_eq!(tree.to_html(), "<p>Body</p><ul></ul>");
    }

    #[test]
    fn test_footnote_and_marker() {
        let mut tree = Tree::parse(
            r##"<p>Claim<sup><a href="#Fn3">3</a></sup></p><div id="Fn3"><span class="label">3</span><div class="c-article-footnote--listed__content"><p>Springer note.</p></div></div>"##,
        );
        let ids = IdMinter::new("b", Some(2));
        let footnotes = SpringerExtractor::new().extract_footnotes(&mut tree, &ids).unwrap();
        assert_eq!(footnotes.len(), 1);
        assert_eq!(footnotes[0].original_identifier, "3");
        assert_eq!(footnotes[0].content, "Springer note.");
        assert_eq!(tree.to_html(), r#"<p>Claim<sup fn-count-id="3">3</sup></p>"#);
    }

    #[test]
    fn test_parenthetical_anchor() {
        let mut tree = Tree::parse(
            r##"<p>(<a data-track="click" href="https://link.springer.com/article/x#ref-CR1">Adams 2001</a>)</p>"##,
        );
        let references = vec![Reference::resolved(
            "adams2001".into(),
            "Adams".into(),
            "Adams, R. (2001).".into(),
            "springer-bibliography",
            vec![],
        )
        .with_correlation("ref-CR1")];
        let linked = SpringerExtractor::new().link_citations(&mut tree, &references).unwrap();
        assert_eq!(linked, 1);
        assert_eq!(
            tree.to_html(),
            r##"<p>(Adams <a href="#adams2001" class="in-text-citation">2001</a>)</p>"##
        );
    }
}
