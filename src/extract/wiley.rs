// Wiley Online Library.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{info, warn};

use super::{element_html, element_text, new_footnote, FormatExtractor};
use crate::dom::ops::{
    clone_and_clean, is_reference_section_heading, remove_all, remove_sections_by_heading,
    remove_static_content, unwrap_containers,
};
use crate::dom::Tree;
use crate::ids::IdMinter;
use crate::keys::generate_keys;
use crate::link::{self, reformat_citation_link, CitationParts};
use crate::model::{Footnote, Reference};

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}[a-z]?)").unwrap());

const FOOTNOTES: &str = r#".note, [role="doc-footnote"], .footnote"#;

const REFERENCE_CHROME: &[&str] = &[
    ".extra-links",
    ".getFTR",
    ".getFTR__content",
    ".google-scholar",
    r#"a[target="_blank"]"#,
    r#"[aria-hidden="true"]"#,
    ".hidden",
];

const UI_CHROME: &str = r#".pb-dropzone, .loa-wrapper, .accordion, .accordion-tabbed, .epub-sections, .article-header__widget, .article-tools, .metrics-section, .share-article, [data-pb-dropzone], .getFTR, .extra-links, .google-scholar, svg, [aria-hidden="true"]"#;

const CITATION_LINK_ATTRS: &[&str] = &["data-tab", "id", "data-tooltip", "tabindex"];

#[derive(Debug, Default)]
pub struct WileyExtractor;

impl WileyExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl WileyExtractor {
    fn link_bibliography_anchors(&self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let mut converted = 0;
        for anchor in tree.select(tree.root(), r#"a[href*="-bib-"]"#)? {
            let Some(bib_id) = tree
                .attr(anchor, "href")
                .and_then(|h| h.rsplit_once('#'))
                .map(|(_, id)| id.to_string())
            else {
                continue;
            };
            let Some(reference_id) = references
                .iter()
                .find(|r| r.correlation_id.as_deref() == Some(bib_id.as_str()))
                .and_then(|r| r.reference_id.clone())
            else {
                warn!(bib_id = %bib_id, "wiley: citation target not extracted");
                continue;
            };

            let text = tree.text_content(anchor).trim().to_string();
            let Some(year) = YEAR.find(&text) else {
                continue;
            };
            let before_year = text[..year.start()].trim();
            let after_year = &text[year.end()..];
            let narrative = before_year.ends_with('(') && !text.starts_with('(');
            let parts = if narrative {
                CitationParts {
                    author: before_year
                        .trim_end_matches('(')
                        .trim()
                        .trim_end_matches([',', ';'])
                        .to_string(),
                    year: year.as_str().to_string(),
                    trailing: String::new(),
                    narrative,
                }
            } else {
                CitationParts {
                    author: before_year.to_string(),
                    year: year.as_str().to_string(),
                    trailing: after_year.to_string(),
                    narrative,
                }
            };
            reformat_citation_link(tree, anchor, &reference_id, &parts);
            for attr in CITATION_LINK_ATTRS {
                tree.remove_attr(anchor, attr);
            }
            converted += 1;
        }
        Ok(converted)
    }
}

impl FormatExtractor for WileyExtractor {
    fn format_id(&self) -> &'static str {
        "wiley"
    }

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut footnotes = Vec::new();
        for note in tree.select(tree.root(), FOOTNOTES)? {
            if !tree.is_attached(note) {
                continue;
            }
            let clean = clone_and_clean(tree, note, &[".back-link", r##"a[href^="#"]"##])?;
            let content = element_html(tree, clean);
            if content.is_empty() {
                continue;
            }
            let identifier = (footnotes.len() + 1).to_string();
            footnotes.push(new_footnote(ids, &identifier, content, "wiley"));
            tree.detach(note);
        }
        info!(count = footnotes.len(), "wiley: footnotes extracted");
        Ok(footnotes)
    }

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let mut references = Vec::new();
        for item in tree.select(tree.root(), "li[data-bib-id]")? {
            let bib_id = tree.attr(item, "data-bib-id").unwrap_or_default().to_string();
            let clean = clone_and_clean(tree, item, REFERENCE_CHROME)?;
            let text = element_text(tree, clean);
            if text.chars().count() < 10 {
                continue;
            }

            let author = match tree.select_first(clean, ".author")? {
                Some(a) => element_text(tree, a),
                None => String::new(),
            };
            let pub_year = match tree.select_first(clean, ".pubYear")? {
                Some(y) => element_text(tree, y),
                None => String::new(),
            };
            let id = generate_keys(&format!("{author} {pub_year}"), "", self.format_id())
                .into_iter()
                .next()
                .unwrap_or_else(|| format!("wiley_{bib_id}"));
            let mut keys = vec![id.clone()];
            for key in generate_keys(&text, "", self.format_id()) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }

            let content = element_html(tree, clean);
            references.push(
                Reference::resolved(id, content, text, "wiley-bibliography", keys).with_correlation(bib_id),
            );
            tree.detach(item);
        }
        info!(count = references.len(), "wiley: references extracted");
        Ok(references)
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        remove_sections_by_heading(tree, is_reference_section_heading)?;
        remove_static_content(tree)?;
        let root = tree.root();
        remove_all(tree, root, UI_CHROME)?;
        for list in tree.select(tree.root(), "ul.article__references, ol.article__references")? {
            if tree.element_children(list).is_empty() {
                tree.detach(list);
            }
        }
        unwrap_containers(tree, &[])
    }

    fn link_citations(&mut self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let precise = self.link_bibliography_anchors(tree, references)?;
        let shared = link::citations::link_citations(tree, references, self.format_id())?;
        Ok(precise + shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r##"<p>Shown by <a href="#jcms-bib-0012" data-tab="pane-pcw-references" id="jcms-bib-0012R">Baker (2015)</a> and others (<a href="#jcms-bib-0012">Baker, 2015</a>).</p><ul class="article__references"><li data-bib-id="jcms-bib-0012"><span class="author">Baker, T.</span> (<span class="pubYear">2015</span>). Policy mobilities. <span class="extra-links"><a class="google-scholar">Google Scholar</a></span></li></ul>"##;

    #[test]
    fn test_reference_resolved_from_author_and_year() {
        let mut tree = Tree::parse(ARTICLE);
        let references = WileyExtractor::new().extract_references(&mut tree).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].reference_id.as_deref(), Some("baker2015"));
        assert!(!references[0].needs_key_generation);
        assert_eq!(references[0].correlation_id.as_deref(), Some("jcms-bib-0012"));
        assert!(!references[0].content.contains("Google Scholar"));
    }

    #[test]
    fn test_links_narrative_and_parenthetical() {
        let mut tree = Tree::parse(ARTICLE);
        let mut extractor = WileyExtractor::new();
        let references = extractor.extract_references(&mut tree).unwrap();
        extractor.transform_structure(&mut tree).unwrap();
        let linked = extractor.link_citations(&mut tree, &references).unwrap();
        assert_eq!(linked, 2);
        assert_eq!(
            tree.to_html(),
            r##"<p>Shown by Baker (<a href="#baker2015" class="in-text-citation">2015</a>) and others (Baker, <a href="#baker2015" class="in-text-citation">2015</a>).</p>"##
        );
    }

    #[test]
    fn test_footnotes_numbered_in_order() {
        let mut tree = Tree::parse(
            r##"<p>Text</p><div class="note"><a class="back-link" href="#n1">^</a>First.</div><div role="doc-footnote">Second.</div>"##,
        );
        let ids = IdMinter::new("b", Some(6));
        let footnotes = WileyExtractor::new().extract_footnotes(&mut tree, &ids).unwrap();
        assert_eq!(footnotes.len(), 2);
        assert_eq!(footnotes[0].content, "First.");
        assert_eq!(footnotes[1].original_identifier, "2");
        assert_eq!(tree.to_html(), "<p>Text</p>");
    }
}
