// SAGE Journals.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{
    element_html, element_text, is_valid_reference, new_footnote, paragraph_references,
    push_unique_reference, simplify_marker, strip_leading_number, FormatExtractor, ParagraphScan,
};
use crate::dom::ops::{
    clone_and_clean, is_reference_section_heading, remove_sections_by_heading, remove_static_content,
    unwrap_containers,
};
use crate::dom::{NodeId, Tree};
use crate::ids::IdMinter;
use crate::link::{self, reformat_citation_link, CitationParts};
use crate::model::{Footnote, Reference};

static FOOTNOTE_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(fn\d+-[a-z0-9]+)").unwrap());

static DEFINITION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)[.)\s]").unwrap());

static NUMBERED_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]").unwrap());

static NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

static YEAR_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}[a-z]?)\b").unwrap());

static TRAILING_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\s(]+$").unwrap());

static AUTHOR_JOIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(?:and|&)\s+").unwrap());

static ET_AL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*et\s+al\.?").unwrap());

static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(references|bibliography|notes|sources)$").unwrap()
});

const CITATION_LINKS: &str = r#"a[role="doc-biblioref"], a[data-xml-rid^="bibr"]"#;
const BIBLIOGRAPHY_CHROME: &[&str] = &[
    ".external-links",
    ".core-xlink-google-scholar",
    ".to-citation__wrapper",
];

#[derive(Debug, Default)]
pub struct SageExtractor;

impl SageExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Numeral of a footnote link: its own text or that of a nested `<sup>`.
fn link_numeral(tree: &Tree, link: NodeId) -> Option<String> {
    let text = tree.text_content(link).trim().to_string();
    NUMERAL.is_match(&text).then_some(text)
}

fn numbered_as(tree: &Tree, element: NodeId, identifier: &str) -> bool {
    let text = tree.text_content(element);
    DEFINITION_PREFIX
        .captures(text.trim())
        .is_some_and(|caps| &caps[1] == identifier)
}

fn inside_any(tree: &Tree, node: NodeId, taken: &[NodeId]) -> bool {
    taken.contains(&node) || tree.ancestors(node).iter().any(|a| taken.contains(a))
}

impl SageExtractor {
    /// Locate the definition element of footnote `identifier`.
    fn find_definition(
        &self,
        tree: &Tree,
        identifier: &str,
        targets: &HashMap<String, String>,
    ) -> Result<Option<NodeId>> {
        let mut ids = Vec::new();
        if let Some(target) = targets.get(identifier) {
            ids.push(target.clone());
        }
        ids.push(format!("fn{identifier}"));
        for id in ids {
            if let Some(found) = tree.select_first(tree.root(), &format!(r#"[id="{id}"]"#))? {
                return Ok(Some(found));
            }
        }
        for selector in [r#"[role="listitem"]"#, ".ref", "p"] {
            for candidate in tree.select(tree.root(), selector)? {
                if numbered_as(tree, candidate, identifier) {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    fn link_publisher_citations(&self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let mut converted = 0;
        for link in tree.select(tree.root(), CITATION_LINKS)? {
            let text = tree.text_content(link).trim().to_string();
            let Some(year) = YEAR_WORD.captures(&text).and_then(|c| c.get(1)) else {
                warn!(citation = %text, "sage: no year in citation link");
                continue;
            };
            let before_year = text[..year.start()].trim_end();
            let after_year = &text[year.end()..];
            let year = year.as_str().to_string();
            let author = TRAILING_SEPARATORS.replace(before_year, "").trim().to_string();

            let rid = tree.attr(link, "data-xml-rid").map(str::to_string);
            let by_correlation = rid.as_deref().and_then(|rid| {
                references
                    .iter()
                    .find(|r| r.correlation_id.as_deref() == Some(rid))
                    .and_then(|r| r.reference_id.clone())
            });
            let reference_id = by_correlation.or_else(|| {
                let keys = citation_keys(&author, &year);
                references.iter().find_map(|r| {
                    keys.iter()
                        .any(|k| r.ref_keys.contains(k))
                        .then(|| r.reference_id.clone())
                        .flatten()
                })
            });
            let Some(reference_id) = reference_id else {
                warn!(citation = %text, rid = ?rid, "sage: citation did not resolve");
                continue;
            };

            let parts = if before_year.ends_with('(') {
                if after_year.trim_start().starts_with(')') {
                    CitationParts {
                        author,
                        year,
                        trailing: String::new(),
                        narrative: true,
                    }
                } else {
                    CitationParts {
                        author: format!("{author} ("),
                        year,
                        trailing: after_year.to_string(),
                        narrative: false,
                    }
                }
            } else {
                CitationParts {
                    author: if author.is_empty() {
                        author
                    } else {
                        format!("{author},")
                    },
                    year,
                    trailing: after_year.to_string(),
                    narrative: false,
                }
            };
            reformat_citation_link(tree, link, &reference_id, &parts);
            tree.remove_attr(link, "role");
            tree.remove_attr(link, "data-xml-rid");
            converted += 1;
        }
        Ok(converted)
    }
}

/// Candidate keys for a SAGE citation's author text.
fn citation_keys(author: &str, year: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let without_et_al = ET_AL.replace_all(author, "");
    let authors: Vec<String> = AUTHOR_JOIN
        .split(without_et_al.trim())
        .filter_map(|a| a.split_whitespace().last())
        .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric() && c != '-').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(surname) = authors.first() {
        keys.push(format!("{surname}{year}"));
        if surname.contains('-') {
            keys.push(format!("{}{year}", surname.replace('-', "")));
        }
        if authors.len() > 1 {
            keys.push(format!("{}{year}", authors.concat()));
        }
    }
    keys.push(year.to_string());
    keys
}

impl FormatExtractor for SageExtractor {
    fn format_id(&self) -> &'static str {
        "sage"
    }

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut markers: Vec<String> = Vec::new();
        for sup in tree.select(tree.root(), "sup")? {
            let text = tree.text_content(sup).trim().to_string();
            if NUMERAL.is_match(&text) && !markers.contains(&text) {
                markers.push(text);
            }
        }
        let mut targets: HashMap<String, String> = HashMap::new();
        for link in tree.select(tree.root(), r##"a[href*="#fn"]"##)? {
            let target = tree
                .attr(link, "href")
                .and_then(|href| FOOTNOTE_TARGET.captures(href))
                .map(|c| c[1].to_string());
            if let (Some(identifier), Some(target)) = (link_numeral(tree, link), target) {
                if !markers.contains(&identifier) {
                    markers.push(identifier.clone());
                }
                targets.insert(identifier, target);
            }
        }

        let mut footnotes = Vec::new();
        for identifier in &markers {
            let Some(definition) = self.find_definition(tree, identifier, &targets)? else {
                warn!(identifier = %identifier, "sage: footnote definition not found");
                continue;
            };
            strip_leading_number(tree, definition);
            let content = element_html(tree, definition);
            if content.is_empty() {
                continue;
            }
            footnotes.push(new_footnote(ids, identifier, content, "sage"));
            tree.detach(definition);
        }

        let extracted: Vec<&str> = footnotes.iter().map(|f| f.original_identifier.as_str()).collect();
        for link in tree.select(tree.root(), r##"a[href*="#fn"]"##)? {
            if let Some(identifier) = link_numeral(tree, link).filter(|i| extracted.contains(&i.as_str())) {
                simplify_marker(tree, link, &identifier);
            }
        }
        for sup in tree.select(tree.root(), "sup")? {
            if tree.has_attr(sup, "fn-count-id") {
                continue;
            }
            let text = tree.text_content(sup).trim().to_string();
            if extracted.contains(&text.as_str()) {
                simplify_marker(tree, sup, &text);
            }
        }

        info!(count = footnotes.len(), "sage: footnotes extracted");
        Ok(footnotes)
    }

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let mut references: Vec<Reference> = Vec::new();
        let mut consumed: Vec<NodeId> = Vec::new();

        for item in tree.select(tree.root(), r#"[id^="bibr"]"#)? {
            if inside_any(tree, item, &consumed) {
                continue;
            }
            let id = tree.attr(item, "id").unwrap_or_default().to_string();
            let clean = clone_and_clean(tree, item, BIBLIOGRAPHY_CHROME)?;
            let body = tree.select_first(clean, ".citation-content")?.unwrap_or(clean);
            let text = element_text(tree, body);
            if !is_valid_reference(&text, 20, 150) {
                debug!(id = %id, "sage: skipping invalid bibliography entry");
                continue;
            }
            let content = element_html(tree, body);
            references.push(Reference::pending(content, text, "sage-biblio").with_correlation(id));
            consumed.push(item);
        }

        if references.is_empty() {
            for container in tree.select(tree.root(), ".citations")? {
                for item in tree.select(container, r#"li, p, [role="listitem"]"#)? {
                    if inside_any(tree, item, &consumed) {
                        continue;
                    }
                    let text = element_text(tree, item);
                    if !is_valid_reference(&text, 20, 150) {
                        continue;
                    }
                    let content = element_html(tree, item);
                    if push_unique_reference(&mut references, Reference::pending(content, text, "sage-citation")) {
                        consumed.push(item);
                    }
                }
            }
        }

        for item in tree.select(tree.root(), ".ref")? {
            if inside_any(tree, item, &consumed) {
                continue;
            }
            let text = element_text(tree, item);
            if NUMBERED_REF.is_match(&text) || !is_valid_reference(&text, 20, 150) {
                continue;
            }
            let content = element_html(tree, item);
            if push_unique_reference(&mut references, Reference::pending(content, text, "sage-ref")) {
                consumed.push(item);
            }
        }

        for item in consumed {
            tree.detach(item);
        }

        if references.is_empty() {
            references = paragraph_references(
                tree,
                &ParagraphScan {
                    heading: &SECTION_HEADING,
                    kind: "sage-paragraph",
                    split_breaks: false,
                },
            )?;
        }
        info!(count = references.len(), "sage: references extracted");
        Ok(references)
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        remove_sections_by_heading(tree, is_reference_section_heading)?;
        remove_static_content(tree)?;
        unwrap_containers(tree, &[])
    }

    fn allows_plain_text_markers(&self) -> bool {
        false
    }

    fn link_citations(&mut self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let precise = self.link_publisher_citations(tree, references)?;
        let shared = link::citations::link_citations(tree, references, self.format_id())?;
        Ok(precise + shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footnote_by_complex_id() {
        let mut tree = Tree::parse(
            r##"<p>Claim<sup><a href="#fn1-0123abc">1</a></sup></p><div id="fn1-0123abc"><span>1</span> A sage note.</div>"##,
        );
        let ids = IdMinter::new("b", Some(1));
        let footnotes = SageExtractor::new().extract_footnotes(&mut tree, &ids).unwrap();
        assert_eq!(footnotes.len(), 1);
        assert_eq!(footnotes[0].content, "A sage note.");
        assert_eq!(tree.to_html(), r#"<p>Claim<sup fn-count-id="1">1</sup></p>"#);
    }

    #[test]
    fn test_footnote_by_numbered_paragraph() {
        let mut tree = Tree::parse("<p>Claim<sup>2</sup></p><p>2. Second note text.</p>");
        let ids = IdMinter::new("b", Some(1));
        let footnotes = SageExtractor::new().extract_footnotes(&mut tree, &ids).unwrap();
        assert_eq!(footnotes.len(), 1);
        assert_eq!(footnotes[0].content, "Second note text.");
        assert_eq!(tree.to_html(), r#"<p>Claim<sup fn-count-id="2">2</sup></p>"#);
    }

    #[test]
    fn test_bibliography_entries() {
        let mut tree = Tree::parse(
            r#"<p>Body</p><div id="bibr1-0001"><div class="citation-content">Smith J (2010) A long enough title. Journal 3: 1-9.</div><div class="external-links">Google Scholar</div></div>"#,
        );
        let references = SageExtractor::new().extract_references(&mut tree).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].kind, "sage-biblio");
        assert_eq!(references[0].correlation_id.as_deref(), Some("bibr1-0001"));
        assert!(!references[0].content.contains("Google Scholar"));
        assert_eq!(tree.to_html(), "<p>Body</p>");
    }

    #[test]
    fn test_citation_links_by_correlation() {
        let mut tree = Tree::parse(
            r##"<p>(<a role="doc-biblioref" data-xml-rid="bibr1-0001" href="#bibr1-0001">Smith, 2010</a>)</p>"##,
        );
        let references = vec![Reference::resolved(
            "smith2010".into(),
            "Smith".into(),
            "Smith J (2010)".into(),
            "sage-biblio",
            vec![],
        )
        .with_correlation("bibr1-0001")];
        let linked = SageExtractor::new().link_citations(&mut tree, &references).unwrap();
        assert_eq!(linked, 1);
        assert_eq!(
            tree.to_html(),
            r##"<p>(Smith, <a href="#smith2010" class="in-text-citation">2010</a>)</p>"##
        );
    }

    #[test]
    fn test_citation_keys() {
        assert_eq!(
            citation_keys("Smith and Jones", "2010"),
            vec!["smith2010", "smithjones2010", "2010"]
        );
        assert_eq!(citation_keys("", "2010"), vec!["2010"]);
    }
}
