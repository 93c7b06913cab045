// Oxford University Press (Oxford Academic).
//
// Footnotes are `content-id="fn{n}"` blocks referenced by
// `<a reveal-id="fn{n}">`; bibliography entries carry `content-id="bib{n}"`
// and are cited through `<a reveal-id="CIT{n}">` links whose text holds the
// author and year.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{element_html, element_text, new_footnote, normalize_identifier, simplify_marker, FormatExtractor};
use crate::dom::ops::{
    clone_and_clean, is_reference_section_heading, remove_all, remove_sections_by_heading,
    remove_static_content, unwrap_containers,
};
use crate::dom::{escape_text, NodeId, Tree};
use crate::ids::IdMinter;
use crate::link::{self, reformat_citation_link, CitationParts, CITATION_CLASS};
use crate::model::{Footnote, Reference};

static FOOTNOTE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fn-?(\d+)").unwrap());

static BRACKETED_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d{4}[a-z]?)\)").unwrap());

static YEAR_AFTER_INITIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",\s*\p{Lu}\.?\s*(\d{4}[a-z]?)[.\s]").unwrap()
});

static SURNAME_INITIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\p{Lu}[\p{L}'-]+(?:\s+(?:van|der|de|la|von))?[\p{L}'-]*),\s*\p{Lu}")
        .unwrap()
});

static SURNAME_FIRSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\p{Lu}[\p{L}'-]+)\s+\p{Lu}[\p{L}']+").unwrap()
});

static LEADING_SURNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\p{Lu}[\p{L}'-]+)").unwrap());

static OPEN_NARRATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s*\((\d{4}[a-z]?)$").unwrap()
});

static CLOSED_NARRATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s*\((\d{4}[a-z]?)\)$").unwrap()
});

static YEAR_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}[a-z]?)\b").unwrap());

static YEAR_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}[a-z]?$").unwrap());

static SEPARATOR_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[,\s]*$").unwrap());

static TRAILING_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\s()]+$").unwrap());

static AUTHOR_AND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").unwrap());

static ET_AL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+et\s+al\.?").unwrap());

static EDITORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+eds?\.?$").unwrap());

const CITATION_LINKS: &str = r#"a[reveal-id^="CIT"], a[data-open^="CIT"]"#;
const FOOTNOTE_LINKS: &str = r#"a[reveal-id^="fn"], a[data-open^="fn"]"#;
const TABLE_OR_FIGURE: &str = ".table-wrap-foot, .table-wrap, table, .fig, .fig-section, figure";
const UI_CHROME: &str = ".js-view-large, .openInAnotherWindow, .download-slide, .table-open-button-wrap, .ajax-articleAbstract-exclude-regex, .figure-button-wrap";

#[derive(Debug, Default)]
pub struct OupExtractor;

impl OupExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// `reveal-id` or `data-open` of a publisher link.
fn link_target(tree: &Tree, link: NodeId) -> Option<&str> {
    tree.attr(link, "reveal-id").or_else(|| tree.attr(link, "data-open"))
}

fn is_citation_link(tree: &Tree, node: NodeId) -> bool {
    tree.has_attr(node, "reveal-id")
        || tree.has_attr(node, "data-open")
        || (tree.is_tag(node, "a") && tree.has_class(node, CITATION_CLASS))
}

/// Surname-year keys for an OUP bibliography entry, or `None` when the entry
/// has no recognizable year or surname.
fn bibliography_keys(text: &str) -> Option<(Vec<String>, bool)> {
    let caps = BRACKETED_YEAR
        .captures(text)
        .or_else(|| YEAR_AFTER_INITIAL.captures(text))?;
    let (Some(whole), Some(year)) = (caps.get(0), caps.get(1)) else {
        return None;
    };
    let before_year = text[..whole.start()].trim();
    let surname = SURNAME_INITIALS
        .captures(before_year)
        .or_else(|| SURNAME_FIRSTNAME.captures(before_year))
        .or_else(|| LEADING_SURNAME.captures(before_year))
        .map(|c| c[1].trim().to_lowercase());
    let Some(surname) = surname else {
        return Some((Vec::new(), true));
    };
    let mut keys = vec![format!("{surname}{}", year.as_str())];
    if surname.contains('-') {
        keys.push(format!("{}{}", surname.replace('-', ""), year.as_str()));
    }
    Some((keys, false))
}

/// Candidate keys for one citation link's author text.
fn citation_keys(author: &str, year: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if !author.is_empty() {
        let first_author = AUTHOR_AND.split(author).next().unwrap_or(author).trim();
        let without_et_al = ET_AL.replace_all(first_author, "");
        let without_eds = EDITORS.replace_all(&without_et_al, "");
        let clean = without_eds.trim().trim_end_matches(',').trim().to_string();
        if let Some(surname) = clean.split_whitespace().last() {
            let surname = surname.to_lowercase();
            keys.push(format!("{surname}{year}"));
            if surname.contains('-') {
                keys.push(format!("{}{year}", surname.replace('-', "")));
            }
        }
        let joined: String = clean.split_whitespace().collect::<String>().to_lowercase();
        keys.push(format!("{joined}{year}"));
    }
    keys.push(year.to_lowercase());
    keys
}

/// Author of the nearest preceding citation in the same comma-separated group.
fn inherited_author(tree: &Tree, link: NodeId) -> Option<String> {
    let mut current = tree.prev_sibling(link);
    while let Some(node) = current {
        if let Some(text) = tree.text(node) {
            if !SEPARATOR_ONLY.is_match(text) {
                return None;
            }
        } else if is_citation_link(tree, node) {
            if tree.has_class(node, CITATION_CLASS) {
                let mut before = tree.prev_sibling(node);
                while let Some(candidate) = before.filter(|&b| tree.is_text(b)) {
                    let text = tree.text(candidate).unwrap_or_default().trim();
                    let author = TRAILING_PUNCTUATION.replace(text, "");
                    if !author.is_empty() {
                        return Some(author.trim().to_string());
                    }
                    before = tree.prev_sibling(candidate);
                }
                return None;
            }
            let text = tree.text_content(node);
            let text = text.trim();
            let year = YEAR_WORD.find(text)?;
            let author = TRAILING_PUNCTUATION.replace(text[..year.start()].trim(), "");
            return (!author.is_empty()).then(|| author.trim().to_string());
        }
        current = tree.prev_sibling(node);
    }
    None
}

/// True when the next citation after `link` (across separators) is year-only.
fn followed_by_year_citation(tree: &Tree, link: NodeId) -> bool {
    let mut current = tree.next_sibling(link);
    while let Some(node) = current {
        match tree.text(node) {
            Some(text) if SEPARATOR_ONLY.is_match(text) => current = tree.next_sibling(node),
            Some(_) => return false,
            None => {
                return is_citation_link(tree, node)
                    && YEAR_ONLY.is_match(tree.text_content(node).trim());
            }
        }
    }
    false
}

/// Parse a citation link's text into display parts. `None` when no year is present.
fn parse_citation(tree: &Tree, link: NodeId, text: &str) -> Option<CitationParts> {
    if let Some(caps) = OPEN_NARRATIVE.captures(text) {
        let author = caps[1].trim().to_string();
        let year = caps[2].to_string();
        if followed_by_year_citation(tree, link) {
            return Some(CitationParts {
                author: format!("{author} ("),
                year,
                trailing: String::new(),
                narrative: false,
            });
        }
        return Some(CitationParts {
            author,
            year,
            trailing: String::new(),
            narrative: true,
        });
    }
    if let Some(caps) = CLOSED_NARRATIVE.captures(text) {
        return Some(CitationParts {
            author: caps[1].trim().to_string(),
            year: caps[2].to_string(),
            trailing: String::new(),
            narrative: true,
        });
    }
    let year = YEAR_WORD.captures(text)?.get(1)?;
    Some(CitationParts {
        author: text[..year.start()].trim().to_string(),
        year: year.as_str().to_string(),
        trailing: text[year.end()..].to_string(),
        narrative: false,
    })
}

impl OupExtractor {
    fn link_publisher_citations(&self, tree: &mut Tree, references: &[Reference]) -> Result<usize> {
        let mut converted = 0;
        for link in tree.select(tree.root(), CITATION_LINKS)? {
            if !tree.is_attached(link) {
                continue;
            }
            let text = tree.text_content(link).trim().to_string();
            let Some(parts) = parse_citation(tree, link, &text) else {
                warn!(citation = %text, "oup: no year in citation link");
                continue;
            };

            let mut author = TRAILING_PUNCTUATION
                .replace(&parts.author, "")
                .trim()
                .to_string();
            if author.is_empty() && YEAR_ONLY.is_match(&text) {
                if let Some(inherited) = inherited_author(tree, link) {
                    debug!(citation = %text, author = %inherited, "oup: inherited author");
                    author = inherited;
                }
            }
            let keys = citation_keys(&author, &parts.year);

            let matched = references.iter().find_map(|r| {
                let id = r.reference_id.as_deref()?;
                keys.iter().any(|k| r.ref_keys.contains(k)).then_some(id)
            });
            let Some(reference_id) = matched else {
                warn!(citation = %text, target = ?link_target(tree, link), "oup: citation did not resolve");
                continue;
            };

            let reference_id = reference_id.to_string();
            reformat_citation_link(tree, link, &reference_id, &parts);
            for attr in ["reveal-id", "data-open", "data-google-interstitial"] {
                tree.remove_attr(link, attr);
            }
            converted += 1;
        }
        Ok(converted)
    }

    fn preserve_table_captions(&self, tree: &mut Tree) -> Result<()> {
        for wrap in tree.select(tree.root(), ".table-wrap, .table-full-width-wrap")? {
            let label = tree.select_first(wrap, ".label, .title-label")?;
            let caption = tree.select_first(wrap, ".caption")?;
            let table = tree.select_first(wrap, "table")?;
            let (Some(label), Some(caption), Some(table)) = (label, caption, table) else {
                continue;
            };
            let caption_text = match tree.select_first(caption, "p")? {
                Some(p) => element_text(tree, p),
                None => element_text(tree, caption),
            };
            let label_text = element_text(tree, label);
            let paragraph = caption_paragraph(tree, &label_text, &caption_text);
            tree.insert_before(table, paragraph);
            remove_all(tree, wrap, ".table-wrap-title")?;
        }
        Ok(())
    }

    fn preserve_figure_captions(&self, tree: &mut Tree) -> Result<()> {
        for wrap in tree.select(tree.root(), ".graphic-wrap")? {
            let label = tree.select_first(wrap, ".fig-label, .label")?;
            let caption = tree.select_first(wrap, ".fig-caption, .caption")?;
            let image = tree.select_first(wrap, "img")?;
            let (Some(label), Some(caption), Some(image)) = (label, caption, image) else {
                continue;
            };
            let label_text = element_text(tree, label);
            let caption_text = element_text(tree, caption);
            let paragraph = caption_paragraph(tree, &label_text, &caption_text);
            tree.insert_before(image, paragraph);
            remove_all(tree, wrap, ".graphic-bottom")?;
        }
        Ok(())
    }
}

/// `<p><strong>{label}</strong> {caption}</p>` (detached).
fn caption_paragraph(tree: &mut Tree, label: &str, caption: &str) -> NodeId {
    let paragraph = tree.create_element("p");
    let strong = tree.create_element("strong");
    tree.set_text(strong, label);
    tree.append(paragraph, strong);
    let rest = tree.create_text(&format!(" {caption}"));
    tree.append(paragraph, rest);
    paragraph
}

impl FormatExtractor for OupExtractor {
    fn format_id(&self) -> &'static str {
        "oup"
    }

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut footnotes = Vec::new();
        for element in tree.select(tree.root(), r#"[content-id^="fn"]"#)? {
            if !tree.is_attached(element) || tree.closest(element, TABLE_OR_FIGURE)?.is_some() {
                continue;
            }
            let Some(content_id) = tree.attr(element, "content-id").map(str::to_string) else {
                continue;
            };
            let Some(identifier) = FOOTNOTE_NUMBER
                .captures(&content_id)
                .map(|c| normalize_identifier(&c[1]))
            else {
                continue;
            };

            let clean = clone_and_clean(
                tree,
                element,
                &[r##"a[href*="#fn"]"##, ".footnote-label", ".label"],
            )?;
            let body = tree
                .select_first(clean, ".footnote-content p, p.footnote-compatibility, p")?
                .unwrap_or(clean);
            let content = element_html(tree, body);
            if content.is_empty() {
                continue;
            }
            let mut footnote = new_footnote(ids, &identifier, content, "oup");
            footnote.correlation_id = Some(content_id);
            footnotes.push(footnote);
            tree.detach(element);
        }

        for link in tree.select(tree.root(), FOOTNOTE_LINKS)? {
            let identifier = link_target(tree, link)
                .and_then(|target| FOOTNOTE_NUMBER.captures(target))
                .map(|c| normalize_identifier(&c[1]));
            if let Some(identifier) = identifier {
                simplify_marker(tree, link, &identifier);
            }
        }

        info!(count = footnotes.len(), "oup: footnotes extracted");
        Ok(footnotes)
    }

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let mut references: Vec<Reference> = Vec::new();
        let mut consumed = Vec::new();

        for item in tree.select(tree.root(), r#"[content-id^="bib"]"#)? {
            let full_text = element_text(tree, item);
            if full_text.chars().count() < 10 {
                continue;
            }
            let content_id = tree.attr(item, "content-id").unwrap_or_default().to_string();
            let content = escape_text(&full_text);
            match bibliography_keys(&full_text) {
                Some((keys, false)) => {
                    let id = keys[0].clone();
                    references.push(
                        Reference::resolved(id, content, full_text, "oup-bibliography", keys)
                            .with_correlation(content_id),
                    );
                }
                Some((_, true)) => references.push(
                    Reference::pending(content, full_text, "oup-bibliography-fallback")
                        .with_correlation(content_id),
                ),
                None => {
                    warn!(entry = %full_text, "oup: bibliography entry has no year");
                    continue;
                }
            }
            consumed.push(item);
        }

        for item in tree.select(tree.root(), ".js-splitview-ref-item")? {
            let full_text = element_text(tree, item);
            if full_text.chars().count() <= 10 || references.iter().any(|r| r.original_text == full_text) {
                continue;
            }
            references.push(Reference::pending(
                escape_text(&full_text),
                full_text,
                "oup-splitview",
            ));
            consumed.push(item);
        }

        for item in consumed {
            tree.detach(item);
        }
        info!(count = references.len(), "oup: references extracted");
        Ok(references)
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        let root = tree.root();
        remove_all(tree, root, ".table-modal")?;
        let sections = remove_sections_by_heading(tree, is_reference_section_heading)?;
        let statics = remove_static_content(tree)?;
        debug!(sections, statics, "oup: removed extracted sections");

        self.preserve_table_captions(tree)?;
        self.preserve_figure_captions(tree)?;
        remove_all(tree, root, UI_CHROME)?;
        unwrap_containers(tree, &[])?;

        for span in tree.select(tree.root(), "span.xrefLink")? {
            if tree.text_content(span).trim().is_empty() {
                tree.detach(span);
            }
        }
        Ok(())
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
