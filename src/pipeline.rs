//! The paste pipeline: sanitize, normalize, extract, transform, clean up,
//! append static sections, link.

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::dom::ops::{
    group_inline_elements, remove_empty_blocks, remove_static_content, strip_attributes,
    unwrap_bare_spans, STATIC_CONTENT_ATTR,
};
use crate::dom::{NodeId, Tree};
use crate::format_registry::FormatRegistry;
use crate::ids::IdMinter;
use crate::link::citations::finalize_references;
use crate::model::{Footnote, PasteResult, Reference};
use crate::normalize::normalize_tree;
use crate::sanitize::Sanitizer;

/// Ids starting with this prefix survive attribute stripping.
pub const DEFAULT_RESERVED_ID_PREFIX: &str = "pasted-";

/// Default node count at or below which a paste counts as small.
pub const DEFAULT_SMALL_PASTE_THRESHOLD: usize = 20;

/// Per-pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Fixed timestamp component for generated ids; current time when `None`
    pub id_stamp: Option<i64>,
    pub reserved_id_prefix: String,
    /// Only read by callers choosing between [`Pipeline::process`] and
    /// [`Pipeline::process_lite`]
    pub small_paste_threshold: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            id_stamp: None,
            reserved_id_prefix: DEFAULT_RESERVED_ID_PREFIX.to_string(),
            small_paste_threshold: DEFAULT_SMALL_PASTE_THRESHOLD,
        }
    }
}

/// Runs pastes through a registry's extractors.
pub struct Pipeline<'r> {
    registry: &'r FormatRegistry,
    sanitizer: Sanitizer,
    options: PipelineOptions,
}

impl<'r> Pipeline<'r> {
    pub fn new(registry: &'r FormatRegistry) -> Self {
        Self::with_options(registry, PipelineOptions::default())
    }

    pub fn with_options(registry: &'r FormatRegistry, options: PipelineOptions) -> Self {
        Self {
            registry,
            sanitizer: Sanitizer::new(),
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Normalize one paste.
    ///
    /// # Arguments
    /// * `markup` - Raw pasted HTML
    /// * `book_id` - Book the paste belongs to; prefixes every footnote id
    ///
    /// # Returns
    /// Cleaned markup with appended Notes/References sections, the extracted
    /// footnotes and references, and the detected format id. Fails only on an
    /// empty `book_id` or an internal selector error.
    pub fn process(&self, markup: &str, book_id: &str) -> Result<PasteResult> {
        if book_id.trim().is_empty() {
            bail!("bookId must not be empty");
        }

        let clean = self.sanitizer.clean(markup);
        let format_id = self.registry.detect(&clean);
        let mut extractor = self.registry.create(&format_id)?;

        let mut tree = Tree::parse(&clean);
        normalize_tree(&mut tree);

        let ids = IdMinter::new(book_id, self.options.id_stamp);
        let footnotes = dedupe_footnotes(extractor.extract_footnotes(&mut tree, &ids)?);
        let mut references = extractor.extract_references(&mut tree)?;
        extractor.transform_structure(&mut tree)?;

        self.cleanup(&mut tree)?;

        finalize_references(&mut references, &format_id, &ids);
        append_static_sections(&mut tree, &footnotes, &references);

        let citations = extractor.link_citations(&mut tree, &references)?;
        let markers = extractor.link_footnotes(&mut tree, &footnotes)?;

        info!(
            format = %format_id,
            footnotes = footnotes.len(),
            references = references.len(),
            citations,
            markers,
            "paste processed"
        );
        Ok(PasteResult {
            html: tree.to_html(),
            footnotes,
            references,
            format_id,
        })
    }

    /// Sanitize, normalize and clean up only; no extraction or linking.
    pub fn process_lite(&self, markup: &str, book_id: &str) -> Result<PasteResult> {
        if book_id.trim().is_empty() {
            bail!("bookId must not be empty");
        }

        let clean = self.sanitizer.clean(markup);
        let format_id = self.registry.detect(&clean);

        let mut tree = Tree::parse(&clean);
        normalize_tree(&mut tree);
        self.cleanup(&mut tree)?;

        debug!(format = %format_id, "paste processed without extraction");
        Ok(PasteResult {
            html: tree.to_html(),
            footnotes: Vec::new(),
            references: Vec::new(),
            format_id,
        })
    }

    fn cleanup(&self, tree: &mut Tree) -> Result<()> {
        let prefix = self.options.reserved_id_prefix.as_str();
        let root = tree.root();
        let statics = remove_static_content(tree)?;
        let empties = remove_empty_blocks(tree, prefix)?;
        strip_attributes(tree, prefix);
        unwrap_bare_spans(tree);
        tree.merge_adjacent_text(root);
        group_inline_elements(tree, root);
        debug!(statics, empties, "cleanup complete");
        Ok(())
    }
}

/// Keep one footnote per identifier; a later definition replaces an earlier one in place.
fn dedupe_footnotes(footnotes: Vec<Footnote>) -> Vec<Footnote> {
    let mut unique: Vec<Footnote> = Vec::with_capacity(footnotes.len());
    for footnote in footnotes {
        match unique
            .iter_mut()
            .find(|f| f.original_identifier == footnote.original_identifier)
        {
            Some(existing) => {
                warn!(identifier = %footnote.original_identifier, "duplicate footnote definition, keeping the last");
                *existing = footnote;
            }
            None => unique.push(footnote),
        }
    }
    unique
}

/// True when `rendered` already opens with `identifier` and no further digit.
fn starts_with_identifier(rendered: &str, identifier: &str) -> bool {
    rendered
        .trim_start()
        .strip_prefix(identifier)
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
}

fn static_element(tree: &mut Tree, tag: &str, section: &str, id: Option<&str>) -> NodeId {
    let mut attrs = vec![(STATIC_CONTENT_ATTR.to_string(), section.to_string())];
    if let Some(id) = id {
        attrs.push(("id".to_string(), id.to_string()));
    }
    let element = tree.create_element_with(tag, attrs);
    tree.append(tree.root(), element);
    element
}

/// Append the Notes and References sections.
fn append_static_sections(tree: &mut Tree, footnotes: &[Footnote], references: &[Reference]) {
    if !footnotes.is_empty() {
        let heading = static_element(tree, "h2", "footnotes", None);
        tree.set_text(heading, "Notes");
        for footnote in footnotes {
            let paragraph = static_element(tree, "p", "footnotes", Some(&footnote.footnote_id));
            for node in tree.append_html(paragraph, &footnote.content) {
                if tree.is_tag(node, "p") {
                    tree.unwrap(node);
                }
            }
            if !starts_with_identifier(&tree.text_content(paragraph), &footnote.original_identifier) {
                let number = tree.create_text(&format!("{}. ", footnote.original_identifier));
                match tree.first_child(paragraph) {
                    Some(first) => tree.insert_before(first, number),
                    None => tree.append(paragraph, number),
                }
            }
        }
    }

    if !references.is_empty() {
        let heading = static_element(tree, "h2", "bibliography", None);
        tree.set_text(heading, "References");
        for reference in references {
            let paragraph = static_element(tree, "p", "bibliography", Some(reference.id()));
            tree.append_html(paragraph, &reference.content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> PipelineOptions {
        PipelineOptions {
            id_stamp: Some(1000),
            ..PipelineOptions::default()
        }
    }

    fn footnote(identifier: &str, content: &str) -> Footnote {
        Footnote {
            footnote_id: format!("bFn1000{identifier}"),
            content: content.to_string(),
            original_identifier: identifier.to_string(),
            ref_id: format!("bFnref1000{identifier}"),
            kind: "test".to_string(),
            correlation_id: None,
        }
    }

    #[test]
    fn test_empty_book_id_is_rejected() {
        let registry = FormatRegistry::new();
        let pipeline = Pipeline::new(&registry);
        assert!(pipeline.process("<p>x</p>", "").is_err());
        assert!(pipeline.process_lite("<p>x</p>", "  ").is_err());
    }

    #[test]
    fn test_lite_sanitizes_and_cleans() {
        let registry = FormatRegistry::new();
        let pipeline = Pipeline::with_options(&registry, fixed());
        let result = pipeline
            .process_lite(
                r#"<div class="x"><span>Hi</span> “there”<script>alert(1)</script></div><p></p>"#,
                "b",
            )
            .unwrap();
        assert_eq!(result.html, r#"<div>Hi "there"</div>"#);
        assert!(result.footnotes.is_empty());
        assert!(result.references.is_empty());
        assert_eq!(result.format_id, "general");
    }

    #[test]
    fn test_reserved_ids_survive_cleanup() {
        let registry = FormatRegistry::new();
        let pipeline = Pipeline::with_options(&registry, fixed());
        let result = pipeline
            .process_lite(r#"<p id="pasted-1" class="c">a</p><p id="other">b</p>"#, "b")
            .unwrap();
        assert_eq!(result.html, r#"<p id="pasted-1">a</p><p>b</p>"#);
    }

    #[test]
    fn test_dedupe_keeps_last_in_place() {
        let footnotes = dedupe_footnotes(vec![
            footnote("1", "first"),
            footnote("2", "two"),
            footnote("1", "again"),
        ]);
        assert_eq!(footnotes.len(), 2);
        assert_eq!(footnotes[0].content, "again");
        assert_eq!(footnotes[1].original_identifier, "2");
    }

    #[test]
    fn test_starts_with_identifier() {
        assert!(starts_with_identifier("7. Already numbered", "7"));
        assert!(starts_with_identifier(" 7 body", "7"));
        assert!(!starts_with_identifier("70 items", "7"));
        assert!(!starts_with_identifier("Body", "7"));
    }

    #[test]
    fn test_static_sections_number_once() {
        let mut tree = Tree::parse("<p>Body</p>");
        append_static_sections(
            &mut tree,
            &[
                footnote("7", "<span>7</span>. Seen before."),
                footnote("8", "<p>Plain.</p>"),
            ],
            &[Reference::resolved(
                "smith2020".into(),
                "Smith, J. (2020).".into(),
                "Smith, J. (2020).".into(),
                "test",
                Vec::new(),
            )],
        );
        assert_eq!(
            tree.to_html(),
            concat!(
                "<p>Body</p>",
                r#"<h2 data-static-content="footnotes">Notes</h2>"#,
                r#"<p data-static-content="footnotes" id="bFn10007"><span>7</span>. Seen before.</p>"#,
                r#"<p data-static-content="footnotes" id="bFn10008">8. Plain.</p>"#,
                r#"<h2 data-static-content="bibliography">References</h2>"#,
                r#"<p data-static-content="bibliography" id="smith2020">Smith, J. (2020).</p>"#,
            )
        );
    }
}
