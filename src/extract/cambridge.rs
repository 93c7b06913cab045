// Cambridge University Press.
//
// In-text markers are `<a class="xref fn">` links wrapping a `<sup>`;
// definitions live in `<div id="reference-{n}-content">` blocks whose first
// paragraph opens with a `span.label` numeral.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info};

use super::{
    element_html, new_footnote, paragraph_references, simplify_marker, FormatExtractor, ParagraphScan,
};
use crate::dom::ops::{clone_and_clean, unwrap_containers};
use crate::dom::Tree;
use crate::ids::IdMinter;
use crate::model::{Footnote, Reference};

static CONTAINER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"reference-(\d+)-content").unwrap());

static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(references|bibliography|notes|footnotes|sources)$")
        .unwrap()
});

#[derive(Debug, Default)]
pub struct CambridgeExtractor;

impl CambridgeExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FormatExtractor for CambridgeExtractor {
    fn format_id(&self) -> &'static str {
        "cambridge"
    }

    fn extract_footnotes(&mut self, tree: &mut Tree, ids: &IdMinter) -> Result<Vec<Footnote>> {
        let mut simplified = 0;
        for link in tree.select(tree.root(), r##".xref.fn, a[href^="#fn"]"##)? {
            if !tree.is_attached(link) {
                continue;
            }
            let Some(sup) = tree.select_first(link, "sup")? else {
                continue;
            };
            let identifier = tree.text_content(sup).trim().to_string();
            if identifier.is_empty() {
                continue;
            }
            simplify_marker(tree, link, &identifier);
            simplified += 1;
        }

        let mut footnotes = Vec::new();
        for container in tree.select(tree.root(), r#"[id^="reference-"][id$="-content"]"#)? {
            let Some(identifier) = tree
                .attr(container, "id")
                .and_then(|id| CONTAINER_ID.captures(id))
                .map(|caps| caps[1].to_string())
            else {
                continue;
            };
            let Some(paragraph) = tree.select_first(container, "p")? else {
                debug!(identifier = %identifier, "cambridge: footnote container without paragraph");
                continue;
            };
            let clean = clone_and_clean(tree, paragraph, &["span.label"])?;
            let content = element_html(tree, clean);
            footnotes.push(new_footnote(ids, &identifier, content, "cambridge-normalized"));
            tree.detach(container);
        }

        info!(
            markers = simplified,
            count = footnotes.len(),
            "cambridge: footnotes extracted"
        );
        Ok(footnotes)
    }

    fn extract_references(&mut self, tree: &mut Tree) -> Result<Vec<Reference>> {
        let references = paragraph_references(
            tree,
            &ParagraphScan {
                heading: &SECTION_HEADING,
                kind: "cambridge-reference",
                split_breaks: false,
            },
        )?;
        info!(count = references.len(), "cambridge: references extracted");
        Ok(references)
    }

    fn transform_structure(&mut self, tree: &mut Tree) -> Result<()> {
        unwrap_containers(tree, &[])
    }

    fn allows_plain_text_markers(&self) -> bool {
        false
    }
}
