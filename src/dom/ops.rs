// Structural helpers shared by the pipeline and the format extractors.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use super::{NodeId, Tree};

/// Block tags that end a run of loose inline content inside a container.
const WRAP_BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "ul", "ol", "li", "pre", "div", "table",
    "figure",
];

/// Block tags recognized when grouping top-level inline content.
const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "div", "blockquote", "ul", "ol", "li", "pre", "table",
    "figure", "section", "article", "header", "footer",
];

/// Containers removed by [`unwrap_containers`].
const CONTAINER_SELECTOR: &str = "div, article, section, main, header, footer, aside, nav, button";

/// Attribute marking appended Notes/References sections.
pub const STATIC_CONTENT_ATTR: &str = "data-static-content";

static REFERENCE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(references|bibliography|works cited|sources|literature cited|notes|footnotes|endnotes)$",
    )
    .unwrap()
});

pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

/// True when a heading's text denotes a references/notes section.
pub fn is_reference_section_heading(text: &str) -> bool {
    REFERENCE_HEADING.is_match(text.trim())
}

/// Wrap runs of loose inline nodes directly under `container` into `<p>` elements.
///
/// Whitespace-only text nodes never start a wrapper.
pub fn wrap_loose_nodes(tree: &mut Tree, container: NodeId) {
    let children = tree.children(container);
    let mut wrapper: Option<NodeId> = None;
    for child in children {
        let is_block = tree
            .tag(child)
            .is_some_and(|t| WRAP_BLOCK_TAGS.contains(&t));
        if is_block {
            wrapper = None;
            continue;
        }
        if tree.text(child).is_some_and(|t| t.trim().is_empty()) {
            continue;
        }
        let target = match wrapper {
            Some(w) => w,
            None => {
                let p = tree.create_element("p");
                tree.insert_before(child, p);
                wrapper = Some(p);
                p
            }
        };
        tree.append(target, child);
    }
}

/// Group consecutive top-level inline elements and text into `<p>` wrappers.
pub fn group_inline_elements(tree: &mut Tree, container: NodeId) {
    let children = tree.children(container);
    let has_loose_inline = children
        .iter()
        .any(|&c| tree.tag(c).is_some_and(|t| !is_block_tag(t)));
    if !has_loose_inline {
        return;
    }

    let mut wrapper: Option<NodeId> = None;
    for child in children {
        let loose_inline = tree.tag(child).is_some_and(|t| !is_block_tag(t));
        let text_with_content = tree.text(child).is_some_and(|t| !t.trim().is_empty());
        if loose_inline || text_with_content {
            let target = match wrapper {
                Some(w) => w,
                None => {
                    let p = tree.create_element("p");
                    tree.insert_before(child, p);
                    wrapper = Some(p);
                    p
                }
            };
            tree.append(target, child);
        } else if tree.is_element(child) {
            wrapper = None;
        }
    }
}

/// Remove block elements with no text, no image and no anchor carrying `reserved_prefix`.
pub fn remove_empty_blocks(tree: &mut Tree, reserved_prefix: &str) -> Result<usize> {
    let reserved_anchor = format!("a[id^=\"{reserved_prefix}\"]");
    let mut removed = 0;
    for block in tree.select(tree.root(), "p, blockquote, h1, h2, h3, li")? {
        if !tree.is_attached(block) || !tree.text_content(block).trim().is_empty() {
            continue;
        }
        if tree.select_first(block, "img")?.is_some()
            || tree.select_first(block, &reserved_anchor)?.is_some()
        {
            continue;
        }
        tree.detach(block);
        removed += 1;
    }
    Ok(removed)
}

/// Strip style, class, `data-node-id` and any id not starting with `reserved_prefix`.
pub fn strip_attributes(tree: &mut Tree, reserved_prefix: &str) {
    for id in tree.descendants(tree.root()) {
        tree.retain_attrs(id, |name, value| match name {
            "style" | "class" | "data-node-id" => false,
            "id" => !reserved_prefix.is_empty() && value.starts_with(reserved_prefix),
            _ => true,
        });
    }
}

/// Unwrap `<span>` elements that carry no attributes.
pub fn unwrap_bare_spans(tree: &mut Tree) {
    let spans: Vec<NodeId> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|&id| tree.is_tag(id, "span") && tree.attrs(id).is_empty())
        .collect();
    for span in spans.into_iter().rev() {
        tree.unwrap(span);
    }
}

/// Unwrap generic containers (plus `extra` selectors), innermost first.
///
/// Loose inline content in each container is wrapped in `<p>` before the
/// container is dissolved, so bare text is never dropped or merged into a
/// neighbouring block.
pub fn unwrap_containers(tree: &mut Tree, extra: &[&str]) -> Result<()> {
    let mut selector = CONTAINER_SELECTOR.to_string();
    for sel in extra {
        selector.push_str(", ");
        selector.push_str(sel);
    }
    let containers = tree.select(tree.root(), &selector)?;
    for container in containers.into_iter().rev() {
        wrap_loose_nodes(tree, container);
        tree.unwrap(container);
    }
    for font in tree.select(tree.root(), "font")? {
        tree.unwrap(font);
    }
    Ok(())
}

/// Remove each heading matching `is_match` together with the following
/// element siblings up to the next heading.
pub fn remove_sections_by_heading(tree: &mut Tree, is_match: impl Fn(&str) -> bool) -> Result<usize> {
    let mut removed = 0;
    for heading in tree.select(tree.root(), "h1, h2, h3, h4, h5, h6")? {
        if !tree.is_attached(heading) || !is_match(tree.text_content(heading).trim()) {
            continue;
        }
        let mut next = tree.next_element_sibling(heading);
        tree.detach(heading);
        removed += 1;
        while let Some(node) = next {
            if tree.is_heading(node) {
                break;
            }
            next = tree.next_element_sibling(node);
            tree.detach(node);
        }
    }
    Ok(removed)
}

/// Remove previously appended static sections.
pub fn remove_static_content(tree: &mut Tree) -> Result<usize> {
    let nodes = tree.select(tree.root(), "[data-static-content]")?;
    let count = nodes.len();
    for node in nodes {
        tree.detach(node);
    }
    Ok(count)
}

/// Deep-clone `element`, strip inline styles, and remove `remove` selectors from the copy.
pub fn clone_and_clean(tree: &mut Tree, element: NodeId, remove: &[&str]) -> Result<NodeId> {
    let clone = tree.clone_subtree(element);
    tree.remove_attr(clone, "style");
    for id in tree.descendants(clone) {
        tree.remove_attr(id, "style");
    }
    if !remove.is_empty() {
        for node in tree.select(clone, &remove.join(", "))? {
            tree.detach(node);
        }
    }
    Ok(clone)
}

/// Remove every match of `selector` below `scope`.
pub fn remove_all(tree: &mut Tree, scope: NodeId, selector: &str) -> Result<usize> {
    let nodes = tree.select(scope, selector)?;
    let count = nodes.len();
    for node in nodes {
        tree.detach(node);
    }
    Ok(count)
}

/// Remove the leading text of `element` up to and including `len` bytes of its
/// text content, walking text nodes in document order.
pub fn trim_leading_text(tree: &mut Tree, element: NodeId, mut len: usize) {
    for text_node in tree.text_nodes(element) {
        if len == 0 {
            break;
        }
        let Some(text) = tree.text(text_node).map(str::to_string) else {
            continue;
        };
        if text.len() <= len {
            len -= text.len();
            tree.replace_text(text_node, "");
        } else {
            let mut cut = len;
            while !text.is_char_boundary(cut) {
                cut += 1;
            }
            tree.replace_text(text_node, &text[cut..]);
            len = 0;
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
