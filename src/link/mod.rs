//! Shared linking passes: in-text citations and footnote markers.

pub mod citations;
pub mod footnotes;

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::dom::{NodeId, Tree};

/// Class carried by every canonical citation link.
pub const CITATION_CLASS: &str = "in-text-citation";

/// Class carried by every canonical footnote anchor.
pub const FOOTNOTE_CLASS: &str = "footnote-ref";

static FRAGMENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][\w-]*$").unwrap());

/// The fragment of an href (`#ref7` or `https://host/page#ref7`) when it is a
/// plain element id.
pub fn href_fragment(href: &str) -> Option<String> {
    let fragment = if let Some(local) = href.strip_prefix('#') {
        local.to_string()
    } else {
        match Url::parse(href) {
            Ok(url) => url.fragment()?.to_string(),
            Err(_) => href.rsplit_once('#')?.1.to_string(),
        }
    };
    FRAGMENT_ID.is_match(&fragment).then_some(fragment)
}

/// Build `<a href="#{reference_id}" class="in-text-citation">{text}</a>` (detached).
pub fn citation_anchor(tree: &mut Tree, reference_id: &str, text: &str) -> NodeId {
    let anchor = tree.create_element_with(
        "a",
        vec![
            ("href".to_string(), format!("#{reference_id}")),
            ("class".to_string(), CITATION_CLASS.to_string()),
        ],
    );
    tree.set_text(anchor, text);
    anchor
}

/// Build the canonical footnote marker (detached):
/// `<sup id="{ref_id}" fn-count-id="{n}"><a href="#{footnote_id}" class="footnote-ref">{n}</a></sup>`.
pub fn footnote_marker(tree: &mut Tree, identifier: &str, footnote_id: &str, ref_id: &str) -> NodeId {
    let sup = tree.create_element_with(
        "sup",
        vec![
            ("id".to_string(), ref_id.to_string()),
            ("fn-count-id".to_string(), identifier.to_string()),
        ],
    );
    let anchor = tree.create_element_with(
        "a",
        vec![
            ("href".to_string(), format!("#{footnote_id}")),
            ("class".to_string(), FOOTNOTE_CLASS.to_string()),
        ],
    );
    tree.set_text(anchor, identifier);
    tree.append(sup, anchor);
    sup
}

/// True when `sup` already has the canonical marker shape.
pub fn is_canonical_marker(tree: &Tree, sup: NodeId) -> bool {
    let children = tree.element_children(sup);
    tree.has_attr(sup, "id")
        && tree.has_attr(sup, "fn-count-id")
        && children.len() == 1
        && tree.is_tag(children[0], "a")
        && tree.has_class(children[0], FOOTNOTE_CLASS)
}

/// Parsed pieces of a publisher citation link, used by [`reformat_citation_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationParts {
    pub author: String,
    pub year: String,
    pub trailing: String,
    pub narrative: bool,
}

/// Rewrite a publisher citation anchor so that only the year is linked.
///
/// Narrative citations become `Author (<a>Year</a>)`; parenthetical ones keep
/// the author text and any trailing text (page numbers, suffixes) outside the
/// link.
pub fn reformat_citation_link(tree: &mut Tree, anchor: NodeId, reference_id: &str, parts: &CitationParts) {
    tree.set_attr(anchor, "href", &format!("#{reference_id}"));
    tree.set_attr(anchor, "class", CITATION_CLASS);
    tree.set_text(anchor, &parts.year);

    let author = parts.author.trim();
    if parts.narrative {
        let before = if author.is_empty() {
            "(".to_string()
        } else {
            format!("{author} (")
        };
        let before = tree.create_text(&before);
        tree.insert_before(anchor, before);
        let after = tree.create_text(")");
        tree.insert_after(anchor, after);
    } else {
        if !author.is_empty() {
            let before = if author.ends_with('(') {
                author.to_string()
            } else {
                format!("{author} ")
            };
            let before = tree.create_text(&before);
            tree.insert_before(anchor, before);
        }
        if !parts.trailing.is_empty() {
            let after = tree.create_text(&parts.trailing);
            tree.insert_after(anchor, after);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_href_fragment() {
        assert_eq!(href_fragment("#ref7"), Some("ref7".to_string()));
        assert_eq!(
            href_fragment("https://example.com/page#ref-CR75"),
            Some("ref-CR75".to_string())
        );
        assert_eq!(href_fragment("#"), None);
        assert_eq!(href_fragment("https://example.com/page"), None);
        assert_eq!(href_fragment("#1bad"), None);
    }

    #[test]
    fn test_footnote_marker_shape() {
        let mut tree = Tree::new();
        let sup = footnote_marker(&mut tree, "3", "bFn13", "bFnref13");
        tree.append(tree.root(), sup);
        assert_eq!(
            tree.to_html(),
            r##"<sup id="bFnref13" fn-count-id="3"><a href="#bFn13" class="footnote-ref">3</a></sup>"##
        );
        assert!(is_canonical_marker(&tree, sup));
    }

    #[test]
    fn test_reformat_narrative_citation() {
        let mut tree = Tree::parse(r##"<p>As <a href="#x">Lincoln (1854)</a> said</p>"##);
        let a = tree.select_first(tree.root(), "a").unwrap().unwrap();
        let parts = CitationParts {
            author: "Lincoln".into(),
            year: "1854".into(),
            trailing: String::new(),
            narrative: true,
        };
        reformat_citation_link(&mut tree, a, "lincoln1854", &parts);
        assert_eq!(
            tree.to_html(),
            r##"<p>As Lincoln (<a href="#lincoln1854" class="in-text-citation">1854</a>) said</p>"##
        );
    }

    #[test]
    fn test_reformat_parenthetical_citation() {
        let mut tree = Tree::parse(r##"<p>(<a href="#x">Lincoln, 1854: 3</a>)</p>"##);
        let a = tree.select_first(tree.root(), "a").unwrap().unwrap();
        let parts = CitationParts {
            author: "Lincoln,".into(),
            year: "1854".into(),
            trailing: ": 3".into(),
            narrative: false,
        };
        reformat_citation_link(&mut tree, a, "lincoln1854", &parts);
        assert_eq!(
            tree.to_html(),
            r##"<p>(Lincoln, <a href="#lincoln1854" class="in-text-citation">1854</a>: 3)</p>"##
        );
    }
}
