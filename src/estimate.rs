// Paste size estimation, used by callers to pick the full or lite pipeline.

use std::sync::LazyLock;

use regex::Regex;

use crate::dom::Tree;

static LOOKS_LIKE_HTML: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[a-zA-Z][^>]*>").unwrap());

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

const COUNTED_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "div", "pre", "blockquote", "li", "br",
];

/// Rough number of block-level nodes a paste will produce. Never less than 1.
pub fn estimate_node_count(content: &str) -> usize {
    let count = if LOOKS_LIKE_HTML.is_match(content) {
        html_node_count(content)
    } else {
        text_node_count(content)
    };
    count.max(1)
}

fn html_node_count(markup: &str) -> usize {
    let tree = Tree::parse(markup);
    let blocks = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|&id| tree.tag(id).is_some_and(|t| COUNTED_TAGS.contains(&t)))
        .count();
    let loose_text = tree
        .children(tree.root())
        .iter()
        .filter(|&&id| tree.text(id).is_some_and(|t| !t.trim().is_empty()))
        .count();
    blocks + loose_text
}

fn text_node_count(text: &str) -> usize {
    let paragraphs = BLANK_LINE
        .split(text)
        .filter(|p| !p.trim().is_empty())
        .count();
    if paragraphs > 1 {
        paragraphs
    } else {
        text.lines().filter(|l| !l.trim().is_empty()).count()
    }
}

/// `count <= threshold`
pub fn is_small_paste(count: usize, threshold: usize) -> bool {
    count <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_blocks_and_breaks() {
        assert_eq!(estimate_node_count("<p>a</p><p>b<br>c</p><ul><li>x</li></ul>"), 4);
        assert_eq!(estimate_node_count("<h2>T</h2>loose<div>d</div>"), 3);
    }

    #[test]
    fn test_plain_text_paragraphs_then_lines() {
        assert_eq!(estimate_node_count("one\n\ntwo\n\nthree"), 3);
        assert_eq!(estimate_node_count("one\ntwo\n\n"), 2);
        assert_eq!(estimate_node_count("a\nb\nc"), 3);
    }

    #[test]
    fn test_minimum_is_one() {
        assert_eq!(estimate_node_count(""), 1);
        assert_eq!(estimate_node_count("<span>x</span>"), 1);
    }

    #[test]
    fn test_small_paste_threshold() {
        assert!(is_small_paste(20, 20));
        assert!(!is_small_paste(21, 20));
    }
}
