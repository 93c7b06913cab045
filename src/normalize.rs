use crate::dom::Tree;

/// Replace smart quotes and backticks with their ASCII counterparts.
pub fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            c => c,
        })
        .collect()
}

/// Replace non-breaking spaces with plain spaces.
pub fn normalize_spaces(text: &str) -> String {
    text.replace('\u{a0}', " ")
}

/// Full text normalization: quotes first, then spaces.
pub fn normalize_text(text: &str) -> String {
    normalize_spaces(&normalize_quotes(text))
}

/// Normalize every text node and attribute value in the tree, and collapse
/// `span.Apple-converted-space` artifacts into a single space.
pub fn normalize_tree(tree: &mut Tree) {
    let apple_spaces: Vec<_> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|&id| tree.is_tag(id, "span") && tree.has_class(id, "Apple-converted-space"))
        .collect();
    for span in apple_spaces {
        if tree.text_content(span).trim().is_empty() {
            let space = tree.create_text(" ");
            tree.replace(span, space);
        }
    }

    for id in tree.descendants(tree.root()) {
        if let Some(text) = tree.text(id) {
            let normalized = normalize_text(text);
            if normalized != text {
                tree.replace_text(id, &normalized);
            }
            continue;
        }
        let updates: Vec<(String, String)> = tree
            .attrs(id)
            .into_iter()
            .filter_map(|(k, v)| {
                let normalized = normalize_text(v);
                (normalized != v).then(|| (k.to_string(), normalized))
            })
            .collect();
        for (key, value) in updates {
            tree.set_attr(id, &key, &value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_quotes() {
        assert_eq!(
            normalize_quotes("\u{201C}It\u{2019}s `fine`\u{201D}"),
            "\"It's 'fine'\""
        );
    }

    #[test]
    fn test_normalize_spaces() {
        assert_eq!(normalize_spaces("a\u{a0}b"), "a b");
    }

    #[test]
    fn test_normalize_tree_apple_spaces() {
        let mut tree =
            Tree::parse("<p>one<span class=\"Apple-converted-space\">\u{a0}</span>two\u{a0}three</p>");
        normalize_tree(&mut tree);
        assert_eq!(tree.to_html(), "<p>one two three</p>");
    }

    #[test]
    fn test_normalize_tree_attributes() {
        let mut tree = Tree::parse("<a title=\"\u{2018}x\u{2019}\">y</a>");
        normalize_tree(&mut tree);
        assert_eq!(tree.to_html(), "<a title=\"'x'\">y</a>");
    }
}
