use ammonia::Builder;

/// Extra tags that publisher markup relies on for structure detection.
const EXTRA_TAGS: &[&str] = &["section", "main", "article", "aside", "font", "button"];

/// Attributes kept on every element; publisher correlation ids live here.
const GENERIC_ATTRIBUTES: &[&str] = &[
    "class",
    "id",
    "role",
    "name",
    "content-id",
    "reveal-id",
    "fn-count-id",
];

/// Allow-list sanitizer run on every paste before a tree is built.
pub struct Sanitizer {
    builder: Builder<'static>,
}

impl Sanitizer {
    pub fn new() -> Self {
        let mut builder = Builder::default();
        builder
            .add_tags(EXTRA_TAGS)
            .add_generic_attributes(GENERIC_ATTRIBUTES)
            .add_generic_attribute_prefixes(&["data-"])
            .link_rel(None);
        Self { builder }
    }

    /// Return safe markup: scripts, event handlers and unknown tags removed.
    pub fn clean(&self, markup: &str) -> String {
        self.builder.clean(markup).to_string()
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts_and_handlers() {
        let sanitizer = Sanitizer::new();
        let out = sanitizer.clean(r#"<p onclick="x()">Hi<script>alert(1)</script></p>"#);
        assert_eq!(out, "<p>Hi</p>");
    }

    #[test]
    fn test_keeps_publisher_attributes() {
        let sanitizer = Sanitizer::new();
        let out = sanitizer.clean(
            r##"<div id="reference-1-content" class="fn" content-id="bib1" data-xml-rid="bibr1"><a href="#fn1">1</a></div>"##,
        );
        assert!(out.contains(r#"id="reference-1-content""#));
        assert!(out.contains(r#"content-id="bib1""#));
        assert!(out.contains(r#"data-xml-rid="bibr1""#));
        assert!(out.contains(r##"href="#fn1""##));
        assert!(!out.contains("rel="));
    }
}
