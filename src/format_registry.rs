use crate::extract::{
    CambridgeExtractor, FormatExtractor, GeneralExtractor, OupExtractor, SageExtractor,
    ScienceDirectExtractor, SpringerExtractor, SubstackExtractor, TaylorFrancisExtractor, WileyExtractor,
};
use crate::dom::parse_selector;
use crate::model::{DetectionReport, FormatEntry, FormatMatch, SelectorHit};
use anyhow::{bail, Context, Result};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

/// Format id returned when no registered selector matches.
pub const FALLBACK_FORMAT: &str = "general";

/// Builds a fresh extractor for one paste run.
pub type ExtractorFactory = fn() -> Box<dyn FormatExtractor>;

/// Registration input for [`FormatRegistry::register`].
pub struct FormatDefinition {
    pub id: String,
    pub selectors: Vec<String>,
    pub priority: i32,
    pub description: String,
    pub factory: ExtractorFactory,
}

/// A registered format with its selectors compiled.
pub struct FormatDescriptor {
    pub id: String,
    pub selectors: Vec<String>,
    pub priority: i32,
    pub description: String,
    factory: ExtractorFactory,
    compiled: Vec<Selector>,
}

impl FormatDescriptor {
    /// Number of elements each selector matches in `document`, in selector order.
    fn hits(&self, document: &Html) -> Vec<SelectorHit> {
        self.selectors
            .iter()
            .zip(&self.compiled)
            .map(|(selector, compiled)| SelectorHit {
                selector: selector.clone(),
                count: document.select(compiled).count(),
            })
            .filter(|hit| hit.count > 0)
            .collect()
    }

    fn matches(&self, document: &Html) -> bool {
        self.compiled.is_empty() || self.compiled.iter().any(|s| document.select(s).next().is_some())
    }
}

/// Ordered set of format descriptors used for detection and extractor lookup.
///
/// Descriptors are kept sorted by descending priority; the selector-less
/// fallback always sorts after every other descriptor of equal priority.
pub struct FormatRegistry {
    descriptors: Vec<FormatDescriptor>,
}

fn definition(
    id: &str,
    selectors: &[&str],
    priority: i32,
    description: &str,
    factory: ExtractorFactory,
) -> FormatDefinition {
    FormatDefinition {
        id: id.to_string(),
        selectors: selectors.iter().map(|s| s.to_string()).collect(),
        priority,
        description: description.to_string(),
        factory,
    }
}

fn builtin_definitions() -> Vec<FormatDefinition> {
    vec![
        definition(
            "science-direct",
            &[
                r#"[data-xocs-content-id^="bib"]"#,
                ".anchor.anchor-primary[data-sd-ui-side-panel-opener]",
                r#"span.reference[id^="sref"]"#,
            ],
            10,
            "ScienceDirect (Elsevier)",
            || Box::new(ScienceDirectExtractor::new()),
        ),
        definition(
            "oup",
            &[
                r#"[content-id^="bib"]"#,
                ".js-splitview-ref-item",
                r#".footnote[content-id^="fn"]"#,
            ],
            9,
            "Oxford University Press (Oxford Academic)",
            || Box::new(OupExtractor::new()),
        ),
        definition(
            "springer",
            &[
                r#"[id^="ref-CR"]"#,
                ".c-article-references__text",
                r##"a[href*="#ref-CR"]"##,
            ],
            8,
            "Springer Nature",
            || Box::new(SpringerExtractor::new()),
        ),
        definition(
            "wiley",
            &["li[data-bib-id]", r#"a[href*="-bib-"]"#],
            7,
            "Wiley Online Library",
            || Box::new(WileyExtractor::new()),
        ),
        definition(
            "substack",
            &[
                r#"a[data-component-name="FootnoteAnchorToDOM"]"#,
                ".footnote-content",
            ],
            6,
            "Substack newsletters",
            || Box::new(SubstackExtractor::new()),
        ),
        definition(
            "cambridge",
            &[
                ".xref.fn",
                ".circle-list__item__grouped__content",
                r#"[id^="reference-"][id$="-content"]"#,
            ],
            5,
            "Cambridge University Press",
            || Box::new(CambridgeExtractor::new()),
        ),
        definition(
            "taylor-francis",
            &[".ref-lnk.lazy-ref.bibr", ".NLM_sec", ".hlFld-Abstract", r#"li[id^="CIT"]"#],
            4,
            "Taylor & Francis Online",
            || Box::new(TaylorFrancisExtractor::new()),
        ),
        definition(
            "sage",
            &[".citations", ".ref", r#"[role="listitem"]"#],
            1,
            "SAGE Journals",
            || Box::new(SageExtractor::new()),
        ),
        definition(
            FALLBACK_FORMAT,
            &[],
            0,
            "Generic heuristics for unrecognized markup",
            || Box::new(GeneralExtractor::new()),
        ),
    ]
}

impl FormatRegistry {
    /// Registry holding every built-in format.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for def in builtin_definitions() {
            if let Err(e) = registry.register(def) {
                warn!(error = %e, "built-in format failed to register");
            }
        }
        registry
    }

    /// Registry with no formats; [`detect`](Self::detect) falls back to
    /// [`FALLBACK_FORMAT`] until one is registered.
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// Add or replace a format.
    ///
    /// # Arguments
    /// * `def` - Format id, selectors, priority, description and factory
    ///
    /// # Returns
    /// An error, leaving the registry unchanged, when the id is empty, the
    /// priority is negative, the selector list is empty on a non-fallback
    /// priority, or a selector does not parse.
    pub fn register(&mut self, def: FormatDefinition) -> Result<()> {
        if def.id.trim().is_empty() {
            bail!("Format id must not be empty");
        }
        if def.priority < 0 {
            bail!("Format {} has negative priority {}", def.id, def.priority);
        }
        if def.selectors.is_empty() && def.priority != 0 {
            bail!(
                "Format {} has no selectors; only the priority-0 fallback may omit them",
                def.id
            );
        }
        let compiled = def
            .selectors
            .iter()
            .map(|s| parse_selector(s).with_context(|| format!("format {}", def.id)))
            .collect::<Result<Vec<_>>>()?;

        if let Some(pos) = self.descriptors.iter().position(|d| d.id == def.id) {
            warn!(format = %def.id, "overwriting registered format");
            self.descriptors.remove(pos);
        }
        debug!(format = %def.id, priority = def.priority, "registered format");
        self.descriptors.push(FormatDescriptor {
            id: def.id,
            selectors: def.selectors,
            priority: def.priority,
            description: def.description,
            factory: def.factory,
            compiled,
        });
        self.descriptors
            .sort_by_key(|d| (std::cmp::Reverse(d.priority), d.compiled.is_empty()));
        Ok(())
    }

    /// Id of the highest-priority format with a matching selector.
    /// Never fails; unrecognized markup resolves to [`FALLBACK_FORMAT`].
    pub fn detect(&self, markup: &str) -> String {
        let document = Html::parse_fragment(markup);
        let detected = self
            .descriptors
            .iter()
            .find(|d| d.matches(&document))
            .map_or(FALLBACK_FORMAT, |d| d.id.as_str());
        info!(format = detected, "format detected");
        detected.to_string()
    }

    /// Detection with the per-format selector hits that led to it.
    pub fn detect_verbose(&self, markup: &str) -> DetectionReport {
        let document = Html::parse_fragment(markup);
        let mut detected: Option<String> = None;
        let mut candidates = Vec::new();
        for descriptor in &self.descriptors {
            let hits = descriptor.hits(&document);
            let matched = descriptor.compiled.is_empty() || !hits.is_empty();
            if matched && detected.is_none() {
                detected = Some(descriptor.id.clone());
            }
            if !hits.is_empty() {
                candidates.push(FormatMatch {
                    format: descriptor.id.clone(),
                    priority: descriptor.priority,
                    matched_selectors: hits,
                });
            }
        }
        DetectionReport {
            detected: detected.unwrap_or_else(|| FALLBACK_FORMAT.to_string()),
            candidates,
        }
    }

    /// Build the extractor registered under `id`.
    pub fn create(&self, id: &str) -> Result<Box<dyn FormatExtractor>> {
        match self.descriptors.iter().find(|d| d.id == id) {
            Some(descriptor) => Ok((descriptor.factory)()),
            None => bail!("Unknown format: {}", id),
        }
    }

    /// Registered descriptors in detection order.
    pub fn descriptors(&self) -> &[FormatDescriptor] {
        &self.descriptors
    }

    /// Serializable summary of the registered formats.
    pub fn entries(&self) -> Vec<FormatEntry> {
        self.descriptors
            .iter()
            .map(|d| FormatEntry {
                id: d.id.clone(),
                priority: d.priority,
                description: d.description.clone(),
                selectors: d.selectors.clone(),
            })
            .collect()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let registry = FormatRegistry::new();
        let ids: Vec<&str> = registry.descriptors().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "science-direct",
                "oup",
                "springer",
                "wiley",
                "substack",
                "cambridge",
                "taylor-francis",
                "sage",
                "general"
            ]
        );
    }

    #[test]
    fn test_detect_falls_back_to_general() {
        let registry = FormatRegistry::new();
        assert_eq!(registry.detect("<p>hello</p>"), "general");
        assert_eq!(registry.detect(""), "general");
        assert_eq!(FormatRegistry::empty().detect("<p>x</p>"), "general");
    }

    #[test]
    fn test_detect_publishers() {
        let registry = FormatRegistry::new();
        assert_eq!(
            registry.detect(r#"<p>Text<a class="xref fn"><sup>1</sup></a></p>"#),
            "cambridge"
        );
        assert_eq!(
            registry.detect(r#"<div content-id="bib1">Cribb, J. (2016).</div>"#),
            "oup"
        );
        assert_eq!(registry.detect(r#"<li data-bib-id="b1">x</li>"#), "wiley");
    }

    #[test]
    fn test_higher_priority_wins() {
        let registry = FormatRegistry::new();
        let markup = r#"<div class="ref">x</div><li id="ref-CR1">y</li>"#;
        assert_eq!(registry.detect(markup), "springer");
        let report = registry.detect_verbose(markup);
        assert_eq!(report.detected, "springer");
        let formats: Vec<&str> = report.candidates.iter().map(|c| c.format.as_str()).collect();
        assert_eq!(formats, vec!["springer", "sage"]);
        assert_eq!(report.candidates[0].matched_selectors[0].count, 1);
    }

    #[test]
    fn test_register_validation() {
        let mut registry = FormatRegistry::new();
        let bad_priority = definition("x", &[".x"], -1, "", || Box::new(GeneralExtractor::new()));
        assert!(registry.register(bad_priority).is_err());
        let no_selectors = definition("x", &[], 3, "", || Box::new(GeneralExtractor::new()));
        assert!(registry.register(no_selectors).is_err());
        let bad_selector = definition("x", &["[[["], 3, "", || Box::new(GeneralExtractor::new()));
        assert!(registry.register(bad_selector).is_err());
        assert_eq!(registry.descriptors().len(), 9);
    }

    #[test]
    fn test_register_overwrites() {
        let mut registry = FormatRegistry::new();
        registry
            .register(definition("sage", &[".custom-sage"], 20, "override", || {
                Box::new(SageExtractor::new())
            }))
            .unwrap();
        assert_eq!(registry.descriptors().len(), 9);
        assert_eq!(registry.descriptors()[0].id, "sage");
        assert_eq!(registry.detect(r#"<p class="custom-sage">x</p>"#), "sage");
    }

    #[test]
    fn test_create() {
        let registry = FormatRegistry::new();
        assert_eq!(registry.create("oup").unwrap().format_id(), "oup");
        assert!(registry.create("nope").is_err());
    }
}
