use serde::{Deserialize, Serialize};

/// An extracted footnote definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Footnote {
    pub footnote_id: String,
    /// Sanitized markup of the definition body
    pub content: String,
    /// Publisher's own marker text, e.g. "7"
    pub original_identifier: String,
    /// Id of the in-text back-reference `<sup>`
    pub ref_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// An extracted bibliography entry.
///
/// A reference is either finalized (`needs_key_generation == false`, id and
/// keys set) or pending (`needs_key_generation == true`, id absent, keys
/// empty). Use [`Reference::resolved`] and [`Reference::pending`] to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub reference_id: Option<String>,
    /// Sanitized markup of the entry
    pub content: String,
    /// Whitespace-collapsed plain text used for key generation
    pub original_text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ref_keys: Vec<String>,
    pub needs_key_generation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Reference {
    /// A reference whose id and keys are known at extraction time.
    pub fn resolved(
        reference_id: String,
        content: String,
        original_text: String,
        kind: &str,
        ref_keys: Vec<String>,
    ) -> Self {
        let ref_keys = if ref_keys.is_empty() {
            vec![reference_id.clone()]
        } else {
            ref_keys
        };
        Self {
            reference_id: Some(reference_id),
            content,
            original_text,
            kind: kind.to_string(),
            ref_keys,
            needs_key_generation: false,
            correlation_id: None,
        }
    }

    /// A reference whose keys are generated later by the shared linker.
    pub fn pending(content: String, original_text: String, kind: &str) -> Self {
        Self {
            reference_id: None,
            content,
            original_text,
            kind: kind.to_string(),
            ref_keys: Vec::new(),
            needs_key_generation: true,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Move a pending reference to the finalized state.
    pub fn finalize(&mut self, reference_id: String, ref_keys: Vec<String>) {
        self.ref_keys = if ref_keys.is_empty() {
            vec![reference_id.clone()]
        } else {
            ref_keys
        };
        self.reference_id = Some(reference_id);
        self.needs_key_generation = false;
    }

    /// The reference id, or an empty string while still pending.
    pub fn id(&self) -> &str {
        self.reference_id.as_deref().unwrap_or("")
    }
}

/// Output of one paste run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteResult {
    pub html: String,
    pub footnotes: Vec<Footnote>,
    pub references: Vec<Reference>,
    pub format_id: String,
}

/// Which selectors of one format matched during detection.
#[derive(Debug, Clone, Serialize)]
pub struct FormatMatch {
    pub format: String,
    pub priority: i32,
    pub matched_selectors: Vec<SelectorHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectorHit {
    pub selector: String,
    pub count: usize,
}

/// JSON output for verbose detection
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub detected: String,
    pub candidates: Vec<FormatMatch>,
}

/// JSON output for the formats command
#[derive(Debug, Serialize)]
pub struct FormatEntry {
    pub id: String,
    pub priority: i32,
    pub description: String,
    pub selectors: Vec<String>,
}

/// JSON output for the show command
#[derive(Debug, Serialize)]
pub struct StoredBook {
    pub book_id: String,
    pub footnotes: Vec<Footnote>,
    pub references: Vec<Reference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_reference_finalizes() {
        let mut reference = Reference::pending("<em>T</em>".into(), "Smith 2020 T".into(), "general");
        assert!(reference.needs_key_generation);
        assert!(reference.reference_id.is_none());
        reference.finalize("smith2020".into(), Vec::new());
        assert!(!reference.needs_key_generation);
        assert_eq!(reference.id(), "smith2020");
        assert_eq!(reference.ref_keys, vec!["smith2020"]);
    }

    #[test]
    fn test_footnote_serializes_camel_case() {
        let footnote = Footnote {
            footnote_id: "bFn11".into(),
            content: "Body".into(),
            original_identifier: "1".into(),
            ref_id: "bFnref11".into(),
            kind: "cambridge".into(),
            correlation_id: None,
        };
        let json = serde_json::to_value(&footnote).unwrap();
        assert_eq!(json["footnoteId"], "bFn11");
        assert_eq!(json["originalIdentifier"], "1");
        assert_eq!(json["type"], "cambridge");
        assert!(json.get("correlationId").is_none());
    }
}
