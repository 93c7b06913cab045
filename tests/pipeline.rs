use paste_normalizer::{
    detect_format, generate_keys, load_book, process_paste, process_paste_auto, save_result,
    FormatRegistry, Pipeline, PipelineOptions,
};

const CAMBRIDGE_FOOTNOTE: &str = include_str!("fixtures/cambridge_footnote.html");
const CAMBRIDGE_NUMBERED: &str = include_str!("fixtures/cambridge_numbered.html");
const OUP_BIBLIOGRAPHY: &str = include_str!("fixtures/oup_bibliography.html");
const GENERAL_BIBLIOGRAPHY: &str = include_str!("fixtures/general_bibliography.html");

fn options() -> PipelineOptions {
    PipelineOptions {
        id_stamp: Some(1000),
        ..PipelineOptions::default()
    }
}

#[test]
fn test_cambridge_footnote_end_to_end() {
    let result = process_paste(CAMBRIDGE_FOOTNOTE, "book", options()).unwrap();

    assert_eq!(result.format_id, "cambridge");
    assert_eq!(result.footnotes.len(), 1);
    let footnote = &result.footnotes[0];
    assert_eq!(footnote.original_identifier, "1");
    assert_eq!(footnote.content, "Footnote body.");
    assert_eq!(footnote.footnote_id, "bookFn10001");
    assert_eq!(footnote.ref_id, "bookFnref10001");

    assert!(result.html.contains(r#"<sup id="bookFnref10001" fn-count-id="1">"#));
    assert!(result.html.contains(r##"<a href="#bookFn10001" class="footnote-ref">1</a>"##));
    assert!(result.html.contains(r#"id="bookFn10001">1. Footnote body.</p>"#));
    assert!(!result.html.contains("reference-1-content"));
}

#[test]
fn test_reprocessing_does_not_duplicate_static_sections() {
    let first = process_paste(CAMBRIDGE_FOOTNOTE, "book", options()).unwrap();
    let second = process_paste(&first.html, "book", options()).unwrap();

    assert_eq!(second.html.matches("Notes</h2>").count(), 1);
    assert_eq!(second.footnotes.len(), 1);
    assert_eq!(second.footnotes[0].content, "Footnote body.");
    assert_eq!(second.html.matches("Footnote body.").count(), 1);
}

#[test]
fn test_numbered_content_is_not_numbered_twice() {
    let result = process_paste(CAMBRIDGE_NUMBERED, "book", options()).unwrap();

    assert_eq!(result.footnotes.len(), 1);
    assert!(result
        .html
        .contains(r#"id="bookFn10007">7. Already numbered in the source.</p>"#));
    assert!(!result.html.contains("7. 7."));
    assert!(result.html.contains(r##"<a href="#bookFn10007" class="footnote-ref">7</a>"##));
}

#[test]
fn test_oup_bibliography_resolves_and_links() {
    let result = process_paste(OUP_BIBLIOGRAPHY, "book", options()).unwrap();

    assert_eq!(result.format_id, "oup");
    assert_eq!(result.references.len(), 1);
    let reference = &result.references[0];
    assert_eq!(reference.reference_id.as_deref(), Some("cribb2016"));
    assert!(!reference.needs_key_generation);

    assert_eq!(result.html.matches("References</h2>").count(), 1);
    assert!(result.html.contains(r#"id="cribb2016""#));
    assert!(result
        .html
        .contains(r##"Cribb (<a href="#cribb2016" class="in-text-citation">2016</a>)"##));
}

#[test]
fn test_general_trailing_bibliography() {
    let result = process_paste(GENERAL_BIBLIOGRAPHY, "book", options()).unwrap();

    assert_eq!(result.format_id, "general");
    assert_eq!(result.references.len(), 2);
    assert!(result
        .references
        .iter()
        .all(|r| !r.needs_key_generation && !r.ref_keys.is_empty()));
    assert!(!result
        .references
        .iter()
        .any(|r| r.original_text.contains("see 2017")));
    assert!(result.html.contains("(see 2017: 143)"));

    let mirza = &result.references[0];
    assert!(mirza.ref_keys.contains(&"mirza-davies2015".to_string()));
    assert!(mirza.ref_keys.contains(&"mirzadavies2015".to_string()));

    let smith = &result.references[1];
    assert!(smith.ref_keys.contains(&"smith2020".to_string()));
    assert!(result.html.contains(&format!(r##"href="#{}""##, smith.id())));
    assert!(result.html.contains(&format!(r##"href="#{}""##, mirza.id())));
}

#[test]
fn test_accented_author_citation_is_linked() {
    let markup = "<p>As shown (García, 2018).</p><h2>References</h2>\
                  <p>García, M. (2018). Título del libro. Madrid.</p>";
    let result = process_paste(markup, "book", options()).unwrap();

    assert_eq!(result.references.len(), 1);
    let reference = &result.references[0];
    assert!(reference.ref_keys.contains(&"garcía2018".to_string()));
    assert!(result
        .html
        .contains(&format!(r##"href="#{}""##, reference.id())));
}

#[test]
fn test_organization_author_without_heading() {
    let markup = "<p>Reports agree (WHO 2019).</p>\
                  <p>World Health Organization (2019). Global report on health. Geneva.</p>";
    let result = process_paste(markup, "book", options()).unwrap();

    assert_eq!(result.format_id, "general");
    assert_eq!(result.references.len(), 1);
    let reference = &result.references[0];
    assert!(reference.original_text.starts_with("World Health Organization"));
    assert!(reference.ref_keys.contains(&"who2019".to_string()));
    assert!(result.html.contains("Reports agree ("));
    assert!(result
        .html
        .contains(&format!(r##"href="#{}""##, reference.id())));
}

#[test]
fn test_citation_and_reference_share_a_key() {
    let reference = generate_keys("Smith, J. (2020). Title.", "", "general");
    let citation = generate_keys("(Smith, 2020)", "", "general");
    assert!(reference.iter().any(|k| citation.contains(k)));

    let hyphenated = generate_keys("Mirza-Davies, 2015", "", "general");
    assert!(hyphenated.contains(&"mirza-davies2015".to_string()));
    assert!(hyphenated.contains(&"mirzadavies2015".to_string()));
}

#[test]
fn test_unrecognized_markup_detects_general() {
    assert_eq!(detect_format("<p>hello</p>"), "general");
    assert_eq!(detect_format(""), "general");
}

#[test]
fn test_auto_uses_lite_for_small_pastes() {
    let small = process_paste_auto(CAMBRIDGE_FOOTNOTE, "book", options()).unwrap();
    assert!(small.footnotes.is_empty());
    assert!(!small.html.contains("<script"));

    let full = process_paste_auto(
        CAMBRIDGE_FOOTNOTE,
        "book",
        PipelineOptions {
            small_paste_threshold: 0,
            ..options()
        },
    )
    .unwrap();
    assert_eq!(full.footnotes.len(), 1);
}

#[test]
fn test_pipeline_reuses_registry() {
    let registry = FormatRegistry::new();
    let pipeline = Pipeline::with_options(&registry, options());
    let first = pipeline.process(CAMBRIDGE_FOOTNOTE, "a").unwrap();
    let second = pipeline.process(CAMBRIDGE_FOOTNOTE, "b").unwrap();
    assert_eq!(first.footnotes[0].footnote_id, "aFn10001");
    assert_eq!(second.footnotes[0].footnote_id, "bFn10001");
}

#[test]
fn test_saved_records_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let result = process_paste(OUP_BIBLIOGRAPHY, "book", options()).unwrap();

    save_result("book", &result, Some(&path)).unwrap();
    save_result("book", &result, Some(&path)).unwrap();

    let stored = load_book("book", Some(&path)).unwrap();
    assert_eq!(stored.references, result.references);
    assert!(stored.footnotes.is_empty());
    assert!(load_book("other", Some(&path)).unwrap().references.is_empty());
}
