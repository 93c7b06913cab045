//! Paste normalization for academic publisher HTML.
//!
//! Markup copied from a publisher page (Cambridge, OUP, Springer, ...) goes
//! through a fixed pipeline: sanitization, format detection, footnote and
//! bibliography extraction, structural cleanup, and linking of in-text
//! citations and footnote markers to canonical Notes/References sections.

pub mod db;
pub mod dom;
pub mod estimate;
pub mod extract;
pub mod format;
pub mod format_registry;
pub mod ids;
pub mod keys;
pub mod link;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod sanitize;
pub mod store;

use std::path::Path;

use anyhow::Result;

pub use format_registry::FormatRegistry;
pub use keys::generate_keys;
pub use pipeline::{Pipeline, PipelineOptions};
pub use store::{MemoryStore, PasteStore};

/// Process a paste with the built-in formats
///
/// # Arguments
/// * `markup` - Raw pasted HTML
/// * `book_id` - Book the paste belongs to (must not be empty)
/// * `options` - Id stamp and reserved id prefix
///
/// # Returns
/// `PasteResult` with the cleaned HTML, footnotes, references and format id
pub fn process_paste(markup: &str, book_id: &str, options: PipelineOptions) -> Result<model::PasteResult> {
    let registry = FormatRegistry::new();
    Pipeline::with_options(&registry, options).process(markup, book_id)
}

/// Sanitize and clean a paste without extraction or linking
pub fn process_paste_lite(
    markup: &str,
    book_id: &str,
    options: PipelineOptions,
) -> Result<model::PasteResult> {
    let registry = FormatRegistry::new();
    Pipeline::with_options(&registry, options).process_lite(markup, book_id)
}

/// Pick the lite pipeline for small pastes and the full one otherwise
///
/// The size check uses [`estimate::estimate_node_count`] against
/// `options.small_paste_threshold`.
pub fn process_paste_auto(
    markup: &str,
    book_id: &str,
    options: PipelineOptions,
) -> Result<model::PasteResult> {
    let count = estimate::estimate_node_count(markup);
    let small = estimate::is_small_paste(count, options.small_paste_threshold);
    tracing::debug!(count, small, "paste size estimated");
    let registry = FormatRegistry::new();
    let pipeline = Pipeline::with_options(&registry, options);
    if small {
        pipeline.process_lite(markup, book_id)
    } else {
        pipeline.process(markup, book_id)
    }
}

/// Detect the publisher format of a paste
///
/// Sanitizes first, as the pipeline does. Unrecognized markup yields
/// [`format_registry::FALLBACK_FORMAT`].
pub fn detect_format(markup: &str) -> String {
    let clean = sanitize::Sanitizer::new().clean(markup);
    FormatRegistry::new().detect(&clean)
}

/// Detect the publisher format and report which selectors matched
pub fn detect_format_verbose(markup: &str) -> model::DetectionReport {
    let clean = sanitize::Sanitizer::new().clean(markup);
    FormatRegistry::new().detect_verbose(&clean)
}

/// List the built-in formats in detection order
pub fn list_formats() -> Vec<model::FormatEntry> {
    FormatRegistry::new().entries()
}

/// Persist the footnotes and references of a result
///
/// # Arguments
/// * `db_path` - Database file; `None` uses [`db::get_db_path`]
pub fn save_result(book_id: &str, result: &model::PasteResult, db_path: Option<&Path>) -> Result<()> {
    let mut store = db::SqliteStore::open(db_path)?;
    store.save_result(book_id, result)?;
    tracing::info!(
        book = book_id,
        footnotes = result.footnotes.len(),
        references = result.references.len(),
        "paste records saved"
    );
    Ok(())
}

/// Load every stored footnote and reference of a book
pub fn load_book(book_id: &str, db_path: Option<&Path>) -> Result<model::StoredBook> {
    let store = db::SqliteStore::open(db_path)?;
    Ok(model::StoredBook {
        book_id: book_id.to_string(),
        footnotes: store.list_footnotes(book_id)?,
        references: store.list_references(book_id)?,
    })
}
