//! Content extraction
//!
//! One entry point, [`extract`], turns fetched HTML into an
//! [`ExtractedContent`]. Extraction is synchronous and CPU-bound; the parsed
//! document never crosses an `.await`.
//!
//! Title, metadata, links, media and schema data are read from the raw
//! document. Cleaning runs on a copy and only affects the main text and
//! markdown.

mod cleaning;
mod links;
mod markdown;
mod metadata;
mod schema;
mod structure;

use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::ExtractionOptions;

pub use cleaning::MAIN_CONTENT_SELECTORS;
pub use links::{extract_links, extract_media, MediaItem, MediaKind};
pub use markdown::html_to_markdown;
pub use metadata::{extract_metadata, extract_title, PageMetadata};
pub use schema::{apply_schema, ContainerSpec, ExtractionSchema, SchemaField, SchemaResult};
pub use structure::{analyze_structure, SelectorSuggestion, StructureAnalysis};

/// Everything extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub metadata: PageMetadata,
    pub links: Vec<String>,
    pub media: Vec<MediaItem>,
    /// Whitespace-normalized main text, capped at `text_limit` characters
    pub text: String,
    pub markdown: Option<String>,
    /// Schema output, present only when a schema was applied
    pub extracted_data: Option<Value>,
    /// Required schema fields that produced no value
    pub missing_required: Vec<String>,
    pub stats: ContentStats,
}

/// Size figures recorded for every extracted page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStats {
    /// Bytes of fetched HTML
    pub content_size: usize,
    /// Bytes of generated markdown
    pub markdown_size: usize,
    pub links_count: usize,
    pub media_count: usize,
}

/// Extracts content from an HTML page
///
/// # Arguments
///
/// * `html` - The fetched page body
/// * `base_url` - Final URL of the page, used to resolve relative references
/// * `options` - Output and cleaning flags
/// * `schema` - Optional declarative field schema
///
/// # Returns
///
/// Best-effort content; malformed HTML degrades to partial results instead of
/// failing.
///
/// # Example
///
/// ```
/// use smartscrape::config::ExtractionOptions;
/// use smartscrape::extract::extract;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let content = extract(html, &base_url, &ExtractionOptions::default(), None);
/// assert_eq!(content.title.as_deref(), Some("Test"));
/// assert_eq!(content.links, vec!["https://example.com/page"]);
/// ```
pub fn extract(
    html: &str,
    base_url: &Url,
    options: &ExtractionOptions,
    schema: Option<&ExtractionSchema>,
) -> ExtractedContent {
    let raw = Html::parse_document(html);

    let title = extract_title(&raw);
    let metadata = extract_metadata(&raw);

    let links = if options.extract_links {
        extract_links(&raw, base_url)
    } else {
        Vec::new()
    };

    let media = if options.extract_media {
        extract_media(&raw, base_url)
    } else {
        Vec::new()
    };

    let (extracted_data, missing_required) = match schema {
        Some(schema) => {
            let result = apply_schema(&raw, base_url, schema);
            (Some(result.data), result.missing_required)
        }
        None => (None, Vec::new()),
    };

    let mut cleaned = raw;
    cleaning::clean(&mut cleaned, options);
    let main = cleaning::main_content(&cleaned);

    let text = cleaning::truncate_chars(&cleaning::normalized_text(main), options.text_limit);

    let markdown = options
        .generate_markdown
        .then(|| html_to_markdown(&main.html()));

    let stats = ContentStats {
        content_size: html.len(),
        markdown_size: markdown.as_ref().map_or(0, String::len),
        links_count: links.len(),
        media_count: media.len(),
    };

    ExtractedContent {
        title,
        metadata,
        links,
        media,
        text,
        markdown,
        extracted_data,
        missing_required,
        stats,
    }
}
