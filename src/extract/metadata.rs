use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Page metadata: meta tags and JSON-LD blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// `name`/`property`/`http-equiv` mapped to `content`
    pub meta: BTreeMap<String, String>,

    /// Every parsed JSON-LD object; top-level arrays are flattened
    pub json_ld: Vec<Value>,
}

/// Resolves the page title: `<title>`, then the first `<h1>`, then `og:title`
pub fn extract_title(document: &Html) -> Option<String> {
    first_text(document, "title")
        .or_else(|| first_text(document, "h1"))
        .or_else(|| {
            let selector = Selector::parse("meta[property='og:title']").ok()?;
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("content"))
                .map(|c| c.trim().to_string())
                .find(|c| !c.is_empty())
        })
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| {
            el.text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
}

/// Collects meta tags and JSON-LD blocks
pub fn extract_metadata(document: &Html) -> PageMetadata {
    let mut metadata = PageMetadata::default();

    if let Ok(selector) = Selector::parse("meta[content]") {
        for element in document.select(&selector) {
            let value = element.value();
            let key = value
                .attr("name")
                .or_else(|| value.attr("property"))
                .or_else(|| value.attr("http-equiv"));

            if let (Some(key), Some(content)) = (key, value.attr("content")) {
                metadata
                    .meta
                    .insert(key.trim().to_string(), content.trim().to_string());
            }
        }
    }

    if let Ok(selector) = Selector::parse("script[type='application/ld+json']") {
        for element in document.select(&selector) {
            let raw = element.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(Value::Array(items)) => metadata.json_ld.extend(items),
                Ok(value) => metadata.json_ld.push(value),
                Err(e) => tracing::debug!("Ignoring malformed JSON-LD block: {}", e),
            }
        }
    }

    metadata
}
