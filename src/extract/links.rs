//! Link and media extraction
//!
//! Both run against the raw document, before any cleaning, so navigation
//! links removed for text derivation are still available to the deep crawl.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::url::resolve_link;

/// One media reference found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

/// Extracts every followable link from the document
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - fragment-only links
/// - anything that does not resolve to http(s)
///
/// Results are absolute, fragment-free and deduplicated in document order.
pub fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |href: &str| {
        if let Some(url) = resolve_link(base_url, href) {
            let url = url.to_string();
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }
    };

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Extracts images, video and audio sources, deduplicated by URL
pub fn extract_media(document: &Html, base_url: &Url) -> Vec<MediaItem> {
    let sources = [
        ("img", MediaKind::Image),
        ("video", MediaKind::Video),
        ("video source", MediaKind::Video),
        ("audio", MediaKind::Audio),
        ("audio source", MediaKind::Audio),
    ];

    let mut seen = HashSet::new();
    let mut media = Vec::new();

    for (selector_str, kind) in sources {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };

        for element in document.select(&selector) {
            let value = element.value();
            let Some(src) = value.attr("src").or_else(|| value.attr("data-src")) else {
                continue;
            };
            let Some(url) = resolve_link(base_url, src) else {
                continue;
            };

            let url = url.to_string();
            if !seen.insert(url.clone()) {
                continue;
            }

            let alt = value
                .attr("alt")
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty());

            media.push(MediaItem { url, kind, alt });
        }
    }

    media
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn links_of(html: &str) -> Vec<String> {
        extract_links(&Html::parse_document(html), &base_url())
    }

    #[test]
    fn test_extract_absolute_and_relative_links() {
        let html = r#"<html><body>
            <a href="https://example.com/page1">Link 1</a>
            <a href="/page2">Link 2</a>
            <a href="page3">Link 3</a>
        </body></html>"#;

        assert_eq!(
            links_of(html),
            vec![
                "https://example.com/page1",
                "https://example.com/page2",
                "https://example.com/page3",
            ]
        );
    }

    #[test]
    fn test_skips_special_schemes_and_downloads() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:test@example.com">Email</a>
            <a href="tel:+1234567890">Phone</a>
            <a href="#section">Anchor</a>
            <a href="/file.pdf" download>Download</a>
            <a href="/valid">Valid</a>
        </body></html>"##;

        assert_eq!(links_of(html), vec!["https://example.com/valid"]);
    }

    #[test]
    fn test_navigation_links_are_kept() {
        let html = r#"<html><body>
            <nav><a href="/nav">Nav</a></nav>
            <footer><a href="/footer">Footer</a></footer>
        </body></html>"#;

        let links = links_of(html);
        assert!(links.contains(&"https://example.com/nav".to_string()));
        assert!(links.contains(&"https://example.com/footer".to_string()));
    }

    #[test]
    fn test_links_deduplicated_and_canonical_included() {
        let html = r#"<html><head>
            <link rel="canonical" href="https://example.com/canonical">
        </head><body>
            <a href="/a">A</a><a href="/a#x">A again</a>
        </body></html>"#;

        assert_eq!(
            links_of(html),
            vec!["https://example.com/a", "https://example.com/canonical"]
        );
    }

    #[test]
    fn test_extract_media() {
        let html = r#"<html><body>
            <img src="/logo.png" alt=" Logo ">
            <img data-src="/lazy.jpg">
            <img src="/logo.png">
            <video><source src="/clip.mp4"></video>
            <audio src="https://cdn.example.com/a.mp3"></audio>
        </body></html>"#;

        let media = extract_media(&Html::parse_document(html), &base_url());

        assert_eq!(media.len(), 4);
        assert_eq!(media[0].url, "https://example.com/logo.png");
        assert_eq!(media[0].alt.as_deref(), Some("Logo"));
        assert_eq!(media[1].url, "https://example.com/lazy.jpg");
        assert_eq!(media[2].kind, MediaKind::Video);
        assert_eq!(media[3].kind, MediaKind::Audio);
    }
}
