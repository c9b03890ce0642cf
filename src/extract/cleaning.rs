//! Document cleaning and main-content selection
//!
//! Cleaning detaches nodes from a copy of the parsed document. It only feeds
//! text and markdown derivation.

use scraper::{ElementRef, Html, Selector};

use crate::config::ExtractionOptions;

/// Removed by smart cleaning
const NOISE_SELECTORS: &[&str] = &[
    "script",
    "style",
    "noscript",
    "iframe",
    "template",
    ".social",
    ".social-share",
    ".share-buttons",
    ".sharing",
    "[class*='social-']",
];

/// Removed when ad removal is enabled
const AD_SELECTORS: &[&str] = &[
    ".ad",
    ".ads",
    ".advert",
    ".advertisement",
    ".sponsored",
    ".banner-ad",
    "[id^='ad-']",
    "[class^='ad-']",
    "[id*='google_ads']",
    "ins.adsbygoogle",
];

/// Removed when navigation removal is enabled
const NAVIGATION_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "footer",
    "aside",
    ".nav",
    ".navbar",
    ".navigation",
    ".header",
    ".footer",
    ".sidebar",
    ".menu",
    "#nav",
    "#header",
    "#footer",
    "#sidebar",
    "[role='navigation']",
];

/// Candidate main-content containers, most specific first
pub const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".content",
    ".main",
    ".post-content",
    ".entry-content",
];

/// Applies the enabled cleaning passes in place
pub fn clean(document: &mut Html, options: &ExtractionOptions) {
    if options.smart_cleaning {
        remove_matching(document, NOISE_SELECTORS);
        remove_comments(document);
    }
    if options.remove_ads {
        remove_matching(document, AD_SELECTORS);
    }
    if options.remove_navigation {
        remove_matching(document, NAVIGATION_SELECTORS);
    }
}

fn remove_matching(document: &mut Html, selectors: &[&str]) {
    let mut ids = Vec::new();
    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            ids.extend(document.select(&selector).map(|el| el.id()));
        }
    }

    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn remove_comments(document: &mut Html) {
    let ids: Vec<_> = document
        .tree
        .nodes()
        .filter(|node| node.value().is_comment())
        .map(|node| node.id())
        .collect();

    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// First element matching a main-content selector, else `<body>`
pub fn main_content(document: &Html) -> ElementRef<'_> {
    for selector_str in MAIN_CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                return element;
            }
        }
    }

    Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element())
}

/// Whitespace-normalized text of an element
pub fn normalized_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for chunk in element.text() {
        for word in chunk.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// Truncates to at most `limit` characters
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ExtractionOptions {
        ExtractionOptions::default()
    }

    fn cleaned_text(html: &str, options: &ExtractionOptions) -> String {
        let mut document = Html::parse_document(html);
        clean(&mut document, options);
        normalized_text(main_content(&document))
    }

    #[test]
    fn test_smart_cleaning_strips_scripts_and_comments() {
        let html = r#"<html><body>
            <p>Visible</p>
            <script>var hidden = 1;</script>
            <style>p { color: red }</style>
            <!-- a comment -->
            <div class="social-share">Share me</div>
        </body></html>"#;

        assert_eq!(cleaned_text(html, &options()), "Visible");

        let mut raw = options();
        raw.smart_cleaning = false;
        assert!(cleaned_text(html, &raw).contains("var hidden"));
    }

    #[test]
    fn test_ad_removal() {
        let html = r#"<html><body><p>Story</p><div class="advertisement">Buy now</div></body></html>"#;
        assert_eq!(cleaned_text(html, &options()), "Story");
    }

    #[test]
    fn test_navigation_removal_is_optional() {
        let html = r#"<html><body><nav>Home About</nav><p>Body text</p><footer>(c)</footer></body></html>"#;

        assert_eq!(cleaned_text(html, &options()), "Home About Body text (c)");

        let mut no_nav = options();
        no_nav.remove_navigation = true;
        assert_eq!(cleaned_text(html, &no_nav), "Body text");
    }

    #[test]
    fn test_main_content_preferred_over_body() {
        let html = r#"<html><body><div>Outside</div><article><p>Inside   the article</p></article></body></html>"#;
        let document = Html::parse_document(html);
        assert_eq!(normalized_text(main_content(&document)), "Inside the article");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 50), "short");
        assert_eq!(truncate_chars("", 3), "");
    }
}
