//! Pagination detection
//!
//! Decides whether a fetched page links to a "next page". A configured
//! selector wins outright; otherwise the heuristics below are tried in order
//! and the first hit is returned:
//!
//! 1. `rel="next"` on `<link>` or `<a>`
//! 2. anchors whose text, class or aria-label says "next"
//! 3. numbered pagination containers (the link after the current page)
//! 4. load-more buttons
//!
//! Detection only reports intent. The worker decides whether to enqueue.

use crate::url::resolve_link;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameters commonly carrying the page number
const PAGE_PARAMS: &[&str] = &["page", "p", "pg", "paged"];

/// Anchor texts that mean "next page"
const NEXT_TEXTS: &[&str] = &[
    "next",
    "next page",
    "next »",
    "next ›",
    "next >",
    "next →",
    "»",
    "›",
    ">",
    "→",
    "older posts",
    "more results",
];

const PAGINATION_CONTAINERS: &[&str] = &[
    ".pagination",
    ".pager",
    ".page-numbers",
    ".paging",
    "nav[aria-label*='agination']",
    "ul.pages",
];

const CURRENT_PAGE_MARKERS: &[&str] = &[".current", ".active", "[aria-current='page']"];

const LOAD_MORE_TEXTS: &[&str] = &["load more", "show more", "view more"];

/// How the next page was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMethod {
    CustomSelector,
    RelNext,
    NextLink,
    NumberedPages,
    LoadMore,
    None,
}

/// Pagination intent of one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub has_next_page: bool,
    /// Absolute URL of the next page; a load-more button may have none
    pub next_page_url: Option<String>,
    /// Page number parsed from the current URL
    pub current_page: Option<u32>,
    pub method: PaginationMethod,
}

impl PaginationInfo {
    fn none(current_page: Option<u32>) -> Self {
        Self {
            has_next_page: false,
            next_page_url: None,
            current_page,
            method: PaginationMethod::None,
        }
    }

    fn found(url: Option<Url>, current_page: Option<u32>, method: PaginationMethod) -> Self {
        Self {
            has_next_page: true,
            next_page_url: url.map(String::from),
            current_page,
            method,
        }
    }
}

/// Detects the next page of a document
///
/// # Arguments
///
/// * `html` - The fetched page body
/// * `page_url` - Final URL of the page
/// * `custom_selector` - Optional configured "next" selector
pub fn detect_pagination(
    html: &str,
    page_url: &Url,
    custom_selector: Option<&str>,
) -> PaginationInfo {
    let document = Html::parse_document(html);
    let current_page = page_number_from_url(page_url);

    if let Some(selector) = custom_selector {
        return match by_custom_selector(&document, page_url, selector) {
            Some(next) => {
                PaginationInfo::found(Some(next), current_page, PaginationMethod::CustomSelector)
            }
            None => PaginationInfo::none(current_page),
        };
    }

    if let Some(next) = by_rel_next(&document, page_url) {
        return PaginationInfo::found(Some(next), current_page, PaginationMethod::RelNext);
    }

    if let Some(next) = by_next_link(&document, page_url) {
        return PaginationInfo::found(Some(next), current_page, PaginationMethod::NextLink);
    }

    if let Some(next) = by_numbered_pages(&document, page_url, current_page) {
        return PaginationInfo::found(Some(next), current_page, PaginationMethod::NumberedPages);
    }

    if let Some(next) = by_load_more(&document, page_url) {
        return PaginationInfo::found(next, current_page, PaginationMethod::LoadMore);
    }

    PaginationInfo::none(current_page)
}

/// Reads the page number from `?page=N` style parameters or a `/page/N` path
pub fn page_number_from_url(url: &Url) -> Option<u32> {
    let from_query = url.query_pairs().find_map(|(key, value)| {
        PAGE_PARAMS
            .contains(&key.as_ref())
            .then(|| value.parse::<u32>().ok())
            .flatten()
    });
    if from_query.is_some() {
        return from_query;
    }

    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| pair[0].eq_ignore_ascii_case("page"))
        .and_then(|pair| pair[1].parse().ok())
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Resolves an href, rejecting links back to the current page
fn next_url(page_url: &Url, href: &str) -> Option<Url> {
    let url = resolve_link(page_url, href)?;
    let mut current = page_url.clone();
    current.set_fragment(None);
    (url != current).then_some(url)
}

fn is_disabled(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    value.attr("aria-disabled") == Some("true")
        || value.attr("disabled").is_some()
        || value.classes().any(|c| c.eq_ignore_ascii_case("disabled"))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn by_custom_selector(document: &Html, page_url: &Url, css: &str) -> Option<Url> {
    let custom = selector(css)?;
    let anchor = selector("a[href]")?;

    document.select(&custom).find_map(|element| {
        let value = element.value();
        let href = value
            .attr("href")
            .or_else(|| value.attr("data-href"))
            .or_else(|| value.attr("data-url"))
            .map(str::to_string)
            .or_else(|| {
                element
                    .select(&anchor)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string)
            })?;
        next_url(page_url, &href)
    })
}

fn by_rel_next(document: &Html, page_url: &Url) -> Option<Url> {
    let rel_next = selector("link[rel~='next'][href], a[rel~='next'][href]")?;
    document
        .select(&rel_next)
        .filter(|e| !is_disabled(e))
        .find_map(|e| next_url(page_url, e.value().attr("href")?))
}

fn by_next_link(document: &Html, page_url: &Url) -> Option<Url> {
    let anchors = selector("a[href]")?;
    document
        .select(&anchors)
        .filter(|a| !is_disabled(a))
        .filter(|a| {
            let value = a.value();
            let text = element_text(a);
            NEXT_TEXTS.contains(&text.as_str())
                || value.classes().any(|c| {
                    let c = c.to_ascii_lowercase();
                    c == "next" || c.ends_with("-next") || c.starts_with("next-")
                })
                || value
                    .attr("aria-label")
                    .is_some_and(|label| label.to_lowercase().contains("next"))
        })
        .find_map(|a| next_url(page_url, a.value().attr("href")?))
}

fn by_numbered_pages(document: &Html, page_url: &Url, current_page: Option<u32>) -> Option<Url> {
    let anchors = selector("a[href]")?;

    for container_css in PAGINATION_CONTAINERS {
        let Some(container_selector) = selector(container_css) else {
            continue;
        };

        for container in document.select(&container_selector) {
            let marked = CURRENT_PAGE_MARKERS.iter().find_map(|marker| {
                let marker = selector(marker)?;
                container
                    .select(&marker)
                    .find_map(|e| element_text(&e).parse::<u32>().ok())
            });
            let current = marked.or(current_page).unwrap_or(1);
            let Some(wanted) = current.checked_add(1).map(|n| n.to_string()) else {
                continue;
            };

            let next = container
                .select(&anchors)
                .filter(|a| element_text(a) == wanted)
                .find_map(|a| next_url(page_url, a.value().attr("href")?));
            if next.is_some() {
                return next;
            }
        }
    }

    None
}

/// Finds a load-more control; the inner option is its URL, when it has one
fn by_load_more(document: &Html, page_url: &Url) -> Option<Option<Url>> {
    let controls = selector("button, a, [class*='load-more']")?;

    document
        .select(&controls)
        .filter(|e| !is_disabled(e))
        .find(|e| {
            let text = element_text(e);
            LOAD_MORE_TEXTS.iter().any(|t| text.contains(t))
                || e.value().classes().any(|c| c.eq_ignore_ascii_case("load-more"))
        })
        .map(|e| {
            let value = e.value();
            value
                .attr("href")
                .or_else(|| value.attr("data-href"))
                .or_else(|| value.attr("data-url"))
                .and_then(|href| next_url(page_url, href))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_rel_next_resolves_against_page() {
        let html = r#"<html><body><a rel="next" href="/p/2">Next</a></body></html>"#;
        let info = detect_pagination(html, &url("https://s.com/p/1"), None);

        assert!(info.has_next_page);
        assert_eq!(info.next_page_url.as_deref(), Some("https://s.com/p/2"));
        assert_eq!(info.method, PaginationMethod::RelNext);
    }

    #[test]
    fn test_link_rel_next_in_head() {
        let html = r#"<html><head><link rel="next" href="?page=3"></head><body></body></html>"#;
        let info = detect_pagination(html, &url("https://s.com/list?page=2"), None);

        assert_eq!(info.next_page_url.as_deref(), Some("https://s.com/list?page=3"));
        assert_eq!(info.current_page, Some(2));
    }

    #[test]
    fn test_next_text_link() {
        let html = r#"<div><a href="/a">Home</a><a href="/list/2"> Next &raquo; </a></div>"#;
        let info = detect_pagination(html, &url("https://s.com/list/1"), None);

        assert_eq!(info.method, PaginationMethod::NextLink);
        assert_eq!(info.next_page_url.as_deref(), Some("https://s.com/list/2"));
    }

    #[test]
    fn test_disabled_next_is_ignored() {
        let html = r#"<a class="next disabled" href="/list/9">Next</a>"#;
        let info = detect_pagination(html, &url("https://s.com/list/9"), None);
        assert!(!info.has_next_page);
        assert_eq!(info.method, PaginationMethod::None);
    }

    #[test]
    fn test_numbered_pages_follow_current() {
        let html = r#"
            <ul class="pagination">
                <li><a href="/c?page=1">1</a></li>
                <li class="active"><span>2</span></li>
                <li><a href="/c?page=3">3</a></li>
                <li><a href="/c?page=4">4</a></li>
            </ul>"#;
        let info = detect_pagination(html, &url("https://s.com/c?page=2"), None);

        assert_eq!(info.method, PaginationMethod::NumberedPages);
        assert_eq!(info.next_page_url.as_deref(), Some("https://s.com/c?page=3"));
    }

    #[test]
    fn test_last_representable_page_has_no_numbered_next() {
        let html = r#"<ul class="pagination"><li><a href="?page=1">1</a></li></ul>"#;
        let page = url("https://s.com/list?page=4294967295");
        let info = detect_pagination(html, &page, None);

        assert_eq!(info.current_page, Some(u32::MAX));
        assert!(!info.has_next_page);

        let marked = r#"<div class="pagination">
            <span class="current">4294967295</span><a href="/list/2">1</a>
        </div>"#;
        assert!(!detect_pagination(marked, &url("https://s.com/list"), None).has_next_page);
    }

    #[test]
    fn test_load_more_without_url() {
        let html = r#"<button class="btn">Load more</button>"#;
        let info = detect_pagination(html, &url("https://s.com/feed"), None);

        assert!(info.has_next_page);
        assert_eq!(info.method, PaginationMethod::LoadMore);
        assert_eq!(info.next_page_url, None);
    }

    #[test]
    fn test_custom_selector_disables_heuristics() {
        let html = r#"<a rel="next" href="/p/2">Next</a><div class="go"><a href="/p/7">go</a></div>"#;

        let info = detect_pagination(html, &url("https://s.com/p/1"), Some("div.go"));
        assert_eq!(info.method, PaginationMethod::CustomSelector);
        assert_eq!(info.next_page_url.as_deref(), Some("https://s.com/p/7"));

        let info = detect_pagination(html, &url("https://s.com/p/1"), Some(".missing"));
        assert!(!info.has_next_page);
    }

    #[test]
    fn test_self_link_is_not_next() {
        let html = r#"<a rel="next" href="/p/1#top">Next</a>"#;
        let info = detect_pagination(html, &url("https://s.com/p/1"), None);
        assert!(!info.has_next_page);
    }

    #[test]
    fn test_page_number_from_path() {
        assert_eq!(page_number_from_url(&url("https://s.com/blog/page/4/")), Some(4));
        assert_eq!(page_number_from_url(&url("https://s.com/blog?pg=7")), Some(7));
        assert_eq!(page_number_from_url(&url("https://s.com/blog")), None);
    }
}
