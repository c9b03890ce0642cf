use url::{Host, Url};

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use smartscrape::url::extract_host;
///
/// let url = Url::parse("https://Blog.Example.com/path").unwrap();
/// assert_eq!(extract_host(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Registered domain of a URL: the last two labels of its host
///
/// IP addresses and single-label hosts are returned unchanged. Multi-part
/// public suffixes (`co.uk`) are not special-cased.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use smartscrape::url::registered_domain;
///
/// let url = Url::parse("https://www.blog.example.com/").unwrap();
/// assert_eq!(registered_domain(&url), Some("example.com".to_string()));
/// ```
pub fn registered_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => Some(last_two_labels(&domain.to_lowercase())),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

fn last_two_labels(host: &str) -> String {
    let host = host.trim_end_matches('.');
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }
    labels[labels.len() - 2..].join(".")
}
