/// Checks whether a host equals a domain or is one of its subdomains
///
/// Both arguments are expected lowercase.
///
/// # Examples
///
/// ```
/// use smartscrape::url::host_matches_domain;
///
/// assert!(host_matches_domain("example.com", "example.com"));
/// assert!(host_matches_domain("blog.example.com", "example.com"));
/// assert!(!host_matches_domain("badexample.com", "example.com"));
/// ```
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches("*.");
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(host_matches_domain("example.com", "example.com"));
        assert!(host_matches_domain("blog.example.com", "blog.example.com"));
    }

    #[test]
    fn test_subdomains_match() {
        assert!(host_matches_domain("blog.example.com", "example.com"));
        assert!(host_matches_domain("api.v2.example.com", "example.com"));
    }

    #[test]
    fn test_no_match() {
        assert!(!host_matches_domain("other.com", "example.com"));
        assert!(!host_matches_domain("example.com", "blog.example.com"));
        assert!(!host_matches_domain("example.com.evil.org", "example.com"));
    }

    #[test]
    fn test_suffix_without_dot_boundary() {
        assert!(!host_matches_domain("notexample.com", "example.com"));
        assert!(!host_matches_domain("myexample.com", "example.com"));
    }

    #[test]
    fn test_wildcard_prefix_tolerated() {
        assert!(host_matches_domain("example.com", "*.example.com"));
        assert!(host_matches_domain("a.example.com", "*.example.com"));
    }
}
