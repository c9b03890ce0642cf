//! URL handling module for SmartScrape
//!
//! Host extraction, registered-domain computation, link resolution and the
//! domain scoping policy applied to discovered links.

mod domain;
mod matcher;
mod resolve;

use crate::config::DomainStrategy;
use ::url::Url;

pub use domain::{extract_host, registered_domain};
pub use matcher::host_matches_domain;
pub use resolve::{parse_http_url, resolve_link};

/// Domain scoping policy of one session
///
/// Built once from the session's first seed; the base domain is never
/// recomputed while the session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainScope {
    /// Hosts equal to or under this registered domain
    SameDomain(String),
    /// Exactly this host
    SameSubdomain(String),
    /// Hosts equal to or under any of these domains
    Whitelist(Vec<String>),
    Any,
}

impl DomainScope {
    /// Builds the scope for a session
    ///
    /// # Arguments
    ///
    /// * `strategy` - The session's domain strategy
    /// * `seed` - The session's first seed URL
    /// * `whitelist` - Allowed domains, used by the whitelist strategy
    pub fn new(strategy: DomainStrategy, seed: &Url, whitelist: &[String]) -> Self {
        match strategy {
            DomainStrategy::SameDomain => {
                Self::SameDomain(registered_domain(seed).unwrap_or_default())
            }
            DomainStrategy::SameSubdomain => {
                Self::SameSubdomain(extract_host(seed).unwrap_or_default())
            }
            DomainStrategy::Whitelist => Self::Whitelist(
                whitelist
                    .iter()
                    .map(|d| d.trim().to_lowercase())
                    .filter(|d| !d.is_empty())
                    .collect(),
            ),
            DomainStrategy::Any => Self::Any,
        }
    }

    /// Returns true if the URL is eligible for the frontier
    pub fn in_scope(&self, url: &Url) -> bool {
        if let Self::Any = self {
            return true;
        }

        let Some(host) = extract_host(url) else {
            return false;
        };

        match self {
            Self::SameDomain(base) => host_matches_domain(&host, base),
            Self::SameSubdomain(base) => host == *base,
            Self::Whitelist(domains) => domains.iter().any(|d| host_matches_domain(&host, d)),
            Self::Any => true,
        }
    }
}
