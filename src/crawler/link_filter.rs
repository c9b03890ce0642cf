//! Link filtering before re-enqueue
//!
//! Scoping and depth are decided here. Exact-string dedup and the session
//! `max_urls` cap are enforced by storage when the plan is enqueued, inside
//! the same transaction as the insert.

use crate::config::SessionConfig;
use crate::url::{parse_http_url, DomainScope};
use std::collections::HashSet;

/// Links that survived filtering and the depth to enqueue them at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuePlan {
    pub depth: u32,
    pub urls: Vec<String>,
}

/// Domain scope and depth bound of one session
#[derive(Debug, Clone)]
pub struct LinkFilter {
    scope: DomainScope,
    max_depth: u32,
}

impl LinkFilter {
    pub fn new(scope: DomainScope, max_depth: u32) -> Self {
        Self { scope, max_depth }
    }

    /// Builds the filter from a session's config and first seed
    ///
    /// Returns `None` when the session has no parsable seed.
    pub fn for_session(config: &SessionConfig, seeds: &[String]) -> Option<Self> {
        let seed = parse_http_url(seeds.first()?).ok()?;
        let scope = DomainScope::new(config.domain_strategy, &seed, &config.domain_whitelist);
        Some(Self::new(scope, config.max_depth))
    }

    pub fn scope(&self) -> &DomainScope {
        &self.scope
    }

    /// Filters links discovered on a page at `parent_depth`
    ///
    /// # Returns
    ///
    /// `None` when the children would exceed `max_depth` or no link survives
    pub fn apply(&self, candidates: &[String], parent_depth: u32) -> Option<EnqueuePlan> {
        let depth = parent_depth.checked_add(1)?;
        if depth > self.max_depth {
            return None;
        }

        let mut seen = HashSet::new();
        let urls: Vec<String> = candidates
            .iter()
            .filter_map(|candidate| parse_http_url(candidate).ok())
            .filter(|url| self.scope.in_scope(url))
            .map(String::from)
            .filter(|url| seen.insert(url.clone()))
            .collect();

        if urls.is_empty() {
            return None;
        }

        Some(EnqueuePlan { depth, urls })
    }
}
