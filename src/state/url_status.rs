/// Frontier entry status definitions
///
/// A `CrawlUrl` moves from `Discovered` to `Processing` by an exclusive claim,
/// then to exactly one terminal status.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current status of a frontier entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStatus {
    /// Entry is in the frontier and can be claimed
    Discovered,

    /// Entry is claimed by exactly one worker
    Processing,

    /// Page was fetched and extracted
    Completed,

    /// Fetch failed after every egress strategy was exhausted
    Failed,

    /// Access was denied (HTTP 403/429, direct or relay-reported)
    Blocked,
}

impl UrlStatus {
    /// Returns true if this is a terminal status (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }

    /// Checks whether a worker may move an entry from `self` to `next`
    ///
    /// `Processing -> Discovered` is the release path used when a claim is
    /// abandoned because the session was cancelled.
    pub fn can_transition_to(&self, next: UrlStatus) -> bool {
        match (self, next) {
            (Self::Discovered, Self::Processing) => true,
            (Self::Processing, Self::Discovered) => true,
            (Self::Processing, n) => n.is_terminal(),
            _ => false,
        }
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }

    /// Parses a status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Discovered,
            Self::Processing,
            Self::Completed,
            Self::Failed,
            Self::Blocked,
        ]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!UrlStatus::Discovered.is_terminal());
        assert!(!UrlStatus::Processing.is_terminal());

        assert!(UrlStatus::Completed.is_terminal());
        assert!(UrlStatus::Failed.is_terminal());
        assert!(UrlStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_claim_and_release_transitions() {
        assert!(UrlStatus::Discovered.can_transition_to(UrlStatus::Processing));
        assert!(UrlStatus::Processing.can_transition_to(UrlStatus::Discovered));
        assert!(UrlStatus::Processing.can_transition_to(UrlStatus::Blocked));
    }

    #[test]
    fn test_terminal_statuses_are_final() {
        for status in [UrlStatus::Completed, UrlStatus::Failed, UrlStatus::Blocked] {
            for next in UrlStatus::all_statuses() {
                assert!(!status.can_transition_to(next), "{} -> {}", status, next);
            }
        }
    }

    #[test]
    fn test_discovered_cannot_skip_processing() {
        assert!(!UrlStatus::Discovered.can_transition_to(UrlStatus::Completed));
        assert!(!UrlStatus::Discovered.can_transition_to(UrlStatus::Failed));
    }

    #[test]
    fn test_roundtrip_db_string() {
        for status in UrlStatus::all_statuses() {
            let db_str = status.to_db_string();
            assert_eq!(Some(status), UrlStatus::from_db_string(db_str));
        }
        assert_eq!(UrlStatus::from_db_string("queued"), None);
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&UrlStatus::Blocked).unwrap();
        assert_eq!(json, "\"blocked\"");
    }
}
