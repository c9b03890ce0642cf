/// Proxy availability and quality labels
///
/// Both are derived from the health score; see `proxy::health`.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability of a proxy for crawl traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    Inactive,
    Active,
    /// A probe is in flight
    Testing,
    /// Too many consecutive failures; only a successful probe revives it
    Failed,
}

impl ProxyStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Testing => "testing",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(Self::Inactive),
            "active" => Some(Self::Active),
            "testing" => Some(Self::Testing),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Human-facing quality band for a health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Unreliable,
}

impl HealthRating {
    /// Maps a 0-100 score onto its band
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::Good
        } else if score >= 60.0 {
            Self::Fair
        } else if score >= 40.0 {
            Self::Poor
        } else {
            Self::Unreliable
        }
    }

    /// Whether proxies in this band may carry crawl traffic
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Excellent | Self::Good | Self::Fair)
    }
}

impl fmt::Display for HealthRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Unreliable => "unreliable",
        };
        write!(f, "{}", label)
    }
}

/// Proxy protocol, inferred from the proxy URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
}

impl ProxyType {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "socks5" | "socks5h" => Some(Self::Socks5),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::from_scheme(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_thresholds() {
        assert_eq!(HealthRating::from_score(100.0), HealthRating::Excellent);
        assert_eq!(HealthRating::from_score(90.0), HealthRating::Excellent);
        assert_eq!(HealthRating::from_score(89.9), HealthRating::Good);
        assert_eq!(HealthRating::from_score(75.0), HealthRating::Good);
        assert_eq!(HealthRating::from_score(60.0), HealthRating::Fair);
        assert_eq!(HealthRating::from_score(40.0), HealthRating::Poor);
        assert_eq!(HealthRating::from_score(39.9), HealthRating::Unreliable);
        assert_eq!(HealthRating::from_score(0.0), HealthRating::Unreliable);
    }

    #[test]
    fn test_usable_bands() {
        assert!(HealthRating::Fair.is_usable());
        assert!(!HealthRating::Poor.is_usable());
        assert!(!HealthRating::Unreliable.is_usable());
    }

    #[test]
    fn test_proxy_type_from_scheme() {
        assert_eq!(ProxyType::from_scheme("http"), Some(ProxyType::Http));
        assert_eq!(ProxyType::from_scheme("socks5h"), Some(ProxyType::Socks5));
        assert_eq!(ProxyType::from_scheme("ftp"), None);
    }

    #[test]
    fn test_proxy_status_roundtrip() {
        for status in [
            ProxyStatus::Inactive,
            ProxyStatus::Active,
            ProxyStatus::Testing,
            ProxyStatus::Failed,
        ] {
            assert_eq!(ProxyStatus::from_db_string(status.to_db_string()), Some(status));
        }
    }
}
