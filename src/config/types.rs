use crate::extract::ExtractionSchema;
use serde::{Deserialize, Serialize};

/// Main configuration structure for SmartScrape
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub session: SessionSection,
}

/// Egress configuration for the fetch layer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Timeout for the direct attempt (seconds)
    #[serde(default = "default_direct_timeout")]
    pub direct_timeout_secs: u64,

    /// Timeout for each relay attempt (seconds); must be shorter than the direct one
    #[serde(default = "default_relay_timeout")]
    pub relay_timeout_secs: u64,

    /// User agents rotated across direct requests
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Ordered fallback chain tried after a failed direct attempt
    #[serde(default = "default_relays")]
    pub relays: Vec<RelayConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            direct_timeout_secs: default_direct_timeout(),
            relay_timeout_secs: default_relay_timeout(),
            user_agents: default_user_agents(),
            relays: default_relays(),
        }
    }
}

/// One relay in the fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayConfig {
    pub name: String,
    pub kind: RelayKind,
    /// For `prefix` relays the target URL is percent-encoded and appended;
    /// for `proxy` relays this is the proxy URL
    pub endpoint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayKind {
    Prefix,
    Proxy,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

/// Proxy health monitor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// URL requested through each proxy during a health probe
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,

    /// Proxies probed concurrently per batch chunk
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Pause between batch chunks (milliseconds)
    #[serde(default = "default_batch_pause")]
    pub batch_pause_ms: u64,

    /// Cleanup removes proxies whose consecutive failures exceed this
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Cleanup removes tested proxies scoring below this
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Cleanup removes proxies not tested within this window (hours)
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Proxy URLs loaded into the pool at startup
    #[serde(default)]
    pub proxies: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            test_timeout_secs: default_test_timeout(),
            batch_concurrency: default_batch_concurrency(),
            batch_pause_ms: default_batch_pause(),
            max_consecutive_failures: default_max_consecutive_failures(),
            min_score: default_min_score(),
            retention_hours: default_retention_hours(),
            proxies: Vec::new(),
        }
    }
}

/// The `[session]` table: seeds plus the session configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub seeds: Vec<String>,

    #[serde(flatten)]
    pub config: SessionConfig,
}

/// Immutable configuration of one crawl session
///
/// Built once when the session is created, validated, and stored alongside the
/// session. Every option has an explicit default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionConfig {
    pub strategy: CrawlStrategy,

    /// Re-enqueue in-scope links discovered on each page
    pub enable_deep_crawl: bool,

    /// Maximum link hops from a seed
    pub max_depth: u32,

    /// Session-wide cap on discovered URLs (seeds included)
    pub max_urls: u32,

    pub domain_strategy: DomainStrategy,

    /// Allowed domains when `domain_strategy` is `whitelist`
    pub domain_whitelist: Vec<String>,

    pub pagination: PaginationConfig,

    /// Declarative field extraction, resolved by the caller
    pub extraction_schema: Option<ExtractionSchema>,

    /// Number of workers draining the frontier
    pub max_concurrent: usize,

    /// Base delay before each fetch (milliseconds)
    pub delay_ms: u64,

    /// Upper bound of the uniform random delay added to `delay_ms`
    pub jitter_ms: u64,

    pub extraction: ExtractionOptions,

    pub required_field_policy: RequiredFieldPolicy,

    /// Route fetches through the best active proxy before falling back to relays
    pub use_proxy_pool: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strategy: CrawlStrategy::Basic,
            enable_deep_crawl: false,
            max_depth: 2,
            max_urls: 50,
            domain_strategy: DomainStrategy::SameDomain,
            domain_whitelist: Vec::new(),
            pagination: PaginationConfig::default(),
            extraction_schema: None,
            max_concurrent: 3,
            delay_ms: 1000,
            jitter_ms: 500,
            extraction: ExtractionOptions::default(),
            required_field_policy: RequiredFieldPolicy::Annotate,
            use_proxy_pool: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrawlStrategy {
    /// Generic content extraction only
    Basic,
    /// Generic extraction plus the session's extraction schema
    Schema,
}

/// Which discovered links are eligible for the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DomainStrategy {
    /// Registered domain of the first seed, subdomains included
    SameDomain,
    /// Exact host of the first seed
    SameSubdomain,
    /// Any whitelisted domain or its subdomains
    Whitelist,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PaginationConfig {
    pub enabled: bool,

    /// Custom "next page" selector; disables the heuristics when set
    pub selector: Option<String>,

    /// Maximum pages in one pagination chain, the first page included
    pub max_pages: u32,

    /// Delay before fetching each follow-up page (milliseconds)
    pub delay_ms: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            selector: None,
            max_pages: 10,
            delay_ms: 1000,
        }
    }
}

/// Output flags for the content extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExtractionOptions {
    pub extract_links: bool,
    pub extract_media: bool,
    pub generate_markdown: bool,
    /// Strip script/style/noscript/social/comment elements before text derivation
    pub smart_cleaning: bool,
    pub remove_ads: bool,
    pub remove_navigation: bool,
    /// Maximum characters kept from the main text
    pub text_limit: usize,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            extract_links: true,
            extract_media: true,
            generate_markdown: true,
            smart_cleaning: true,
            remove_ads: true,
            remove_navigation: false,
            text_limit: 50_000,
        }
    }
}

/// What happens to a URL whose page lacks a required schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequiredFieldPolicy {
    /// Complete the URL and note the missing fields
    Annotate,
    /// Mark the URL failed
    FailUrl,
}

fn default_direct_timeout() -> u64 {
    30
}

fn default_relay_timeout() -> u64 {
    15
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_relays() -> Vec<RelayConfig> {
    vec![
        RelayConfig {
            name: "allorigins".to_string(),
            kind: RelayKind::Prefix,
            endpoint: "https://api.allorigins.win/raw?url=".to_string(),
        },
        RelayConfig {
            name: "corsproxy".to_string(),
            kind: RelayKind::Prefix,
            endpoint: "https://corsproxy.io/?".to_string(),
        },
    ]
}

fn default_probe_url() -> String {
    "https://httpbin.org/ip".to_string()
}

fn default_test_timeout() -> u64 {
    10
}

fn default_batch_concurrency() -> usize {
    5
}

fn default_batch_pause() -> u64 {
    1000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_min_score() -> f64 {
    20.0
}

fn default_retention_hours() -> u64 {
    72
}
