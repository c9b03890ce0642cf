//! SmartScrape: a crawl and content-extraction engine
//!
//! This crate crawls seed URLs with a bounded pool of workers, falls back to
//! relay egress strategies when a site blocks direct requests, extracts
//! structured content from every page, follows pagination chains and in-scope
//! links, and keeps a scored pool of egress proxies healthy.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod proxy;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for SmartScrape operations
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Egress error: {0}")]
    Egress(#[from] crawler::EgressError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Session {0} is already running")]
    SessionAlreadyRunning(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidSessionTransition {
        from: state::SessionStatus,
        to: state::SessionStatus,
    },

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector '{selector}' for {context}")]
    InvalidSelector { selector: String, context: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for SmartScrape operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

// Re-export commonly used types
pub use config::{Config, SessionConfig};
pub use crawler::{Fetcher, SessionController, SessionRegistry};
pub use extract::{extract, ExtractedContent};
pub use proxy::ProxyMonitor;
pub use state::{ProxyStatus, SessionStatus, UrlStatus};
pub use storage::{SharedStorage, SqliteStorage, Storage};
