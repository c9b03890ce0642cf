//! Configuration module for SmartScrape
//!
//! Loads, parses and validates the TOML configuration file. The `[session]`
//! table becomes one immutable [`SessionConfig`] that is validated once and
//! stored with the session.
//!
//! # Example
//!
//! ```no_run
//! use smartscrape::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Workers per session: {}", config.session.config.max_concurrent);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlStrategy, DomainStrategy, ExtractionOptions, FetchConfig, OutputConfig,
    PaginationConfig, ProxyConfig, RelayConfig, RelayKind, RequiredFieldPolicy, SessionConfig,
    SessionSection,
};

pub use parser::{
    compute_config_hash, compute_session_config_hash, load_config, load_config_with_hash,
    parse_config,
};

pub use validation::{validate_schema, validate_seeds, validate_session_config, MAX_CONCURRENCY};
