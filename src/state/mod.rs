//! State module for crawl sessions, frontier entries and proxies
//!
//! # Components
//!
//! - `UrlStatus`: lifecycle of a single frontier entry (discovered, processing, ...)
//! - `SessionStatus`: the session state machine (pending -> running -> terminal)
//! - `ProxyStatus` / `HealthRating`: derived proxy availability and quality labels

mod proxy_status;
mod session_status;
mod url_status;

// Re-export main types
pub use proxy_status::{HealthRating, ProxyStatus, ProxyType};
pub use session_status::SessionStatus;
pub use url_status::UrlStatus;
