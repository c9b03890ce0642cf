//! Crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Egress strategies and the fetcher that chains them
//! - Pagination detection and link filtering
//! - The worker pool draining a session's frontier
//! - Session lifecycle and cancellation

pub mod egress;
mod fetcher;
mod link_filter;
mod pagination;
mod session;
mod worker;

pub use egress::{
    build_http_client, relays_from_config, DirectEgress, EgressError, EgressResponse,
    EgressStrategy, PrefixRelay, ProxyEgress,
};
pub use fetcher::{Attempt, FetchOutcome, FetchReport, Fetcher};
pub use link_filter::{EnqueuePlan, LinkFilter};
pub use pagination::{detect_pagination, page_number_from_url, PaginationInfo, PaginationMethod};
pub use session::{SessionController, SessionRegistry};
pub use worker::{PoolSummary, WorkerPool};
