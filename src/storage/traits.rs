//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::config::SessionConfig;
use crate::state::{ProxyStatus, ProxyType, SessionStatus, UrlStatus};
use crate::storage::{CrawlUrlRecord, ProxyRecord, SessionRecord, UrlOutcome};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("URL not found: {0}")]
    UrlNotFound(i64),

    #[error("Proxy not found: {0}")]
    ProxyNotFound(i64),

    #[error("URL {0} is not claimed by a worker")]
    UrlNotClaimed(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every method that mutates more than one row runs as a single transaction,
/// so callers holding the storage lock observe each one as atomic.
pub trait Storage {
    // ===== Sessions =====

    /// Creates a pending session and enqueues its seeds at depth 0
    ///
    /// Seeds are deduplicated and capped at `config.max_urls`.
    fn create_session(
        &mut self,
        config: &SessionConfig,
        config_hash: &str,
        seeds: &[String],
    ) -> StorageResult<SessionRecord>;

    fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord>;

    /// All sessions, newest first
    fn list_sessions(&self) -> StorageResult<Vec<SessionRecord>>;

    /// Sets the status, stamping `started_at` on running and `finished_at`
    /// on terminal statuses
    fn update_session_status(
        &mut self,
        session_id: &str,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Compare-and-set of the session status
    ///
    /// Moves the session to `to` only if it is currently `from`, stamping
    /// timestamps like [`Storage::update_session_status`].
    ///
    /// # Returns
    ///
    /// `false` if the stored status was not `from`
    fn transition_session_status(
        &mut self,
        session_id: &str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> StorageResult<bool>;

    // ===== Frontier =====

    /// Returns `processing` entries left by an interrupted run to `discovered`
    fn requeue_processing(&mut self, session_id: &str) -> StorageResult<usize>;

    /// Atomically claims the next `discovered` entry, ordered by depth,
    /// discovery time and id
    fn claim_next_url(&mut self, session_id: &str) -> StorageResult<Option<CrawlUrlRecord>>;

    /// Returns a claimed entry to `discovered`
    fn release_url(&mut self, url_id: i64) -> StorageResult<()>;

    /// Stores the outcome of a claimed entry and bumps the matching counter
    fn record_url_outcome(&mut self, url_id: i64, outcome: &UrlOutcome) -> StorageResult<()>;

    /// Inserts new frontier entries
    ///
    /// URLs already present in the session (exact string match) are skipped,
    /// and nothing is inserted past `max_urls` entries for the session.
    ///
    /// # Returns
    ///
    /// The number of entries inserted
    fn enqueue_urls(
        &mut self,
        session_id: &str,
        parent_url: Option<&str>,
        depth: u32,
        page_number: u32,
        urls: &[String],
        max_urls: u32,
    ) -> StorageResult<usize>;

    fn get_url(&self, url_id: i64) -> StorageResult<CrawlUrlRecord>;

    /// All entries of a session in id order
    fn list_urls(&self, session_id: &str) -> StorageResult<Vec<CrawlUrlRecord>>;

    fn count_urls_by_status(&self, session_id: &str, status: UrlStatus) -> StorageResult<u64>;

    fn url_exists(&self, session_id: &str, url: &str) -> StorageResult<bool>;

    // ===== Proxies =====

    /// Inserts a proxy as inactive; returns false if the URL is already known
    fn insert_proxy(&mut self, url: &str, source: &str, proxy_type: ProxyType)
        -> StorageResult<bool>;

    fn list_proxies(&self) -> StorageResult<Vec<ProxyRecord>>;

    fn get_proxy(&self, proxy_id: i64) -> StorageResult<ProxyRecord>;

    fn set_proxy_status(&mut self, proxy_id: i64, status: ProxyStatus) -> StorageResult<()>;

    /// Read-modify-write of one proxy inside a transaction
    ///
    /// # Returns
    ///
    /// The record as written
    fn update_proxy(
        &mut self,
        proxy_id: i64,
        update: &mut dyn FnMut(&mut ProxyRecord),
    ) -> StorageResult<ProxyRecord>;

    /// Highest-scoring active proxy, lowest latency first on ties
    fn best_active_proxy(&self) -> StorageResult<Option<ProxyRecord>>;

    fn delete_proxy(&mut self, proxy_id: i64) -> StorageResult<()>;
}
