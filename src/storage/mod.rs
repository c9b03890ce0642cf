//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the engine:
//! - SQLite database initialization and schema management
//! - Session records and their counters
//! - The per-session frontier, claimed atomically by workers
//! - The proxy pool and its health metrics

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::SessionConfig;
use crate::extract::{ContentStats, ExtractedContent, MediaItem, PageMetadata};
use crate::state::{ProxyStatus, ProxyType, SessionStatus, UrlStatus};
use crate::ScrapeError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage shared between the session controller, workers and proxy monitor
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Wraps a storage backend for sharing
pub fn share<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Runs one storage operation under the lock
///
/// A poisoned lock surfaces as [`StorageError::LockPoisoned`].
pub fn with_storage<T>(
    storage: &SharedStorage,
    op: impl FnOnce(&mut (dyn Storage + Send)) -> StorageResult<T>,
) -> StorageResult<T> {
    let mut guard = storage.lock().map_err(|_| StorageError::LockPoisoned)?;
    op(&mut *guard)
}

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ScrapeError> {
    Ok(SqliteStorage::new(path)?)
}

/// Current time as a sortable RFC 3339 string
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A crawl session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub config: SessionConfig,
    pub config_hash: String,
    pub seeds: Vec<String>,
    pub status: SessionStatus,
    pub urls_discovered: u64,
    pub urls_completed: u64,
    pub urls_failed: u64,
    pub urls_blocked: u64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl SessionRecord {
    /// URLs that reached a terminal status
    pub fn urls_finished(&self) -> u64 {
        self.urls_completed + self.urls_failed + self.urls_blocked
    }
}

/// A frontier entry and, once processed, its crawl result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlUrlRecord {
    pub id: i64,
    pub session_id: String,
    pub url: String,
    pub parent_url: Option<String>,
    pub depth: u32,
    /// Position in a pagination chain; 1 for ordinary pages
    pub page_number: u32,
    pub status: UrlStatus,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub markdown: Option<String>,
    pub metadata: Option<PageMetadata>,
    pub links: Vec<String>,
    pub media: Vec<MediaItem>,
    pub extracted_data: Option<Value>,
    pub stats: Option<ContentStats>,
    pub error_message: Option<String>,
    pub response_time_ms: Option<u64>,
    pub discovered_at: String,
    pub completed_at: Option<String>,
}

/// Terminal result of processing one claimed entry
#[derive(Debug, Clone, PartialEq)]
pub struct UrlOutcome {
    pub status: UrlStatus,
    pub status_code: Option<u16>,
    pub content: Option<ExtractedContent>,
    pub error_message: Option<String>,
    pub response_time_ms: u64,
}

impl UrlOutcome {
    pub fn completed(content: ExtractedContent, status_code: u16, response_time_ms: u64) -> Self {
        Self {
            status: UrlStatus::Completed,
            status_code: Some(status_code),
            content: Some(content),
            error_message: None,
            response_time_ms,
        }
    }

    pub fn failed(error: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            status: UrlStatus::Failed,
            status_code: None,
            content: None,
            error_message: Some(error.into()),
            response_time_ms,
        }
    }

    pub fn blocked(
        status_code: Option<u16>,
        error: impl Into<String>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            status: UrlStatus::Blocked,
            status_code,
            content: None,
            error_message: Some(error.into()),
            response_time_ms,
        }
    }

    /// Attaches a note, e.g. missing required schema fields
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Changes the terminal status, keeping any extracted content
    pub fn with_status(mut self, status: UrlStatus) -> Self {
        self.status = status;
        self
    }
}

/// An egress proxy and its rolling health metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub id: i64,
    pub url: String,
    pub source: String,
    pub proxy_type: ProxyType,
    pub status: ProxyStatus,
    pub score: f64,
    pub avg_latency_ms: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_requests: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_tested_at: Option<String>,
    pub created_at: String,
}
