//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::config::SessionConfig;
use crate::state::{ProxyStatus, ProxyType, SessionStatus, UrlStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{now_timestamp, CrawlUrlRecord, ProxyRecord, SessionRecord, UrlOutcome};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;

const SESSION_COLUMNS: &str = "id, config, config_hash, seeds, status, urls_discovered, \
     urls_completed, urls_failed, urls_blocked, error_message, created_at, started_at, finished_at";

const URL_COLUMNS: &str = "id, session_id, url, parent_url, depth, page_number, status, \
     status_code, title, text, markdown, metadata, links, media, extracted_data, stats, \
     error_message, response_time_ms, discovered_at, completed_at";

const PROXY_COLUMNS: &str = "id, url, source, proxy_type, status, score, avg_latency_ms, \
     success_count, failure_count, total_requests, consecutive_failures, last_error, \
     last_tested_at, created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Reads a JSON text column, treating NULL as absent
fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn count_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        config: json_column(row, 1)?.unwrap_or_default(),
        config_hash: row.get(2)?,
        seeds: json_column(row, 3)?.unwrap_or_default(),
        status: SessionStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(SessionStatus::Failed),
        urls_discovered: count_column(row, 5)?,
        urls_completed: count_column(row, 6)?,
        urls_failed: count_column(row, 7)?,
        urls_blocked: count_column(row, 8)?,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
        started_at: row.get(11)?,
        finished_at: row.get(12)?,
    })
}

fn url_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlUrlRecord> {
    Ok(CrawlUrlRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        url: row.get(2)?,
        parent_url: row.get(3)?,
        depth: row.get(4)?,
        page_number: row.get(5)?,
        status: UrlStatus::from_db_string(&row.get::<_, String>(6)?).unwrap_or(UrlStatus::Failed),
        status_code: row.get(7)?,
        title: row.get(8)?,
        text: row.get(9)?,
        markdown: row.get(10)?,
        metadata: json_column(row, 11)?,
        links: json_column(row, 12)?.unwrap_or_default(),
        media: json_column(row, 13)?.unwrap_or_default(),
        extracted_data: json_column(row, 14)?,
        stats: json_column(row, 15)?,
        error_message: row.get(16)?,
        response_time_ms: row.get::<_, Option<i64>>(17)?.map(|ms| ms.max(0) as u64),
        discovered_at: row.get(18)?,
        completed_at: row.get(19)?,
    })
}

fn proxy_from_row(row: &Row<'_>) -> rusqlite::Result<ProxyRecord> {
    Ok(ProxyRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        source: row.get(2)?,
        proxy_type: ProxyType::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(ProxyType::Http),
        status: ProxyStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(ProxyStatus::Inactive),
        score: row.get(5)?,
        avg_latency_ms: row.get(6)?,
        success_count: count_column(row, 7)?,
        failure_count: count_column(row, 8)?,
        total_requests: count_column(row, 9)?,
        consecutive_failures: row.get(10)?,
        last_error: row.get(11)?,
        last_tested_at: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Inserts frontier entries within an open transaction
///
/// Returns the number of rows inserted and bumps `urls_discovered` by it.
fn insert_urls(
    tx: &Transaction<'_>,
    session_id: &str,
    parent_url: Option<&str>,
    depth: u32,
    page_number: u32,
    urls: &[String],
    max_urls: u32,
) -> StorageResult<usize> {
    let existing: i64 = tx.query_row(
        "SELECT COUNT(*) FROM crawl_urls WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    let mut remaining = (i64::from(max_urls) - existing).max(0) as usize;
    if remaining == 0 {
        return Ok(0);
    }

    let mut inserted = 0;
    let mut seen = HashSet::new();
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO crawl_urls
             (session_id, url, parent_url, depth, page_number, status, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        for url in urls {
            if remaining == 0 {
                break;
            }
            if !seen.insert(url.as_str()) {
                continue;
            }
            let changed = stmt.execute(params![
                session_id,
                url,
                parent_url,
                depth,
                page_number,
                UrlStatus::Discovered.to_db_string(),
                now_timestamp(),
            ])?;
            inserted += changed;
            remaining -= changed;
        }
    }

    if inserted > 0 {
        tx.execute(
            "UPDATE crawl_sessions SET urls_discovered = urls_discovered + ?1 WHERE id = ?2",
            params![inserted as i64, session_id],
        )?;
    }

    Ok(inserted)
}

impl Storage for SqliteStorage {
    // ===== Sessions =====

    fn create_session(
        &mut self,
        config: &SessionConfig,
        config_hash: &str,
        seeds: &[String],
    ) -> StorageResult<SessionRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO crawl_sessions (id, config, config_hash, seeds, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                to_json(config)?,
                config_hash,
                to_json(&seeds)?,
                SessionStatus::Pending.to_db_string(),
                now_timestamp(),
            ],
        )?;

        insert_urls(&tx, &id, None, 0, 1, seeds, config.max_urls)?;
        tx.commit()?;

        self.get_session(&id)
    }

    fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM crawl_sessions WHERE id = ?1", SESSION_COLUMNS),
                params![session_id],
                session_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }

    fn list_sessions(&self) -> StorageResult<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_sessions ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn update_session_status(
        &mut self,
        session_id: &str,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = now_timestamp();
        let started = (status == SessionStatus::Running).then(|| now.clone());
        let finished = status.is_terminal().then_some(now);

        let changed = self.conn.execute(
            "UPDATE crawl_sessions SET
                status = ?1,
                started_at = COALESCE(started_at, ?2),
                finished_at = COALESCE(?3, finished_at),
                error_message = COALESCE(?4, error_message)
             WHERE id = ?5",
            params![
                status.to_db_string(),
                started,
                finished,
                error_message,
                session_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    fn transition_session_status(
        &mut self,
        session_id: &str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> StorageResult<bool> {
        let now = now_timestamp();
        let started = (to == SessionStatus::Running).then(|| now.clone());
        let finished = to.is_terminal().then_some(now);

        let changed = self.conn.execute(
            "UPDATE crawl_sessions SET
                status = ?1,
                started_at = COALESCE(started_at, ?2),
                finished_at = COALESCE(?3, finished_at)
             WHERE id = ?4 AND status = ?5",
            params![
                to.to_db_string(),
                started,
                finished,
                session_id,
                from.to_db_string()
            ],
        )?;

        if changed == 0 {
            // Distinguishes a lost race from a missing session
            self.get_session(session_id)?;
            return Ok(false);
        }
        Ok(true)
    }

    // ===== Frontier =====

    fn requeue_processing(&mut self, session_id: &str) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE crawl_urls SET status = ?1 WHERE session_id = ?2 AND status = ?3",
            params![
                UrlStatus::Discovered.to_db_string(),
                session_id,
                UrlStatus::Processing.to_db_string()
            ],
        )?;
        Ok(changed)
    }

    fn claim_next_url(&mut self, session_id: &str) -> StorageResult<Option<CrawlUrlRecord>> {
        let tx = self.conn.transaction()?;

        let next: Option<i64> = tx
            .query_row(
                "SELECT id FROM crawl_urls
                 WHERE session_id = ?1 AND status = ?2
                 ORDER BY depth ASC, discovered_at ASC, id ASC
                 LIMIT 1",
                params![session_id, UrlStatus::Discovered.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(url_id) = next else {
            return Ok(None);
        };

        let claimed = tx.execute(
            "UPDATE crawl_urls SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                UrlStatus::Processing.to_db_string(),
                url_id,
                UrlStatus::Discovered.to_db_string()
            ],
        )?;

        if claimed == 0 {
            return Ok(None);
        }

        let record = tx.query_row(
            &format!("SELECT {} FROM crawl_urls WHERE id = ?1", URL_COLUMNS),
            params![url_id],
            url_from_row,
        )?;
        tx.commit()?;

        Ok(Some(record))
    }

    fn release_url(&mut self, url_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE crawl_urls SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                UrlStatus::Discovered.to_db_string(),
                url_id,
                UrlStatus::Processing.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn record_url_outcome(&mut self, url_id: i64, outcome: &UrlOutcome) -> StorageResult<()> {
        let counter = match outcome.status {
            UrlStatus::Completed => "urls_completed",
            UrlStatus::Failed => "urls_failed",
            UrlStatus::Blocked => "urls_blocked",
            UrlStatus::Discovered | UrlStatus::Processing => {
                return Err(StorageError::UrlNotClaimed(url_id));
            }
        };

        let content = outcome.content.as_ref();
        let metadata = content.map(|c| to_json(&c.metadata)).transpose()?;
        let links = content.map(|c| to_json(&c.links)).transpose()?;
        let media = content.map(|c| to_json(&c.media)).transpose()?;
        let extracted = content
            .and_then(|c| c.extracted_data.as_ref())
            .map(to_json)
            .transpose()?;
        let stats = content.map(|c| to_json(&c.stats)).transpose()?;

        let tx = self.conn.transaction()?;

        let session_id: String = tx
            .query_row(
                "SELECT session_id FROM crawl_urls WHERE id = ?1",
                params![url_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::UrlNotFound(url_id))?;

        let changed = tx.execute(
            "UPDATE crawl_urls SET
                status = ?1, status_code = ?2, title = ?3, text = ?4, markdown = ?5,
                metadata = ?6, links = ?7, media = ?8, extracted_data = ?9, stats = ?10,
                error_message = ?11, response_time_ms = ?12, completed_at = ?13
             WHERE id = ?14 AND status = ?15",
            params![
                outcome.status.to_db_string(),
                outcome.status_code,
                content.and_then(|c| c.title.as_deref()),
                content.map(|c| c.text.as_str()),
                content.and_then(|c| c.markdown.as_deref()),
                metadata,
                links,
                media,
                extracted,
                stats,
                outcome.error_message,
                outcome.response_time_ms as i64,
                now_timestamp(),
                url_id,
                UrlStatus::Processing.to_db_string(),
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::UrlNotClaimed(url_id));
        }

        tx.execute(
            &format!(
                "UPDATE crawl_sessions SET {counter} = {counter} + 1 WHERE id = ?1",
                counter = counter
            ),
            params![session_id],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn enqueue_urls(
        &mut self,
        session_id: &str,
        parent_url: Option<&str>,
        depth: u32,
        page_number: u32,
        urls: &[String],
        max_urls: u32,
    ) -> StorageResult<usize> {
        if urls.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let inserted = insert_urls(
            &tx,
            session_id,
            parent_url,
            depth,
            page_number,
            urls,
            max_urls,
        )?;
        tx.commit()?;
        Ok(inserted)
    }

    fn get_url(&self, url_id: i64) -> StorageResult<CrawlUrlRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM crawl_urls WHERE id = ?1", URL_COLUMNS),
                params![url_id],
                url_from_row,
            )
            .optional()?
            .ok_or(StorageError::UrlNotFound(url_id))
    }

    fn list_urls(&self, session_id: &str) -> StorageResult<Vec<CrawlUrlRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_urls WHERE session_id = ?1 ORDER BY id",
            URL_COLUMNS
        ))?;
        let urls = stmt
            .query_map(params![session_id], url_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }

    fn count_urls_by_status(&self, session_id: &str, status: UrlStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_urls WHERE session_id = ?1 AND status = ?2",
            params![session_id, status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn url_exists(&self, session_id: &str, url: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM crawl_urls WHERE session_id = ?1 AND url = ?2",
                params![session_id, url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ===== Proxies =====

    fn insert_proxy(
        &mut self,
        url: &str,
        source: &str,
        proxy_type: ProxyType,
    ) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO proxies (url, source, proxy_type, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                url,
                source,
                proxy_type.to_db_string(),
                ProxyStatus::Inactive.to_db_string(),
                now_timestamp()
            ],
        )?;
        Ok(changed > 0)
    }

    fn list_proxies(&self) -> StorageResult<Vec<ProxyRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM proxies ORDER BY score DESC, id ASC",
            PROXY_COLUMNS
        ))?;
        let proxies = stmt
            .query_map([], proxy_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(proxies)
    }

    fn get_proxy(&self, proxy_id: i64) -> StorageResult<ProxyRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM proxies WHERE id = ?1", PROXY_COLUMNS),
                params![proxy_id],
                proxy_from_row,
            )
            .optional()?
            .ok_or(StorageError::ProxyNotFound(proxy_id))
    }

    fn set_proxy_status(&mut self, proxy_id: i64, status: ProxyStatus) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE proxies SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), proxy_id],
        )?;
        if changed == 0 {
            return Err(StorageError::ProxyNotFound(proxy_id));
        }
        Ok(())
    }

    fn update_proxy(
        &mut self,
        proxy_id: i64,
        update: &mut dyn FnMut(&mut ProxyRecord),
    ) -> StorageResult<ProxyRecord> {
        let tx = self.conn.transaction()?;

        let mut record = tx
            .query_row(
                &format!("SELECT {} FROM proxies WHERE id = ?1", PROXY_COLUMNS),
                params![proxy_id],
                proxy_from_row,
            )
            .optional()?
            .ok_or(StorageError::ProxyNotFound(proxy_id))?;

        update(&mut record);

        tx.execute(
            "UPDATE proxies SET
                status = ?1, score = ?2, avg_latency_ms = ?3, success_count = ?4,
                failure_count = ?5, total_requests = ?6, consecutive_failures = ?7,
                last_error = ?8, last_tested_at = ?9
             WHERE id = ?10",
            params![
                record.status.to_db_string(),
                record.score,
                record.avg_latency_ms,
                record.success_count as i64,
                record.failure_count as i64,
                record.total_requests as i64,
                record.consecutive_failures,
                record.last_error,
                record.last_tested_at,
                proxy_id,
            ],
        )?;
        tx.commit()?;

        Ok(record)
    }

    fn best_active_proxy(&self) -> StorageResult<Option<ProxyRecord>> {
        let proxy = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM proxies WHERE status = ?1
                     ORDER BY score DESC, avg_latency_ms ASC, id ASC LIMIT 1",
                    PROXY_COLUMNS
                ),
                params![ProxyStatus::Active.to_db_string()],
                proxy_from_row,
            )
            .optional()?;
        Ok(proxy)
    }

    fn delete_proxy(&mut self, proxy_id: i64) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM proxies WHERE id = ?1", params![proxy_id])?;
        Ok(())
    }
}
