//! Database schema definitions
//!
//! All SQL schema definitions for the SmartScrape database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl sessions and their counters
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id TEXT PRIMARY KEY,
    config TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    seeds TEXT NOT NULL,
    status TEXT NOT NULL,
    urls_discovered INTEGER NOT NULL DEFAULT 0,
    urls_completed INTEGER NOT NULL DEFAULT 0,
    urls_failed INTEGER NOT NULL DEFAULT 0,
    urls_blocked INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_status ON crawl_sessions(status);

-- Per-session frontier and crawl results
CREATE TABLE IF NOT EXISTS crawl_urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES crawl_sessions(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    parent_url TEXT,
    depth INTEGER NOT NULL,
    page_number INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL,
    status_code INTEGER,
    title TEXT,
    text TEXT,
    markdown TEXT,
    metadata TEXT,
    links TEXT,
    media TEXT,
    extracted_data TEXT,
    stats TEXT,
    error_message TEXT,
    response_time_ms INTEGER,
    discovered_at TEXT NOT NULL,
    completed_at TEXT,
    UNIQUE(session_id, url)
);

CREATE INDEX IF NOT EXISTS idx_urls_claim ON crawl_urls(session_id, status, depth, discovered_at);

-- Egress proxy pool
CREATE TABLE IF NOT EXISTS proxies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    proxy_type TEXT NOT NULL,
    status TEXT NOT NULL,
    score REAL NOT NULL DEFAULT 0,
    avg_latency_ms REAL NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    total_requests INTEGER NOT NULL DEFAULT 0,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    last_tested_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_proxies_status_score ON proxies(status, score);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
