//! Session export
//!
//! Two projections of a session's URLs: a nested JSON document that reads back
//! into the same records, and a flat CSV table with one row per URL.

use crate::storage::{now_timestamp, CrawlUrlRecord, SessionRecord, Storage};
use crate::ScrapeError;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// A session and every URL it discovered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub exported_at: String,
    pub session: SessionRecord,
    pub urls: Vec<CrawlUrlRecord>,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: i64,
    url: &'a str,
    parent_url: Option<&'a str>,
    depth: u32,
    page_number: u32,
    status: &'static str,
    title: Option<&'a str>,
    text_length: usize,
    links_count: usize,
    media_count: usize,
    response_time_ms: Option<u64>,
    error_message: Option<&'a str>,
    extracted_data: Option<String>,
}

impl<'a> CsvRow<'a> {
    fn from_record(record: &'a CrawlUrlRecord) -> Self {
        Self {
            id: record.id,
            url: &record.url,
            parent_url: record.parent_url.as_deref(),
            depth: record.depth,
            page_number: record.page_number,
            status: record.status.to_db_string(),
            title: record.title.as_deref(),
            text_length: record.text.as_ref().map_or(0, |t| t.chars().count()),
            links_count: record.links.len(),
            media_count: record.media.len(),
            response_time_ms: record.response_time_ms,
            error_message: record.error_message.as_deref(),
            extracted_data: record.extracted_data.as_ref().map(|v| v.to_string()),
        }
    }
}

/// Loads a session and its URLs
pub fn build_export<S: Storage + ?Sized>(
    storage: &S,
    session_id: &str,
) -> Result<SessionExport, ScrapeError> {
    let session = storage.get_session(session_id)?;
    let urls = storage.list_urls(session_id)?;
    Ok(SessionExport {
        exported_at: now_timestamp(),
        session,
        urls,
    })
}

/// Exports a session as pretty-printed JSON
pub fn export_json<S: Storage + ?Sized>(
    storage: &S,
    session_id: &str,
) -> Result<String, ScrapeError> {
    let export = build_export(storage, session_id)?;
    Ok(serde_json::to_string_pretty(&export)?)
}

/// Reads back a document produced by [`export_json`]
pub fn parse_export(json: &str) -> Result<SessionExport, ScrapeError> {
    Ok(serde_json::from_str(json)?)
}

/// Writes URL rows as CSV with a header line
pub fn write_csv<W: Write>(urls: &[CrawlUrlRecord], writer: W) -> Result<(), ScrapeError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in urls {
        csv_writer.serialize(CsvRow::from_record(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Exports a session's URLs as CSV
pub fn export_csv<S: Storage + ?Sized>(
    storage: &S,
    session_id: &str,
) -> Result<String, ScrapeError> {
    storage.get_session(session_id)?;
    let urls = storage.list_urls(session_id)?;

    let mut buffer = Vec::new();
    write_csv(&urls, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| ScrapeError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::extract::ExtractedContent;
    use crate::storage::{SqliteStorage, UrlOutcome};
    use serde_json::json;

    fn session_with_results() -> (SqliteStorage, String) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let seeds = vec!["https://a.com/".to_string(), "https://a.com/gone".to_string()];
        let session = storage
            .create_session(&SessionConfig::default(), "h", &seeds)
            .unwrap();

        let first = storage.claim_next_url(&session.id).unwrap().unwrap();
        let content = ExtractedContent {
            title: Some("Home, sweet \"home\"".to_string()),
            text: "hello".to_string(),
            links: vec!["https://a.com/x".to_string()],
            extracted_data: Some(json!({"price": "9.99"})),
            ..ExtractedContent::default()
        };
        storage
            .record_url_outcome(first.id, &UrlOutcome::completed(content, 200, 42))
            .unwrap();

        let second = storage.claim_next_url(&session.id).unwrap().unwrap();
        storage
            .record_url_outcome(second.id, &UrlOutcome::failed("HTTP 404", 7))
            .unwrap();

        (storage, session.id)
    }

    #[test]
    fn test_csv_rows() {
        let (storage, id) = session_with_results();
        let csv = export_csv(&storage, &id).unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());

        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers[0], "id");
        assert_eq!(headers.last().map(String::as_str), Some("extracted_data"));

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "https://a.com/");
        assert_eq!(&rows[0][5], "completed");
        assert_eq!(&rows[0][6], "Home, sweet \"home\"");
        assert_eq!(&rows[0][7], "5");
        assert_eq!(&rows[0][8], "1");
        assert_eq!(&rows[0][12], r#"{"price":"9.99"}"#);
        assert_eq!(&rows[1][5], "failed");
        assert_eq!(&rows[1][11], "HTTP 404");
        assert_eq!(&rows[1][12], "");
    }

    #[test]
    fn test_json_export_reads_back() {
        let (storage, id) = session_with_results();
        let json = export_json(&storage, &id).unwrap();
        let parsed = parse_export(&json).unwrap();

        assert_eq!(parsed.session, storage.get_session(&id).unwrap());
        assert_eq!(parsed.urls, storage.list_urls(&id).unwrap());
    }

    #[test]
    fn test_unknown_session() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(export_csv(&storage, "nope").is_err());
        assert!(export_json(&storage, "nope").is_err());
    }
}
