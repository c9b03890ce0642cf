//! Session progress and statistics
//!
//! Progress is a pure projection of the session record. Statistics add a pass
//! over the session's URLs for the CLI `--stats` view.

use crate::state::{SessionStatus, UrlStatus};
use crate::storage::{CrawlUrlRecord, SessionRecord, Storage};
use crate::ScrapeError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Progress of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub session_id: String,
    pub status: SessionStatus,
    pub discovered: u64,
    pub completed: u64,
    pub failed: u64,
    pub blocked: u64,
    /// Finished URLs as a share of discovered ones, 0-100
    pub percentage: f64,
}

impl Progress {
    pub fn from_session(session: &SessionRecord) -> Self {
        let percentage = if session.status == SessionStatus::Completed {
            100.0
        } else if session.urls_discovered == 0 {
            0.0
        } else {
            (session.urls_finished() as f64 / session.urls_discovered as f64 * 100.0).min(100.0)
        };

        Self {
            session_id: session.id.clone(),
            status: session.status,
            discovered: session.urls_discovered,
            completed: session.urls_completed,
            failed: session.urls_failed,
            blocked: session.urls_blocked,
            percentage,
        }
    }

    /// URLs not yet finished
    pub fn remaining(&self) -> u64 {
        self.discovered
            .saturating_sub(self.completed + self.failed + self.blocked)
    }
}

/// Session statistics for the CLI
#[derive(Debug, Clone)]
pub struct SessionStatistics {
    pub progress: Progress,
    /// URL count per depth
    pub depth_breakdown: BTreeMap<u32, u64>,
    /// Mean response time over URLs with a recorded time
    pub average_response_ms: Option<f64>,
    /// Distinct error messages with their counts, most frequent first
    pub error_summary: Vec<(String, u64)>,
    /// Pages reached through pagination (page number above 1)
    pub paginated_pages: u64,
}

/// Loads statistics for a session
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `session_id` - The session to summarize
///
/// # Returns
///
/// * `Ok(SessionStatistics)` - Successfully loaded statistics
/// * `Err(ScrapeError)` - Failed to query storage
pub fn load_statistics<S: Storage + ?Sized>(
    storage: &S,
    session_id: &str,
) -> Result<SessionStatistics, ScrapeError> {
    let session = storage.get_session(session_id)?;
    let urls = storage.list_urls(session_id)?;
    Ok(summarize(&session, &urls))
}

fn summarize(session: &SessionRecord, urls: &[CrawlUrlRecord]) -> SessionStatistics {
    let mut depth_breakdown = BTreeMap::new();
    let mut errors: HashMap<&str, u64> = HashMap::new();
    let mut total_ms = 0u64;
    let mut timed = 0u64;
    let mut paginated_pages = 0;

    for url in urls {
        *depth_breakdown.entry(url.depth).or_insert(0) += 1;
        if let Some(ms) = url.response_time_ms {
            total_ms += ms;
            timed += 1;
        }
        if let Some(error) = url.error_message.as_deref() {
            *errors.entry(error).or_insert(0) += 1;
        }
        if url.page_number > 1 {
            paginated_pages += 1;
        }
    }

    let mut error_summary: Vec<(String, u64)> = errors
        .into_iter()
        .map(|(message, count)| (message.to_string(), count))
        .collect();
    error_summary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    SessionStatistics {
        progress: Progress::from_session(session),
        depth_breakdown,
        average_response_ms: (timed > 0).then(|| total_ms as f64 / timed as f64),
        error_summary,
        paginated_pages,
    }
}

/// Prints a one-line progress report
pub fn print_progress(progress: &Progress) {
    println!(
        "Session {} [{}]: {:.1}% ({} completed, {} failed, {} blocked of {} discovered)",
        progress.session_id,
        progress.status,
        progress.percentage,
        progress.completed,
        progress.failed,
        progress.blocked,
        progress.discovered
    );
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SessionStatistics) {
    let progress = &stats.progress;
    println!("=== Session {} ===\n", progress.session_id);

    println!("Overview:");
    println!("  Status: {}", progress.status);
    println!("  URLs discovered: {}", progress.discovered);
    println!("  Progress: {:.1}%", progress.percentage);
    if let Some(ms) = stats.average_response_ms {
        println!("  Average response time: {:.0} ms", ms);
    }
    println!();

    println!("URLs by Status:");
    for (status, count) in [
        (UrlStatus::Completed, progress.completed),
        (UrlStatus::Failed, progress.failed),
        (UrlStatus::Blocked, progress.blocked),
    ] {
        let percentage = if progress.discovered > 0 {
            (count as f64 / progress.discovered as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!("  remaining: {}", progress.remaining());
    println!();

    if !stats.depth_breakdown.is_empty() {
        println!("URLs by Depth:");
        for (depth, count) in &stats.depth_breakdown {
            println!("  {}: {}", depth, count);
        }
        if stats.paginated_pages > 0 {
            println!("  (pagination follow-ups: {})", stats.paginated_pages);
        }
        println!();
    }

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        for (message, count) in stats.error_summary.iter().take(10) {
            println!("  {} x {}", count, message);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::storage::{SqliteStorage, UrlOutcome};

    fn session(status: SessionStatus, discovered: u64, finished: u64) -> SessionRecord {
        SessionRecord {
            id: "s".to_string(),
            config: SessionConfig::default(),
            config_hash: String::new(),
            seeds: Vec::new(),
            status,
            urls_discovered: discovered,
            urls_completed: finished,
            urls_failed: 0,
            urls_blocked: 0,
            error_message: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_percentage() {
        assert_eq!(Progress::from_session(&session(SessionStatus::Running, 0, 0)).percentage, 0.0);
        assert_eq!(Progress::from_session(&session(SessionStatus::Running, 4, 1)).percentage, 25.0);
        assert_eq!(
            Progress::from_session(&session(SessionStatus::Completed, 0, 0)).percentage,
            100.0
        );
        assert_eq!(Progress::from_session(&session(SessionStatus::Running, 4, 1)).remaining(), 3);
    }

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let seeds = vec!["https://a.com/".to_string(), "https://a.com/b".to_string()];
        let s = storage
            .create_session(&SessionConfig::default(), "h", &seeds)
            .unwrap();

        let first = storage.claim_next_url(&s.id).unwrap().unwrap();
        storage
            .record_url_outcome(first.id, &UrlOutcome::failed("timeout", 100))
            .unwrap();
        let second = storage.claim_next_url(&s.id).unwrap().unwrap();
        storage
            .record_url_outcome(second.id, &UrlOutcome::failed("timeout", 300))
            .unwrap();

        let stats = load_statistics(&storage, &s.id).unwrap();
        assert_eq!(stats.progress.failed, 2);
        assert_eq!(stats.depth_breakdown.get(&0), Some(&2));
        assert_eq!(stats.average_response_ms, Some(200.0));
        assert_eq!(stats.error_summary, vec![("timeout".to_string(), 2)]);
    }
}
