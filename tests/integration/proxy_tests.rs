//! Integration tests for the proxy health monitor

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use smartscrape::config::ProxyConfig;
use smartscrape::proxy::{ProbeOutcome, ProxyMonitor, ProxyProbe};
use smartscrape::state::HealthRating;
use smartscrape::storage::{share, with_storage, SharedStorage, SqliteStorage};
use smartscrape::ProxyStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Probe with a fixed latency that records how many probes overlap
#[derive(Default)]
struct Overlap {
    current: AtomicUsize,
    max: AtomicUsize,
}

#[async_trait]
impl ProxyProbe for Overlap {
    async fn probe(&self, _proxy_url: &str, _probe_url: &str, _timeout: Duration) -> ProbeOutcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ProbeOutcome::Success {
            latency: Duration::from_millis(20),
        }
    }
}

fn settings() -> ProxyConfig {
    ProxyConfig {
        batch_concurrency: 2,
        batch_pause_ms: 0,
        ..ProxyConfig::default()
    }
}

fn proxy_urls(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("http://10.0.0.{}:8080", i)).collect()
}

fn file_storage(dir: &TempDir) -> SharedStorage {
    share(SqliteStorage::new(&dir.path().join("proxies.db")).unwrap())
}

#[tokio::test]
async fn test_batch_respects_concurrency() {
    let probe = Arc::new(Overlap::default());
    let storage = share(SqliteStorage::new_in_memory().unwrap());
    let monitor = ProxyMonitor::new(storage, probe.clone(), settings());
    monitor.load(&proxy_urls(7), "test").unwrap();

    let report = monitor.test_all().await.unwrap();

    assert_eq!(report.tested, 7);
    assert_eq!(report.succeeded, 7);
    assert!(probe.max.load(Ordering::SeqCst) <= 2);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == ProxyStatus::Active));
}

#[tokio::test]
async fn test_score_tracks_success_then_failures() {
    let storage = share(SqliteStorage::new_in_memory().unwrap());
    let monitor = ProxyMonitor::new(storage.clone(), Arc::new(Overlap::default()), settings());
    monitor.load(&proxy_urls(1), "test").unwrap();
    let id = with_storage(&storage, |s| s.list_proxies()).unwrap()[0].id;

    let mut record = None;
    for _ in 0..10 {
        record = Some(
            monitor
                .record_outcome(
                    id,
                    &ProbeOutcome::Success {
                        latency: Duration::from_millis(150),
                    },
                )
                .unwrap(),
        );
    }
    let healthy = record.unwrap();
    assert!(healthy.score >= 90.0);
    assert_eq!(healthy.status, ProxyStatus::Active);
    assert_eq!(HealthRating::from_score(healthy.score), HealthRating::Excellent);
    assert_eq!(monitor.best_proxy().unwrap().map(|p| p.id), Some(id));

    let mut record = healthy.clone();
    for _ in 0..5 {
        record = monitor
            .record_outcome(
                id,
                &ProbeOutcome::Failure {
                    error: "timeout".to_string(),
                },
            )
            .unwrap();
    }

    assert_eq!(record.consecutive_failures, 5);
    assert!(record.score < healthy.score);
    assert_eq!(record.status, ProxyStatus::Inactive);
    assert!(monitor.best_proxy().unwrap().is_none());
}

#[tokio::test]
async fn test_cleanup_prunes_stale_and_failing_proxies() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    let monitor = ProxyMonitor::new(storage.clone(), Arc::new(Overlap::default()), settings());
    monitor.load(&proxy_urls(3), "test").unwrap();

    let proxies = with_storage(&storage, |s| s.list_proxies()).unwrap();
    for _ in 0..=settings().max_consecutive_failures {
        monitor
            .record_outcome(
                proxies[0].id,
                &ProbeOutcome::Failure {
                    error: "refused".to_string(),
                },
            )
            .unwrap();
    }
    monitor
        .record_outcome(
            proxies[1].id,
            &ProbeOutcome::Success {
                latency: Duration::from_millis(100),
            },
        )
        .unwrap();

    assert_eq!(monitor.cleanup(Utc::now()).unwrap(), 1);
    let remaining = with_storage(&storage, |s| s.list_proxies()).unwrap();
    assert_eq!(remaining.len(), 2);

    let later = Utc::now() + ChronoDuration::hours(settings().retention_hours as i64 + 1);
    assert_eq!(monitor.cleanup(later).unwrap(), 2);

    drop(monitor);
    drop(storage);
    let reopened = file_storage(&dir);
    assert!(with_storage(&reopened, |s| s.list_proxies()).unwrap().is_empty());
}
