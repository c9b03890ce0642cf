//! Proxy health monitor
//!
//! Probes proxies one at a time or in bounded-concurrency batches, folds each
//! result into the stored metrics and prunes proxies that stopped working.
//! A failed probe is a value, never an error: only storage failures escape.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use reqwest::{Client, Proxy};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ProxyConfig;
use crate::proxy::health::{apply_probe, rating, ProbeOutcome};
use crate::state::{HealthRating, ProxyStatus, ProxyType};
use crate::storage::{now_timestamp, with_storage, ProxyRecord, SharedStorage, StorageResult};

/// Issues one request through a proxy
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(&self, proxy_url: &str, probe_url: &str, timeout: Duration) -> ProbeOutcome;
}

/// Probe that GETs the probe URL through the proxy with reqwest
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpProbe;

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn probe(&self, proxy_url: &str, probe_url: &str, timeout: Duration) -> ProbeOutcome {
        let client = match Proxy::all(proxy_url)
            .and_then(|proxy| Client::builder().proxy(proxy).timeout(timeout).build())
        {
            Ok(client) => client,
            Err(e) => {
                return ProbeOutcome::Failure {
                    error: format!("Invalid proxy '{}': {}", proxy_url, e),
                }
            }
        };

        let start = Instant::now();
        match client.get(probe_url).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Success {
                latency: start.elapsed(),
            },
            Ok(response) => ProbeOutcome::Failure {
                error: format!("HTTP {}", response.status().as_u16()),
            },
            Err(e) => ProbeOutcome::Failure {
                error: e.to_string(),
            },
        }
    }
}

/// Result of testing one proxy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyTestResult {
    pub proxy_id: i64,
    pub url: String,
    pub success: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub score: f64,
    pub status: ProxyStatus,
    pub rating: HealthRating,
}

/// Aggregate of a batch test
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchTestReport {
    pub results: Vec<ProxyTestResult>,
    pub tested: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Proxies whose result could not be recorded
    pub errors: usize,
    pub average_latency_ms: Option<f64>,
    pub elapsed_ms: u64,
}

/// Maintains the scored proxy pool
pub struct ProxyMonitor {
    storage: SharedStorage,
    probe: Arc<dyn ProxyProbe>,
    settings: ProxyConfig,
}

impl ProxyMonitor {
    pub fn new(storage: SharedStorage, probe: Arc<dyn ProxyProbe>, settings: ProxyConfig) -> Self {
        Self {
            storage,
            probe,
            settings,
        }
    }

    /// Creates a monitor that probes over real HTTP
    pub fn with_http_probe(storage: SharedStorage, settings: ProxyConfig) -> Self {
        Self::new(storage, Arc::new(HttpProbe), settings)
    }

    pub fn settings(&self) -> &ProxyConfig {
        &self.settings
    }

    /// Adds proxies to the pool
    ///
    /// URLs with an unsupported scheme are skipped with a warning.
    ///
    /// # Returns
    ///
    /// The number of proxies newly inserted
    pub fn load(&self, urls: &[String], source: &str) -> StorageResult<usize> {
        let mut inserted = 0;
        for raw in urls {
            let proxy_type = ::url::Url::parse(raw)
                .ok()
                .and_then(|u| ProxyType::from_scheme(u.scheme()));

            let Some(proxy_type) = proxy_type else {
                tracing::warn!("Skipping proxy with unsupported URL: {}", raw);
                continue;
            };

            if with_storage(&self.storage, |s| s.insert_proxy(raw, source, proxy_type))? {
                inserted += 1;
            }
        }

        tracing::info!("Loaded {} new proxies from {}", inserted, source);
        Ok(inserted)
    }

    /// Tests one proxy against the configured probe URL
    pub async fn test(&self, proxy: &ProxyRecord) -> StorageResult<ProxyTestResult> {
        self.test_with(proxy, &self.settings.probe_url).await
    }

    /// Tests one proxy against a given probe URL and records the result
    pub async fn test_with(
        &self,
        proxy: &ProxyRecord,
        probe_url: &str,
    ) -> StorageResult<ProxyTestResult> {
        with_storage(&self.storage, |s| {
            s.set_proxy_status(proxy.id, ProxyStatus::Testing)
        })?;

        let timeout = Duration::from_secs(self.settings.test_timeout_secs);
        let outcome = self.probe.probe(&proxy.url, probe_url, timeout).await;

        let updated = self.record_outcome(proxy.id, &outcome)?;

        let (latency_ms, error) = match &outcome {
            ProbeOutcome::Success { latency } => (Some(latency.as_millis() as u64), None),
            ProbeOutcome::Failure { error } => (None, Some(error.clone())),
        };

        tracing::debug!(
            "Proxy {} tested: success={}, score={:.1}, status={}",
            updated.url,
            outcome.is_success(),
            updated.score,
            updated.status
        );

        Ok(ProxyTestResult {
            proxy_id: updated.id,
            url: updated.url.clone(),
            success: outcome.is_success(),
            latency_ms,
            error,
            score: updated.score,
            status: updated.status,
            rating: rating(&updated),
        })
    }

    /// Tests proxies in chunks of `concurrency`, pausing between chunks
    ///
    /// A proxy whose result cannot be recorded is counted in `errors`; the
    /// batch always runs to the end.
    pub async fn batch_test(&self, proxies: &[ProxyRecord], concurrency: usize) -> BatchTestReport {
        let start = Instant::now();
        let concurrency = concurrency.max(1);
        let pause = Duration::from_millis(self.settings.batch_pause_ms);
        let mut report = BatchTestReport::default();

        let chunks: Vec<&[ProxyRecord]> = proxies.chunks(concurrency).collect();
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let results = join_all(chunk.iter().map(|proxy| self.test(proxy))).await;

            for (proxy, result) in chunk.iter().zip(results) {
                match result {
                    Ok(result) => report.results.push(result),
                    Err(e) => {
                        tracing::warn!("Failed to record test of proxy {}: {}", proxy.url, e);
                        report.errors += 1;
                    }
                }
            }

            if index + 1 < chunk_count && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        report.tested = report.results.len();
        report.succeeded = report.results.iter().filter(|r| r.success).count();
        report.failed = report.tested - report.succeeded;

        let latencies: Vec<u64> = report.results.iter().filter_map(|r| r.latency_ms).collect();
        if !latencies.is_empty() {
            report.average_latency_ms =
                Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64);
        }
        report.elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Batch test finished: {} tested, {} ok, {} failed, {} errors",
            report.tested,
            report.succeeded,
            report.failed,
            report.errors
        );

        report
    }

    /// Tests every proxy in the pool
    pub async fn test_all(&self) -> StorageResult<BatchTestReport> {
        let proxies = with_storage(&self.storage, |s| s.list_proxies())?;
        Ok(self
            .batch_test(&proxies, self.settings.batch_concurrency)
            .await)
    }

    /// Folds a probe or crawl-traffic outcome into a proxy's metrics
    pub fn record_outcome(
        &self,
        proxy_id: i64,
        outcome: &ProbeOutcome,
    ) -> StorageResult<ProxyRecord> {
        let tested_at = now_timestamp();
        with_storage(&self.storage, |s| {
            s.update_proxy(proxy_id, &mut |record: &mut ProxyRecord| {
                apply_probe(record, outcome, &tested_at)
            })
        })
    }

    /// Best active proxy, if any
    pub fn best_proxy(&self) -> StorageResult<Option<ProxyRecord>> {
        with_storage(&self.storage, |s| s.best_active_proxy())
    }

    /// Removes proxies that stopped being useful
    ///
    /// A proxy is removed when its consecutive failures exceed the configured
    /// maximum, when it has been tested and scores below the floor, or when
    /// it has not been tested within the retention window.
    ///
    /// # Returns
    ///
    /// The number of proxies removed
    pub fn cleanup(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let retention = ChronoDuration::hours(self.settings.retention_hours as i64);
        let proxies = with_storage(&self.storage, |s| s.list_proxies())?;

        let mut removed = 0;
        for proxy in proxies {
            if let Some(reason) = self.removal_reason(&proxy, now, retention) {
                tracing::info!("Removing proxy {}: {}", proxy.url, reason);
                with_storage(&self.storage, |s| s.delete_proxy(proxy.id))?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn removal_reason(
        &self,
        proxy: &ProxyRecord,
        now: DateTime<Utc>,
        retention: ChronoDuration,
    ) -> Option<String> {
        if proxy.consecutive_failures > self.settings.max_consecutive_failures {
            return Some(format!("{} consecutive failures", proxy.consecutive_failures));
        }

        if proxy.total_requests > 0 && proxy.score < self.settings.min_score {
            return Some(format!("score {:.1} below {}", proxy.score, self.settings.min_score));
        }

        let last_seen = proxy
            .last_tested_at
            .as_deref()
            .unwrap_or(&proxy.created_at);
        match DateTime::parse_from_rfc3339(last_seen) {
            Ok(at) if now.signed_duration_since(at.with_timezone(&Utc)) > retention => {
                Some(format!("untested since {}", last_seen))
            }
            Ok(_) => None,
            Err(_) => Some(format!("unreadable test timestamp '{}'", last_seen)),
        }
    }
}
