//! Proxy health scoring
//!
//! The score is a weighted sum of four 0-100 terms:
//!
//! | term | weight | definition |
//! |---|---|---|
//! | success rate | 0.4 | successes / total requests |
//! | responsiveness | 0.3 | 100 at <= 200 ms average latency, 0 at >= 5 s, linear between |
//! | reliability | 0.2 | 100 minus 20 per consecutive failure |
//! | uptime | 0.1 | 100 while the latest probe succeeded, else 0 |
//!
//! Status is a pure function of the score and the consecutive failure count.

use crate::state::{HealthRating, ProxyStatus};
use crate::storage::ProxyRecord;
use std::time::Duration;

const FAST_LATENCY_MS: f64 = 200.0;
const SLOW_LATENCY_MS: f64 = 5000.0;
const RELIABILITY_PENALTY: f64 = 20.0;

/// Consecutive failures after which a proxy is marked failed outright
pub const FAILED_AFTER_CONSECUTIVE_FAILURES: u32 = 10;

/// Lowest score at which a proxy is active
pub const ACTIVE_SCORE: f64 = 60.0;

/// Result of one request made through a proxy
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success { latency: Duration },
    Failure { error: String },
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

fn success_rate(record: &ProxyRecord) -> f64 {
    if record.total_requests == 0 {
        return 0.0;
    }
    record.success_count as f64 / record.total_requests as f64 * 100.0
}

fn responsiveness(record: &ProxyRecord) -> f64 {
    if record.success_count == 0 {
        return 0.0;
    }
    let latency = record.avg_latency_ms;
    if latency <= FAST_LATENCY_MS {
        100.0
    } else if latency >= SLOW_LATENCY_MS {
        0.0
    } else {
        (SLOW_LATENCY_MS - latency) / (SLOW_LATENCY_MS - FAST_LATENCY_MS) * 100.0
    }
}

fn reliability(record: &ProxyRecord) -> f64 {
    (100.0 - RELIABILITY_PENALTY * f64::from(record.consecutive_failures)).max(0.0)
}

fn uptime(record: &ProxyRecord) -> f64 {
    if record.consecutive_failures == 0 && record.success_count > 0 {
        100.0
    } else {
        0.0
    }
}

/// Computes the 0-100 health score of a proxy
pub fn health_score(record: &ProxyRecord) -> f64 {
    let score = 0.4 * success_rate(record)
        + 0.3 * responsiveness(record)
        + 0.2 * reliability(record)
        + 0.1 * uptime(record);
    score.clamp(0.0, 100.0)
}

/// Derives the availability status from a score
pub fn status_for(score: f64, consecutive_failures: u32) -> ProxyStatus {
    if consecutive_failures >= FAILED_AFTER_CONSECUTIVE_FAILURES {
        ProxyStatus::Failed
    } else if score >= ACTIVE_SCORE {
        ProxyStatus::Active
    } else {
        ProxyStatus::Inactive
    }
}

pub fn rating(record: &ProxyRecord) -> HealthRating {
    HealthRating::from_score(record.score)
}

/// Folds one probe result into a proxy's rolling metrics
///
/// Updates counters, the incremental mean latency over successful requests,
/// the score and the derived status.
pub fn apply_probe(record: &mut ProxyRecord, outcome: &ProbeOutcome, tested_at: &str) {
    record.total_requests += 1;

    match outcome {
        ProbeOutcome::Success { latency } => {
            record.success_count += 1;
            record.consecutive_failures = 0;
            record.last_error = None;

            let latency_ms = latency.as_secs_f64() * 1000.0;
            record.avg_latency_ms +=
                (latency_ms - record.avg_latency_ms) / record.success_count as f64;
        }
        ProbeOutcome::Failure { error } => {
            record.failure_count += 1;
            record.consecutive_failures = record.consecutive_failures.saturating_add(1);
            record.last_error = Some(error.clone());
        }
    }

    record.score = health_score(record);
    record.status = status_for(record.score, record.consecutive_failures);
    record.last_tested_at = Some(tested_at.to_string());
}
