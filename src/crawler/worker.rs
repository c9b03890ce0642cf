//! Worker pool draining one session's frontier
//!
//! Workers share nothing but the storage handle, two atomics and the
//! cancellation token. A URL is owned by the worker whose claim moved it from
//! `discovered` to `processing`; the claim is a compare-and-set in storage.
//!
//! A worker exits when the session is cancelled, when another worker hit a
//! storage error, or when the frontier is empty and no worker holds a claim.

use crate::config::{RequiredFieldPolicy, SessionConfig};
use crate::crawler::egress::{EgressStrategy, ProxyEgress};
use crate::crawler::fetcher::{FetchOutcome, FetchReport, Fetcher};
use crate::crawler::link_filter::LinkFilter;
use crate::crawler::pagination::{detect_pagination, PaginationInfo};
use crate::extract::{extract, extract_links, ExtractedContent};
use crate::proxy::{ProbeOutcome, ProxyMonitor};
use crate::state::UrlStatus;
use crate::storage::{
    with_storage, CrawlUrlRecord, ProxyRecord, SessionRecord, SharedStorage, Storage,
    StorageError, UrlOutcome,
};
use crate::ScrapeError;
use rand::Rng;
use scraper::Html;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pause before re-checking an empty frontier while other workers are busy
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Counts of one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// URLs whose outcome was recorded
    pub processed: u64,
    /// Claims handed back because of cancellation
    pub released: u64,
}

struct WorkerContext {
    session_id: String,
    config: SessionConfig,
    storage: SharedStorage,
    fetcher: Fetcher,
    monitor: Option<Arc<ProxyMonitor>>,
    filter: Option<LinkFilter>,
    cancel: CancellationToken,
    in_flight: AtomicUsize,
    halted: AtomicBool,
    processed: AtomicU64,
    released: AtomicU64,
}

impl WorkerContext {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.halted.load(Ordering::SeqCst)
    }

    fn storage<T>(
        &self,
        op: impl FnOnce(&mut (dyn Storage + Send)) -> Result<T, StorageError>,
    ) -> Result<T, ScrapeError> {
        with_storage(&self.storage, op).map_err(|e| {
            self.halted.store(true, Ordering::SeqCst);
            ScrapeError::Storage(e)
        })
    }
}

/// Marks a worker as holding (or about to hold) a claim
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of the synchronous part of processing one page
struct PageAnalysis {
    content: ExtractedContent,
    links: Vec<String>,
    pagination: Option<PaginationInfo>,
}

/// Fixed-size pool of workers for one session
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
}

impl WorkerPool {
    /// Creates a pool for a session
    ///
    /// # Arguments
    ///
    /// * `session` - The session record; its config and seeds are used as-is
    /// * `storage` - Shared frontier and result store
    /// * `fetcher` - Egress chain used for every page
    /// * `monitor` - Proxy monitor, used when the session draws from the pool
    /// * `cancel` - Session cancellation token
    pub fn new(
        session: &SessionRecord,
        storage: SharedStorage,
        fetcher: Fetcher,
        monitor: Option<Arc<ProxyMonitor>>,
        cancel: CancellationToken,
    ) -> Self {
        let filter = if session.config.enable_deep_crawl {
            LinkFilter::for_session(&session.config, &session.seeds)
        } else {
            None
        };

        Self {
            ctx: Arc::new(WorkerContext {
                session_id: session.id.clone(),
                config: session.config.clone(),
                storage,
                fetcher,
                monitor,
                filter,
                cancel,
                in_flight: AtomicUsize::new(0),
                halted: AtomicBool::new(false),
                processed: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Runs the workers until the frontier drains or the session is cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(PoolSummary)` - All workers exited normally
    /// * `Err(ScrapeError)` - The first storage error or worker panic
    pub async fn run(self) -> Result<PoolSummary, ScrapeError> {
        let workers = self.ctx.config.max_concurrent.max(1);
        tracing::info!(
            "Session {}: starting {} workers",
            self.ctx.session_id,
            workers
        );

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let ctx = Arc::clone(&self.ctx);
            set.spawn(async move { worker_loop(ctx, worker_id).await });
        }

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| ScrapeError::Worker(e.to_string())).and_then(|r| r);
            if let Err(e) = result {
                self.ctx.halted.store(true, Ordering::SeqCst);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(PoolSummary {
            processed: self.ctx.processed.load(Ordering::SeqCst),
            released: self.ctx.released.load(Ordering::SeqCst),
        })
    }
}

async fn worker_loop(ctx: Arc<WorkerContext>, worker_id: usize) -> Result<(), ScrapeError> {
    loop {
        if ctx.should_stop() {
            tracing::debug!("Worker {} stopping", worker_id);
            return Ok(());
        }

        let guard = InFlight::enter(&ctx.in_flight);
        let claimed = ctx.storage(|s| s.claim_next_url(&ctx.session_id))?;

        match claimed {
            Some(entry) => {
                process_url(&ctx, worker_id, entry).await?;
                drop(guard);
            }
            None => {
                drop(guard);
                if ctx.in_flight.load(Ordering::SeqCst) == 0 {
                    tracing::debug!("Worker {}: frontier drained", worker_id);
                    return Ok(());
                }
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
        }
    }
}

fn politeness_delay(config: &SessionConfig, page_number: u32) -> Duration {
    if page_number > 1 {
        return Duration::from_millis(config.pagination.delay_ms);
    }
    let jitter = if config.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.jitter_ms)
    } else {
        0
    };
    Duration::from_millis(config.delay_ms + jitter)
}

async fn process_url(
    ctx: &WorkerContext,
    worker_id: usize,
    entry: CrawlUrlRecord,
) -> Result<(), ScrapeError> {
    let delay = politeness_delay(&ctx.config, entry.page_number);
    let cancelled = tokio::select! {
        _ = ctx.cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    };
    if cancelled {
        return release(ctx, &entry);
    }

    let proxy = select_proxy(ctx)?;
    let strategy = proxy.as_ref().and_then(|p| build_proxy_strategy(ctx, p));

    let report = ctx
        .fetcher
        .fetch_via(&entry.url, strategy.clone(), &ctx.cancel)
        .await;

    if let (Some(proxy), Some(strategy)) = (&proxy, &strategy) {
        feed_proxy_monitor(ctx, proxy, strategy.name(), &report)?;
    }

    let elapsed_ms = report.elapsed_ms();
    let (outcome, analysis) = match report.outcome {
        FetchOutcome::Cancelled => return release(ctx, &entry),
        FetchOutcome::Blocked {
            status_code,
            strategy,
        } => {
            tracing::warn!(
                "[{}] Blocked {} (HTTP {}) via {}",
                worker_id,
                entry.url,
                status_code.map_or_else(|| "-".to_string(), |c| c.to_string()),
                strategy
            );
            let message = format!(
                "Access denied (HTTP {}) via {}",
                status_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                strategy
            );
            (UrlOutcome::blocked(status_code, message, elapsed_ms), None)
        }
        FetchOutcome::Failed { error } => {
            tracing::warn!("[{}] Failed {}: {}", worker_id, entry.url, error);
            (UrlOutcome::failed(error, elapsed_ms), None)
        }
        FetchOutcome::Success {
            final_url,
            status_code,
            body,
            strategy,
        } => match Url::parse(&final_url).or_else(|_| Url::parse(&entry.url)) {
            Ok(base_url) => {
                let analysis = analyze_page(&ctx.config, &entry, &body, &base_url);
                let outcome =
                    completed_outcome(&ctx.config, &entry, &analysis, status_code, elapsed_ms);
                tracing::info!(
                    "[{}] {} {} via {} ({} ms)",
                    worker_id,
                    outcome.status,
                    entry.url,
                    strategy,
                    elapsed_ms
                );
                (outcome, Some(analysis))
            }
            Err(e) => (
                UrlOutcome::failed(
                    format!("Unparsable final URL {}: {}", final_url, e),
                    elapsed_ms,
                ),
                None,
            ),
        },
    };

    ctx.storage(|s| s.record_url_outcome(entry.id, &outcome))?;
    ctx.processed.fetch_add(1, Ordering::SeqCst);

    if let Some(analysis) = analysis {
        enqueue_discoveries(ctx, &entry, &analysis)?;
    }

    Ok(())
}

fn release(ctx: &WorkerContext, entry: &CrawlUrlRecord) -> Result<(), ScrapeError> {
    tracing::debug!("Releasing {} after cancellation", entry.url);
    ctx.storage(|s| s.release_url(entry.id))?;
    ctx.released.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

fn select_proxy(ctx: &WorkerContext) -> Result<Option<ProxyRecord>, ScrapeError> {
    if !ctx.config.use_proxy_pool {
        return Ok(None);
    }
    let Some(monitor) = &ctx.monitor else {
        return Ok(None);
    };
    monitor.best_proxy().map_err(|e| {
        ctx.halted.store(true, Ordering::SeqCst);
        ScrapeError::Storage(e)
    })
}

fn build_proxy_strategy(
    ctx: &WorkerContext,
    proxy: &ProxyRecord,
) -> Option<Arc<dyn EgressStrategy>> {
    match ProxyEgress::new(
        ProxyEgress::pool_name(&proxy.url),
        &proxy.url,
        ctx.fetcher.fallback_timeout(),
    ) {
        Ok(strategy) => Some(Arc::new(strategy)),
        Err(e) => {
            tracing::warn!("Skipping proxy {}: {}", proxy.url, e);
            None
        }
    }
}

fn feed_proxy_monitor(
    ctx: &WorkerContext,
    proxy: &ProxyRecord,
    strategy_name: &str,
    report: &FetchReport,
) -> Result<(), ScrapeError> {
    let (Some(monitor), Some(attempt)) = (&ctx.monitor, report.attempt_by(strategy_name)) else {
        return Ok(());
    };

    let outcome = if attempt.is_success() {
        ProbeOutcome::Success {
            latency: attempt.elapsed,
        }
    } else {
        ProbeOutcome::Failure {
            error: attempt
                .error
                .clone()
                .unwrap_or_else(|| "request failed".to_string()),
        }
    };

    match monitor.record_outcome(proxy.id, &outcome) {
        Ok(_) => Ok(()),
        Err(StorageError::ProxyNotFound(id)) => {
            tracing::debug!("Proxy {} removed before its outcome was recorded", id);
            Ok(())
        }
        Err(e) => {
            ctx.halted.store(true, Ordering::SeqCst);
            Err(ScrapeError::Storage(e))
        }
    }
}

/// Extraction, link discovery and pagination detection for one page
///
/// Kept synchronous: the parsed documents never cross an await point.
fn analyze_page(
    config: &SessionConfig,
    entry: &CrawlUrlRecord,
    body: &str,
    base_url: &Url,
) -> PageAnalysis {
    let content = extract(
        body,
        base_url,
        &config.extraction,
        config.extraction_schema.as_ref(),
    );

    let links = if !config.enable_deep_crawl {
        Vec::new()
    } else if config.extraction.extract_links {
        content.links.clone()
    } else {
        extract_links(&Html::parse_document(body), base_url)
    };

    let pagination = (config.pagination.enabled && entry.page_number < config.pagination.max_pages)
        .then(|| detect_pagination(body, base_url, config.pagination.selector.as_deref()));

    PageAnalysis {
        content,
        links,
        pagination,
    }
}

fn completed_outcome(
    config: &SessionConfig,
    entry: &CrawlUrlRecord,
    analysis: &PageAnalysis,
    status_code: u16,
    elapsed_ms: u64,
) -> UrlOutcome {
    let missing = analysis.content.missing_required.clone();
    let outcome = UrlOutcome::completed(analysis.content.clone(), status_code, elapsed_ms);

    if missing.is_empty() {
        return outcome;
    }

    let message = format!("Missing required fields: {}", missing.join(", "));
    tracing::warn!("{}: {}", entry.url, message);

    match config.required_field_policy {
        RequiredFieldPolicy::Annotate => outcome.with_error_message(message),
        RequiredFieldPolicy::FailUrl => outcome
            .with_error_message(message)
            .with_status(UrlStatus::Failed),
    }
}

fn enqueue_discoveries(
    ctx: &WorkerContext,
    entry: &CrawlUrlRecord,
    analysis: &PageAnalysis,
) -> Result<(), ScrapeError> {
    let max_urls = ctx.config.max_urls;

    if let Some(plan) = ctx
        .filter
        .as_ref()
        .and_then(|f| f.apply(&analysis.links, entry.depth))
    {
        let added = ctx.storage(|s| {
            s.enqueue_urls(
                &ctx.session_id,
                Some(&entry.url),
                plan.depth,
                1,
                &plan.urls,
                max_urls,
            )
        })?;
        if added > 0 {
            tracing::debug!("{}: enqueued {} links at depth {}", entry.url, added, plan.depth);
        }
    }

    let next_page = analysis
        .pagination
        .as_ref()
        .and_then(|p| p.next_page_url.clone());
    if let Some(next) = next_page {
        let added = ctx.storage(|s| {
            s.enqueue_urls(
                &ctx.session_id,
                Some(&entry.url),
                entry.depth,
                entry.page_number + 1,
                std::slice::from_ref(&next),
                max_urls,
            )
        })?;
        if added > 0 {
            tracing::debug!("{}: next page {} (page {})", entry.url, next, entry.page_number + 1);
        }
    }

    Ok(())
}
