//! Session lifecycle
//!
//! `pending -> running -> {completed, failed, stopped}`. The controller owns
//! the transitions; the registry maps running sessions to their cancellation
//! tokens so `stop` can reach a pool started elsewhere.

use crate::config::{
    compute_session_config_hash, validate_seeds, validate_session_config, SessionConfig,
};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::worker::WorkerPool;
use crate::output::Progress;
use crate::proxy::ProxyMonitor;
use crate::state::SessionStatus;
use crate::storage::{with_storage, SessionRecord, SharedStorage};
use crate::url::parse_http_url;
use crate::ScrapeError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Cancellation tokens of the sessions running in this process
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session; returns `None` if it is already running here
    fn register(&self, session_id: &str) -> Option<CancellationToken> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.contains_key(session_id) {
            return None;
        }
        let token = CancellationToken::new();
        active.insert(session_id.to_string(), token.clone());
        Some(token)
    }

    fn unregister(&self, session_id: &str) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }

    /// Signals a running session to stop; returns false if it is not running
    pub fn cancel(&self, session_id: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Cancels every running session
    pub fn cancel_all(&self) {
        for token in self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            token.cancel();
        }
    }
}

/// Starts, stops and reports on crawl sessions
#[derive(Clone)]
pub struct SessionController {
    storage: SharedStorage,
    fetcher: Fetcher,
    monitor: Option<Arc<ProxyMonitor>>,
    registry: Arc<SessionRegistry>,
}

impl SessionController {
    pub fn new(storage: SharedStorage, fetcher: Fetcher) -> Self {
        Self {
            storage,
            fetcher,
            monitor: None,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    /// Shares a registry with other controllers in this process
    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Lets sessions with `use_proxy_pool` draw from this monitor's pool
    pub fn with_proxy_monitor(mut self, monitor: Arc<ProxyMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Validates a session config and seeds, then stores a pending session
    pub fn create_session(
        &self,
        config: &SessionConfig,
        seeds: &[String],
    ) -> Result<SessionRecord, ScrapeError> {
        validate_session_config(config)?;
        if !seeds.is_empty() {
            validate_seeds(seeds)?;
        }
        let config_hash = compute_session_config_hash(config)?;

        // Seeds take the same serialized form as discovered links so that
        // exact-string dedup sees `https://a.com` and `https://a.com/` as one
        let seeds = seeds
            .iter()
            .map(|seed| parse_http_url(seed).map(String::from))
            .collect::<Result<Vec<_>, _>>()?;

        let session = with_storage(&self.storage, |s| {
            s.create_session(config, &config_hash, &seeds)
        })?;
        tracing::info!(
            "Created session {} with {} seeds (config hash {})",
            session.id,
            session.urls_discovered,
            config_hash
        );
        Ok(session)
    }

    /// Runs a pending session until its frontier drains or it is stopped
    ///
    /// The `pending -> running` move is a compare-and-set in storage, so only
    /// one controller can start a session even when several share a database.
    ///
    /// # Returns
    ///
    /// * `Ok(SessionRecord)` - The session in its final state
    /// * `Err(ScrapeError)` - The session is already running, is terminal, or
    ///   failed; a failed session is marked `failed` before returning
    pub async fn start(&self, session_id: &str) -> Result<SessionRecord, ScrapeError> {
        let cancel = self.register(session_id)?;
        let result = match self.begin(session_id) {
            Ok(session) => self.drive(session, cancel).await,
            Err(e) => Err(e),
        };
        self.registry.unregister(session_id);
        result
    }

    /// Resumes a session left `running` by an interrupted process
    ///
    /// Its `processing` entries go back to the frontier before the pool
    /// starts. The caller must know that no live pool owns the session, as
    /// after a crash; this is never done implicitly by [`Self::start`].
    pub async fn resume(&self, session_id: &str) -> Result<SessionRecord, ScrapeError> {
        let cancel = self.register(session_id)?;
        let result = match self.reclaim(session_id) {
            Ok(session) => self.drive(session, cancel).await,
            Err(e) => Err(e),
        };
        self.registry.unregister(session_id);
        result
    }

    fn register(&self, session_id: &str) -> Result<CancellationToken, ScrapeError> {
        self.registry
            .register(session_id)
            .ok_or_else(|| ScrapeError::SessionAlreadyRunning(session_id.to_string()))
    }

    fn begin(&self, session_id: &str) -> Result<SessionRecord, ScrapeError> {
        let claimed = with_storage(&self.storage, |s| {
            s.transition_session_status(
                session_id,
                SessionStatus::Pending,
                SessionStatus::Running,
            )
        })?;
        let session = with_storage(&self.storage, |s| s.get_session(session_id))?;
        if claimed {
            return Ok(session);
        }

        match session.status {
            SessionStatus::Running => {
                Err(ScrapeError::SessionAlreadyRunning(session_id.to_string()))
            }
            status => Err(ScrapeError::InvalidSessionTransition {
                from: status,
                to: SessionStatus::Running,
            }),
        }
    }

    fn reclaim(&self, session_id: &str) -> Result<SessionRecord, ScrapeError> {
        let (session, requeued) = with_storage(&self.storage, |s| {
            let session = s.get_session(session_id)?;
            if session.status != SessionStatus::Running {
                return Ok((session, None));
            }
            let requeued = s.requeue_processing(session_id)?;
            Ok((session, Some(requeued)))
        })?;

        match requeued {
            Some(requeued) => {
                tracing::info!(
                    "Resuming interrupted session {} ({} URLs requeued)",
                    session_id,
                    requeued
                );
                Ok(session)
            }
            None => Err(ScrapeError::InvalidSessionTransition {
                from: session.status,
                to: SessionStatus::Running,
            }),
        }
    }

    async fn drive(
        &self,
        session: SessionRecord,
        cancel: CancellationToken,
    ) -> Result<SessionRecord, ScrapeError> {
        let session_id = session.id.as_str();
        tracing::info!("Starting session {}", session_id);
        let pool = WorkerPool::new(
            &session,
            Arc::clone(&self.storage),
            self.fetcher.clone(),
            self.monitor.clone(),
            cancel.clone(),
        );

        match pool.run().await {
            Ok(summary) => {
                let status = if cancel.is_cancelled() {
                    SessionStatus::Stopped
                } else {
                    SessionStatus::Completed
                };
                self.finish(session_id, status, None)?;
                tracing::info!(
                    "Session {} {} after processing {} URLs",
                    session_id,
                    status,
                    summary.processed
                );
                Ok(with_storage(&self.storage, |s| s.get_session(session_id))?)
            }
            Err(e) => {
                tracing::error!("Session {} failed: {}", session_id, e);
                if let Err(update_err) =
                    self.finish(session_id, SessionStatus::Failed, Some(&e.to_string()))
                {
                    tracing::error!("Could not mark session {} failed: {}", session_id, update_err);
                }
                Err(e)
            }
        }
    }

    /// Moves a session to a terminal status unless it already has one
    fn finish(
        &self,
        session_id: &str,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> Result<(), ScrapeError> {
        with_storage(&self.storage, |s| {
            let current = s.get_session(session_id)?;
            if current.status.is_terminal() {
                return Ok(());
            }
            s.update_session_status(session_id, status, error_message)
        })?;
        Ok(())
    }

    /// Stops a session
    ///
    /// Signals a running pool to wind down and marks the session stopped.
    /// Stopping a session that already finished is a no-op.
    pub fn stop(&self, session_id: &str) -> Result<SessionRecord, ScrapeError> {
        let signalled = self.registry.cancel(session_id);

        let session = with_storage(&self.storage, |s| s.get_session(session_id))?;
        if session.status.is_terminal() {
            return Ok(session);
        }

        if !signalled && session.status == SessionStatus::Running {
            tracing::warn!("Session {} is marked running but has no pool here", session_id);
        }

        self.finish(session_id, SessionStatus::Stopped, None)?;
        tracing::info!("Stopped session {}", session_id);
        Ok(with_storage(&self.storage, |s| s.get_session(session_id))?)
    }

    /// Current progress of a session
    pub fn progress(&self, session_id: &str) -> Result<Progress, ScrapeError> {
        let session = with_storage(&self.storage, |s| s.get_session(session_id))?;
        Ok(Progress::from_session(&session))
    }
}
