//! Shared fixtures

use smartscrape::config::SessionConfig;
use smartscrape::crawler::{DirectEgress, EgressStrategy, Fetcher, PrefixRelay};
use smartscrape::storage::{share, SharedStorage, SqliteStorage};
use smartscrape::SessionController;
use std::sync::Arc;
use std::time::Duration;

/// Session config without politeness delays
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        delay_ms: 0,
        jitter_ms: 0,
        ..SessionConfig::default()
    }
}

pub fn direct() -> Arc<dyn EgressStrategy> {
    Arc::new(DirectEgress::new(vec!["TestBot/1.0".to_string()], Duration::from_secs(5)).unwrap())
}

pub fn relay(name: &str, endpoint: String) -> Arc<dyn EgressStrategy> {
    Arc::new(PrefixRelay::new(name, endpoint, Duration::from_secs(2)).unwrap())
}

pub fn memory_storage() -> SharedStorage {
    share(SqliteStorage::new_in_memory().unwrap())
}

/// Controller fetching directly, with optional relays
pub fn controller(
    storage: SharedStorage,
    relays: Vec<Arc<dyn EgressStrategy>>,
) -> SessionController {
    SessionController::new(storage, Fetcher::new(direct(), relays))
}
