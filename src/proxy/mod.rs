//! Proxy pool health
//!
//! - `health`: pure scoring and status derivation
//! - `monitor`: probing, batch testing and cleanup against storage

pub mod health;
mod monitor;

pub use health::{apply_probe, health_score, status_for, ProbeOutcome};
pub use monitor::{BatchTestReport, HttpProbe, ProxyMonitor, ProxyProbe, ProxyTestResult};
