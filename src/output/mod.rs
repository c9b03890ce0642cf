//! Output module for session exports and progress reports
//!
//! This module handles:
//! - Exporting a session as nested JSON or flat CSV
//! - Progress projections and statistics for the CLI

mod export;
mod progress;

pub use export::{build_export, export_csv, export_json, parse_export, write_csv, SessionExport};
pub use progress::{load_statistics, print_progress, print_statistics, Progress, SessionStatistics};
