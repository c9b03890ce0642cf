//! Integration tests for SmartScrape
//!
//! These tests drive the public API end-to-end against wiremock servers,
//! in-memory or tempfile-backed SQLite and fake egress/probe implementations.

mod common;
mod crawl_tests;
mod export_tests;
mod proxy_tests;
