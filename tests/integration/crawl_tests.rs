//! Integration tests for the crawl engine
//!
//! These tests use wiremock to create mock HTTP servers and run whole
//! sessions end-to-end through the session controller.

use crate::common::{controller, direct, fast_config, memory_storage, relay};
use async_trait::async_trait;
use smartscrape::config::DomainStrategy;
use smartscrape::crawler::{EgressError, EgressResponse, EgressStrategy, Fetcher};
use smartscrape::storage::with_storage;
use smartscrape::{SessionController, SessionStatus, UrlStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><head><title>Home</title></head><body>
            <a href="/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="https://other.invalid/x">Elsewhere</a>
        </body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &server,
        "/page1",
        r#"<html><head><title>Page 1</title></head><body><a href="/page3">deeper</a></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &server,
        "/page2",
        r#"<html><head><title>Page 2</title></head><body><a href="/page1">again</a></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &server,
        "/page3",
        "<html><head><title>Page 3</title></head><body><p>leaf</p></body></html>".to_string(),
    )
    .await;

    let storage = memory_storage();
    let controller = controller(storage.clone(), Vec::new());
    let config = smartscrape::SessionConfig {
        enable_deep_crawl: true,
        max_depth: 2,
        domain_strategy: DomainStrategy::SameDomain,
        ..fast_config()
    };
    let session = controller
        .create_session(&config, &[format!("{}/", base)])
        .unwrap();

    let finished = controller.start(&session.id).await.unwrap();

    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(finished.urls_discovered, 4);
    assert_eq!(finished.urls_completed, 4);

    let urls = with_storage(&storage, |s| s.list_urls(&session.id)).unwrap();
    let by_url: HashMap<String, (u32, Option<String>)> = urls
        .iter()
        .map(|u| (u.url.clone(), (u.depth, u.title.clone())))
        .collect();

    assert_eq!(by_url[&format!("{}/", base)], (0, Some("Home".to_string())));
    assert_eq!(by_url[&format!("{}/page1", base)].0, 1);
    assert_eq!(by_url[&format!("{}/page2", base)].0, 1);
    assert_eq!(by_url[&format!("{}/page3", base)], (2, Some("Page 3".to_string())));
    assert!(!by_url.contains_key("https://other.invalid/x"));

    for url in urls.iter().filter(|u| u.depth > 0) {
        let parent = urls
            .iter()
            .find(|p| Some(&p.url) == url.parent_url.as_ref())
            .expect("parent recorded");
        assert_eq!(url.depth, parent.depth + 1);
    }
}

#[tokio::test]
async fn test_max_depth_limits_discovery() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<a href="/a">a</a>"#.to_string()).await;
    mount_page(&server, "/a", r#"<a href="/b">b</a>"#.to_string()).await;
    mount_page(&server, "/b", "<p>too deep</p>".to_string()).await;

    let storage = memory_storage();
    let controller = controller(storage.clone(), Vec::new());
    let config = smartscrape::SessionConfig {
        enable_deep_crawl: true,
        max_depth: 1,
        ..fast_config()
    };
    let session = controller
        .create_session(&config, &[format!("{}/", base)])
        .unwrap();
    controller.start(&session.id).await.unwrap();

    let urls = with_storage(&storage, |s| s.list_urls(&session.id)).unwrap();
    let listed: Vec<String> = urls.iter().map(|u| u.url.clone()).collect();
    assert_eq!(listed, vec![format!("{}/", base), format!("{}/a", base)]);
}

#[tokio::test]
async fn test_max_urls_caps_frontier() {
    let server = MockServer::start().await;
    let base = server.uri();

    let links: String = (0..20)
        .map(|i| format!(r#"<a href="/item/{}">item</a>"#, i))
        .collect();
    mount_page(&server, "/", links).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>item</p>"))
        .mount(&server)
        .await;

    let storage = memory_storage();
    let controller = controller(storage.clone(), Vec::new());
    let config = smartscrape::SessionConfig {
        enable_deep_crawl: true,
        max_urls: 5,
        ..fast_config()
    };
    let session = controller
        .create_session(&config, &[format!("{}/", base)])
        .unwrap();

    let finished = controller.start(&session.id).await.unwrap();
    assert_eq!(finished.urls_discovered, 5);
    assert_eq!(finished.urls_completed, 5);
}

#[tokio::test]
async fn test_pagination_chain_is_followed() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/list/1",
        r#"<ul><li>a</li></ul><a rel="next" href="/list/2">Next</a>"#.to_string(),
    )
    .await;
    mount_page(
        &server,
        "/list/2",
        r#"<ul><li>b</li></ul><a rel="next" href="/list/3">Next</a>"#.to_string(),
    )
    .await;
    mount_page(&server, "/list/3", "<ul><li>c</li></ul>".to_string()).await;

    let storage = memory_storage();
    let controller = controller(storage.clone(), Vec::new());
    let mut config = fast_config();
    config.pagination.enabled = true;
    config.pagination.delay_ms = 0;

    let session = controller
        .create_session(&config, &[format!("{}/list/1", base)])
        .unwrap();
    controller.start(&session.id).await.unwrap();

    let urls = with_storage(&storage, |s| s.list_urls(&session.id)).unwrap();
    let chain: Vec<(String, u32, u32)> = urls
        .iter()
        .map(|u| (u.url.trim_start_matches(&base).to_string(), u.depth, u.page_number))
        .collect();
    assert_eq!(
        chain,
        vec![
            ("/list/1".to_string(), 0, 1),
            ("/list/2".to_string(), 0, 2),
            ("/list/3".to_string(), 0, 3),
        ]
    );
    assert_eq!(urls[2].parent_url.as_deref(), Some(urls[1].url.as_str()));
    assert!(urls.iter().all(|u| u.status == UrlStatus::Completed));
}

#[tokio::test]
async fn test_forbidden_page_is_blocked() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/secret"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    mount_page(&server, "/open", "<p>fine</p>".to_string()).await;

    let storage = memory_storage();
    let controller = controller(storage.clone(), Vec::new());
    let session = controller
        .create_session(
            &fast_config(),
            &[format!("{}/secret", base), format!("{}/open", base)],
        )
        .unwrap();

    let finished = controller.start(&session.id).await.unwrap();

    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(finished.urls_blocked, 1);
    assert_eq!(finished.urls_completed, 1);

    let urls = with_storage(&storage, |s| s.list_urls(&session.id)).unwrap();
    let secret = urls.iter().find(|u| u.url.ends_with("/secret")).unwrap();
    assert_eq!(secret.status, UrlStatus::Blocked);
    assert_eq!(secret.status_code, Some(403));
    assert!(secret.response_time_ms.is_some());
}

#[tokio::test]
async fn test_relay_fallback_recovers_blocked_page() {
    let origin = MockServer::start().await;
    let relay_server = MockServer::start().await;
    let target = format!("{}/article", origin.uri());

    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw"))
        .and(query_param("url", target.as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Relayed</title></head><body>hi</body></html>"),
        )
        .expect(1)
        .mount(&relay_server)
        .await;

    let storage = memory_storage();
    let controller = controller(
        storage.clone(),
        vec![relay("local", format!("{}/raw?url=", relay_server.uri()))],
    );
    let session = controller
        .create_session(&fast_config(), &[target.clone()])
        .unwrap();

    let finished = controller.start(&session.id).await.unwrap();
    assert_eq!(finished.urls_completed, 1);
    assert_eq!(finished.urls_blocked, 0);

    let urls = with_storage(&storage, |s| s.list_urls(&session.id)).unwrap();
    assert_eq!(urls[0].title.as_deref(), Some("Relayed"));
    assert_eq!(urls[0].status_code, Some(200));
}

#[tokio::test]
async fn test_stop_interrupts_running_session() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<p>slow</p>")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let storage = memory_storage();
    let controller = controller(storage.clone(), Vec::new());
    let seeds: Vec<String> = (0..3).map(|i| format!("{}/slow/{}", base, i)).collect();
    let session = controller.create_session(&fast_config(), &seeds).unwrap();

    let runner = controller.clone();
    let id = session.id.clone();
    let handle = tokio::spawn(async move { runner.start(&id).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(controller.registry().is_active(&session.id));
    let stopped = controller.stop(&session.id).unwrap();
    assert_eq!(stopped.status, SessionStatus::Stopped);

    let finished = tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("pool winds down after stop")
        .unwrap()
        .unwrap();

    assert_eq!(finished.status, SessionStatus::Stopped);
    assert_eq!(finished.urls_completed, 0);
    let pending = with_storage(&storage, |s| {
        s.count_urls_by_status(&session.id, UrlStatus::Discovered)
    })
    .unwrap();
    assert_eq!(pending, 3);

    // Stopping again changes nothing
    let again = controller.stop(&session.id).unwrap();
    assert_eq!(again.finished_at, finished.finished_at);
}

/// Egress that records concurrency and per-URL hit counts
#[derive(Default)]
struct Tracking {
    current: AtomicUsize,
    max: AtomicUsize,
    hits: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl EgressStrategy for Tracking {
    fn name(&self) -> &str {
        "tracking"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn get(&self, url: &str) -> Result<EgressResponse, EgressError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        *self
            .hits
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        Ok(EgressResponse {
            status: 200,
            final_url: url.to_string(),
            body: "<p>ok</p>".to_string(),
        })
    }
}

#[tokio::test]
async fn test_worker_pool_bounds_concurrency_and_claims_once() {
    let tracking = Arc::new(Tracking::default());
    let storage = memory_storage();
    let controller = SessionController::new(
        storage.clone(),
        Fetcher::new(tracking.clone(), Vec::new()),
    );

    let config = smartscrape::SessionConfig {
        max_concurrent: 3,
        max_urls: 100,
        ..fast_config()
    };
    let seeds: Vec<String> = (0..100)
        .map(|i| format!("https://site.test/item/{}", i))
        .collect();
    let session = controller.create_session(&config, &seeds).unwrap();

    let runner = controller.clone();
    let id = session.id.clone();
    let handle = tokio::spawn(async move { runner.start(&id).await });

    while !handle.is_finished() {
        let progress = controller.progress(&session.id).unwrap();
        assert!(progress.discovered >= progress.completed + progress.failed + progress.blocked);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let finished = handle.await.unwrap().unwrap();

    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(finished.urls_completed, 100);
    assert!(tracking.max.load(Ordering::SeqCst) <= 3);

    let hits = tracking.hits.lock().unwrap();
    assert_eq!(hits.len(), 100);
    assert!(hits.values().all(|&count| count == 1));
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<p>slow</p>")
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storage = memory_storage();
    let controller = SessionController::new(storage.clone(), Fetcher::new(direct(), Vec::new()));
    let other = SessionController::new(storage, Fetcher::new(direct(), Vec::new()));
    let session = controller
        .create_session(&fast_config(), &[format!("{}/", server.uri())])
        .unwrap();

    let runner = controller.clone();
    let id = session.id.clone();
    let handle = tokio::spawn(async move { runner.start(&id).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = controller.start(&session.id).await.unwrap_err();
    assert!(matches!(err, smartscrape::ScrapeError::SessionAlreadyRunning(_)));
    let err = other.start(&session.id).await.unwrap_err();
    assert!(matches!(err, smartscrape::ScrapeError::SessionAlreadyRunning(_)));

    let finished = handle.await.unwrap().unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(finished.urls_completed, 1);
}
