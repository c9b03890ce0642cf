//! Integration tests for session exports

use crate::common::{controller, fast_config, memory_storage};
use smartscrape::config::CrawlStrategy;
use smartscrape::extract::ExtractionSchema;
use smartscrape::output::{build_export, export_json, parse_export, write_csv};
use smartscrape::storage::with_storage;
use smartscrape::UrlStatus;
use std::fs::File;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATALOG: &str = r#"
<html>
  <head>
    <title>Catalog</title>
    <meta name="description" content="All products">
    <script type="application/ld+json">{"@type": "ItemList", "name": "Catalog"}</script>
  </head>
  <body>
    <h1>Products</h1>
    <div class="product"><h2>Lamp</h2><span class="price">$20</span><a href="/p/lamp">more</a></div>
    <div class="product"><h2>Desk</h2><a href="/p/desk">more</a></div>
  </body>
</html>"#;

fn schema() -> ExtractionSchema {
    ExtractionSchema::from_json(
        r#"{
            "fields": [{"name": "heading", "selector": "h1", "required": true}],
            "container": {
                "selector": ".product",
                "name": "products",
                "fields": [
                    {"name": "name", "selector": "h2"},
                    {"name": "price", "selector": ".price", "required": true},
                    {"name": "link", "selector": "a", "attribute": "href"}
                ]
            }
        }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_json_export_round_trips_crawl_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CATALOG))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let storage = memory_storage();
    let controller = controller(storage.clone(), Vec::new());
    let config = smartscrape::SessionConfig {
        strategy: CrawlStrategy::Schema,
        extraction_schema: Some(schema()),
        ..fast_config()
    };
    let catalog_url = format!("{}/catalog", server.uri());
    let session = controller
        .create_session(&config, &[catalog_url.clone(), format!("{}/missing", server.uri())])
        .unwrap();
    controller.start(&session.id).await.unwrap();

    let json = with_storage(&storage, |s| Ok(export_json(&*s, &session.id))).unwrap().unwrap();
    let parsed = parse_export(&json).unwrap();
    let urls = with_storage(&storage, |s| s.list_urls(&session.id)).unwrap();

    assert_eq!(parsed.session.id, session.id);
    assert_eq!(parsed.session.urls_completed, 1);
    assert_eq!(parsed.session.urls_failed, 1);
    assert_eq!(parsed.urls, urls);

    let catalog = parsed.urls.iter().find(|u| u.url == catalog_url).unwrap();
    assert_eq!(catalog.status, UrlStatus::Completed);
    assert_eq!(catalog.title.as_deref(), Some("Catalog"));

    let data = catalog.extracted_data.as_ref().unwrap();
    assert_eq!(data["heading"], "Products");
    assert_eq!(data["products"][0]["name"], "Lamp");
    assert_eq!(data["products"][0]["price"], "$20");
    assert_eq!(
        data["products"][1]["link"],
        format!("{}/p/desk", server.uri()).as_str()
    );
    assert_eq!(
        catalog.error_message.as_deref(),
        Some("Missing required fields: products[1].price")
    );

    let metadata = catalog.metadata.as_ref().unwrap();
    assert_eq!(metadata.meta.get("description").map(String::as_str), Some("All products"));
    assert_eq!(metadata.json_ld[0]["name"], "Catalog");

    let missing = parsed.urls.iter().find(|u| u.url.ends_with("/missing")).unwrap();
    assert_eq!(missing.status, UrlStatus::Failed);
    assert!(missing.extracted_data.is_none());
}

#[tokio::test]
async fn test_csv_export_to_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CATALOG))
        .mount(&server)
        .await;

    let storage = memory_storage();
    let controller = controller(storage.clone(), Vec::new());
    let seeds: Vec<String> = (0..3).map(|i| format!("{}/c/{}", server.uri(), i)).collect();
    let session = controller.create_session(&fast_config(), &seeds).unwrap();
    controller.start(&session.id).await.unwrap();

    let export = with_storage(&storage, |s| Ok(build_export(&*s, &session.id))).unwrap().unwrap();

    let dir = TempDir::new().unwrap();
    let file_path = dir.path().join("session.csv");
    write_csv(&export.urls, File::create(&file_path).unwrap()).unwrap();

    let mut reader = csv::Reader::from_path(&file_path).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| &r[5] == "completed" && &r[6] == "Catalog"));
    assert!(rows.iter().all(|r| &r[12] == ""));
}
