//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end against every storage backend.

use harvester::config::Config;
use harvester::crawler::{Coordinator, HttpFetcher, PageFetcher};
use harvester::state::CrawlStatus;
use harvester::storage::{open_storage, Storage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling from the given seeds
fn create_test_config(seeds: Vec<String>, backend: &str, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.crawler.workers = 4;
    config.crawler.max_depth = 2;
    config.crawler.shutdown_timeout = 1_000;
    config.fetcher.timeout = 5_000;
    config.fetcher.max_retries = 3;
    config.fetcher.backoff_base = 1;
    config.fetcher.backoff_max = 10;
    config.storage.backend = backend.to_string();
    config.storage.path = dir
        .path()
        .join(format!("crawl.{}", backend))
        .to_string_lossy()
        .into_owned();
    config.seeds.urls = seeds;
    config
}

/// `set_body_string` would force `text/plain`, so the mime type is given explicitly
fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

fn text(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/plain")
}

/// Mounts a three-page site: / links to /page1 and /page2, /page1 links back
async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Home</title></head><body>
            <a href="/page1">Page 1</a>
            <a href="/page2#section">Page 2</a>
            <a href="mailto:owner@example.com">Mail</a>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(
            r#"<html><head><title>Page 1</title></head><body>
            <a href="/">Home</a><a href="page2">Page 2</a>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html("<html><head><title>Page 2</title></head><body></body></html>"))
        .mount(server)
        .await;
}

/// Opens the backend a finished crawl wrote to
fn reopen(config: &Config) -> Arc<dyn Storage> {
    open_storage(&config.storage).expect("Failed to reopen storage")
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let config = create_test_config(vec![format!("{}/", base)], "sqlite", &dir);

    let report = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.failed, 0);
    assert!(!report.stopped);

    let storage = reopen(&config);
    assert_eq!(storage.count().unwrap(), 3);
    assert_eq!(storage.count_by_status(CrawlStatus::Fetched).unwrap(), 3);

    let home = storage.get(&format!("{}/", base)).unwrap().unwrap();
    assert_eq!(home.depth, 0);
    assert_eq!(home.http_code, Some(200));
    assert_eq!(home.metadata.get("title").unwrap(), "Home");

    let page2 = storage.get(&format!("{}/page2", base)).unwrap().unwrap();
    assert_eq!(page2.depth, 1);
    assert_eq!(page2.execute_count, 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<html><body>finally</body></html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/flaky", server.uri());
    let config = create_test_config(vec![url.clone()], "sqlite", &dir);

    let report = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.fetched, 1);

    let datum = reopen(&config).get(&url).unwrap().unwrap();
    assert_eq!(datum.status, CrawlStatus::Fetched);
    assert_eq!(datum.retry_count, 3);
    assert_eq!(datum.http_code, Some(200));
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/missing", server.uri());
    let config = create_test_config(vec![url.clone()], "sqlite", &dir);

    let report = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.failed, 1);

    let datum = reopen(&config).get(&url).unwrap().unwrap();
    assert_eq!(datum.status, CrawlStatus::Failed);
    assert_eq!(datum.retry_count, 0);
    assert_eq!(datum.http_code, Some(404));
    assert!(datum.error_message.is_some());
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new({
        let mut config = Config::default().fetcher;
        config.max_retries = 2;
        config.backoff_base = 1;
        config.backoff_max = 5;
        config
    })
    .unwrap();

    let err = fetcher
        .fetch(&format!("{}/down", server.uri()), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.retries(), 2);
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_configured_headers_are_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("x-crawl-token", "abc"))
        .and(header("cookie", "session=42"))
        .respond_with(html("<html><head><title>Members</title></head></html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/private", server.uri());
    let mut config = create_test_config(vec![url.clone()], "sqlite", &dir);
    config
        .fetcher
        .headers
        .insert("X-Crawl-Token".to_string(), "abc".to_string());
    config
        .fetcher
        .headers
        .insert("Cookie".to_string(), "session=42".to_string());

    let report = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.fetched, 1);

    let datum = reopen(&config).get(&url).unwrap().unwrap();
    assert_eq!(datum.metadata.get("title").unwrap(), "Members");
}

#[tokio::test]
async fn test_depth_limit() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(vec![format!("{}/", server.uri())], "memory", &dir);
    config.crawler.max_depth = 0;

    let coordinator = Coordinator::new(config, true).unwrap();
    let storage = coordinator.storage();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.dispatched, 1);
    assert_eq!(report.discovered, 0);
    // Memory storage is closed with the crawl
    assert!(storage.count().is_err());
}

#[tokio::test]
async fn test_filter_rules_limit_crawl() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(vec![format!("{}/", server.uri())], "sled", &dir);
    config.filter.rules = vec!["-.*/page2".to_string()];

    let report = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.fetched, 2);

    let storage = reopen(&config);
    assert_eq!(storage.count().unwrap(), 2);
    assert!(!storage.exists(&format!("{}/page2", server.uri())).unwrap());
    storage.close().unwrap();
}

#[tokio::test]
async fn test_regex_extractor_crawl() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.txt"))
        .respond_with(text("version: 7\nnext: /items/1\nnext: /items/2\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/1"))
        .respond_with(text("version: 8"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/2"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let feed = format!("{}/feed.txt", server.uri());
    let mut config = create_test_config(vec![feed.clone()], "sqlite", &dir);
    config.extractor.kind = "regex".to_string();
    config.extractor.link_patterns = vec![r"next: (\S+)".to_string()];
    config
        .extractor
        .fields
        .insert("version".to_string(), r"version: (\d+)".to_string());

    let report = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.failed, 1);

    let storage = reopen(&config);
    let datum = storage.get(&feed).unwrap().unwrap();
    assert_eq!(datum.metadata.get("version").unwrap(), "7");
    assert_eq!(datum.metadata.get("content_type").unwrap(), "text/plain");

    let gone = storage
        .get(&format!("{}/items/2", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(gone.status, CrawlStatus::Failed);
    assert_eq!(gone.http_code, Some(410));
}

#[tokio::test]
async fn test_page_budget_then_resume() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(vec![format!("{}/", server.uri())], "sqlite", &dir);
    config.crawler.resumable = true;
    config.crawler.max_pages = 1;

    let first = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(first.dispatched, 1);
    assert_eq!(first.discovered, 2);

    {
        let storage = reopen(&config);
        assert_eq!(storage.count_by_status(CrawlStatus::Fetched).unwrap(), 1);
        assert_eq!(storage.count_by_status(CrawlStatus::Unvisited).unwrap(), 2);
        storage.close().unwrap();
    }

    config.crawler.max_pages = 0;
    let second = Coordinator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    // The home page is not fetched again
    assert_eq!(second.dispatched, 2);
    assert_eq!(second.fetched, 2);

    let storage = reopen(&config);
    assert_eq!(storage.count().unwrap(), 3);
    assert_eq!(storage.count_by_status(CrawlStatus::Fetched).unwrap(), 3);
}
