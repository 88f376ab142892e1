//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end through the HTTP fetcher.

use listing_crawler::config::{parse_config, Config, ProxyConfig, UserAgentConfig};
use listing_crawler::crawler::{
    run_crawl, FailureKind, FetchErrorKind, FetchOptions, Fetcher, HttpFetcher, Priority,
    SessionHint,
};
use listing_crawler::sink::{RunStatus, SqliteSink};
use listing_crawler::{
    normalize_url, CarriedData, Coordinator, CrawlReport, ListingRecord, MemorySink, Role, Sink,
    Task,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, dir: &Path, extra: &str) -> Config {
    parse_config(&format!(
        r#"
        [crawl]
        search-url = "{}/search?q=flat"
        workers = 3
        request-timeout-ms = 2000
        {}

        [backoff]
        base-delay-ms = 10
        max-delay-ms = 50

        [user-agent]
        crawler-name = "TestBot"
        crawler-version = "1.0.0"
        contact-url = "https://example.com/contact"
        contact-email = "test@example.com"

        [output]
        database-path = "{}"
        summary-path = "{}"
        "#,
        server.uri(),
        extra,
        dir.join("listings.db").display(),
        dir.join("summary.md").display(),
    ))
    .expect("test config should be valid")
}

fn card(href: &str, title: &str, price: &str) -> String {
    format!(
        r#"<article class="listing-card">
             <a href="{}"><h3>{}</h3></a>
             <span class="listing-price">{}</span>
           </article>"#,
        href, title, price
    )
}

fn search_page(cards: &[String], next: Option<&str>) -> String {
    let next = next
        .map(|href| format!(r#"<nav><a class="next-page" href="{}">Next</a></nav>"#, href))
        .unwrap_or_default();
    format!(
        "<html><body><main>{}</main>{}</body></html>",
        cards.concat(),
        next
    )
}

fn detail_page(description: &str, image: &str) -> String {
    format!(
        r#"<html><body>
             <div class="listing-description">{}</div>
             <div class="listing-details">3 beds, 2 baths, 1,200 sqft</div>
             <div class="listing-images"><img src="{}"><img data-src="/img/b.jpg"></div>
             <div class="listing-agent"><span class="agent-name">Jane Doe</span></div>
             <time class="listing-date" datetime="2024-05-01">May 1</time>
           </body></html>"#,
        description, image
    )
}

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn crawl_with_memory_sink(config: &Config) -> (CrawlReport, Arc<MemorySink>) {
    let fetcher = Arc::new(HttpFetcher::new(&config.user_agent, &config.proxy).unwrap());
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::new(config, fetcher, sink.clone()).unwrap();

    let seed = normalize_url(&config.crawl.search_url).unwrap();
    assert!(coordinator.seed(Task::search(seed)));

    let report = coordinator.run().await.unwrap();
    (report, sink)
}

#[tokio::test]
async fn test_search_page_with_two_cards_yields_two_merged_records() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "flat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_page(
            &[card("/l/1", "Sunny flat", "$1,000"), card("/l/2", "Quiet flat", "$1,200")],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/l/1", detail_page("Close to the park", "/img/1.jpg")).await;
    mount_page(&server, "/l/2", detail_page("Near the station", "/img/2.jpg")).await;

    let config = create_test_config(&server, dir.path(), "");
    let (report, sink) = crawl_with_memory_sink(&config).await;

    assert!(!report.interrupted);
    assert_eq!(report.listings_emitted, 2);
    assert_eq!(report.abandoned, 0);

    // Emission order is not guaranteed across workers
    let mut records = sink.records();
    records.sort_by(|a, b| a.url.cmp(&b.url));
    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.url, format!("{}/l/1", server.uri()));
    assert_eq!(first.title.as_deref(), Some("Sunny flat"));
    assert_eq!(first.price.as_deref(), Some("$1,000"));
    assert_eq!(first.description.as_deref(), Some("Close to the park"));
    assert_eq!(
        first.images,
        vec![
            format!("{}/img/1.jpg", server.uri()),
            format!("{}/img/b.jpg", server.uri()),
        ]
    );
    assert_eq!(first.bedrooms, Some(3));
    assert_eq!(first.bathrooms, Some(2));
    assert_eq!(first.square_footage, Some(1200));
    assert_eq!(first.posted_date.as_deref(), Some("2024-05-01"));
    assert!(first.agent.is_some());

    let second = &records[1];
    assert_eq!(second.url, format!("{}/l/2", server.uri()));
    assert_eq!(second.title.as_deref(), Some("Quiet flat"));
    assert_eq!(second.description.as_deref(), Some("Near the station"));
}

#[tokio::test]
async fn test_pagination_stops_when_cap_is_committed() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/search",
        search_page(
            &[card("/l/1", "A", "1"), card("/l/2", "B", "2"), card("/l/3", "C", "3")],
            Some("/search?q=flat&page=2"),
        ),
    )
    .await;
    mount_page(&server, "/l/1", detail_page("a", "/img/a.jpg")).await;
    mount_page(&server, "/l/2", detail_page("b", "/img/b.jpg")).await;
    Mock::given(method("GET"))
        .and(path("/l/3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server, dir.path(), "max-listings = 2");
    let (report, sink) = crawl_with_memory_sink(&config).await;

    assert_eq!(report.listings_emitted, 2);
    assert_eq!(sink.records().len(), 2);

    // One search page, two detail pages
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests
        .iter()
        .all(|r| r.url.query_pairs().all(|(k, _)| k != "page")));
}

#[tokio::test]
async fn test_pagination_follows_next_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(search_page(&[card("/l/2", "B", "2")], None)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_page(
            &[card("/l/1", "A", "1")],
            Some("?q=flat&page=2"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/l/1", detail_page("a", "/img/a.jpg")).await;
    mount_page(&server, "/l/2", detail_page("b", "/img/b.jpg")).await;

    let config = create_test_config(&server, dir.path(), "");
    let (report, sink) = crawl_with_memory_sink(&config).await;

    assert_eq!(report.listings_emitted, 2);
    let mut urls: Vec<String> = sink.records().into_iter().map(|r| r.url).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![format!("{}/l/1", server.uri()), format!("{}/l/2", server.uri())]
    );
}

#[tokio::test]
async fn test_server_errors_retried_then_abandoned() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/search",
        search_page(&[card("/l/1", "A", "1"), card("/l/2", "B", "2")], None),
    )
    .await;
    mount_page(&server, "/l/1", detail_page("a", "/img/a.jpg")).await;
    Mock::given(method("GET"))
        .and(path("/l/2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let config = create_test_config(&server, dir.path(), "max-attempts = 3");
    let (report, sink) = crawl_with_memory_sink(&config).await;

    assert_eq!(report.listings_emitted, 1);
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.retries, 2);

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url, format!("{}/l/2", server.uri()));
    assert_eq!(failures[0].role, Some(Role::Detail));
    assert_eq!(failures[0].attempts, 3);
    assert_eq!(failures[0].last_error_kind, FailureKind::Network);
}

#[tokio::test]
async fn test_transient_block_recovers_on_retry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/search", search_page(&[card("/l/1", "A", "1")], None)).await;
    Mock::given(method("GET"))
        .and(path("/l/1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, "/l/1", detail_page("a", "/img/a.jpg")).await;

    let config = create_test_config(&server, dir.path(), "");
    let (report, sink) = crawl_with_memory_sink(&config).await;

    assert_eq!(report.listings_emitted, 1);
    assert_eq!(report.retries, 1);
    assert!(sink.failures().is_empty());
}

#[tokio::test]
async fn test_missing_detail_page_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/search", search_page(&[card("/l/gone", "A", "1")], None)).await;
    Mock::given(method("GET"))
        .and(path("/l/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server, dir.path(), "");
    let (report, sink) = crawl_with_memory_sink(&config).await;

    assert_eq!(report.listings_emitted, 0);
    assert_eq!(report.retries, 0);
    assert_eq!(sink.failures()[0].last_error_kind, FailureKind::Gone);
}

#[tokio::test]
async fn test_http_fetcher_maps_statuses_and_timeouts() {
    let server = MockServer::start().await;

    for (status, page_path) in [(403, "/blocked"), (410, "/gone"), (502, "/bad")] {
        Mock::given(method("GET"))
            .and(path(page_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&UserAgentConfig::default(), &ProxyConfig::default()).unwrap();
    let options = FetchOptions {
        timeout: Duration::from_millis(100),
        session: SessionHint {
            slot: 0,
            generation: 0,
        },
    };
    let url = |p: &str| Url::parse(&format!("{}{}", server.uri(), p)).unwrap();

    for (page_path, expected) in [
        ("/blocked", FetchErrorKind::Blocked),
        ("/gone", FetchErrorKind::Gone),
        ("/bad", FetchErrorKind::Network),
        ("/slow", FetchErrorKind::Timeout),
    ] {
        match fetcher.fetch(&url(page_path), &options).await {
            Ok(_) => panic!("expected {} to fail", page_path),
            Err(e) => assert_eq!(e.kind, expected, "{}", page_path),
        }
    }

    let page = fetcher.fetch(&url("/ok"), &options).await.unwrap();
    assert_eq!(page.html, "<html></html>");
    assert_eq!(page.url, url("/ok"));
}

#[tokio::test]
async fn test_run_crawl_persists_run_and_summary() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/search",
        search_page(&[card("/l/1", "A", "1"), card("/l/2", "B", "2")], None),
    )
    .await;
    mount_page(&server, "/l/1", detail_page("a", "/img/a.jpg")).await;
    mount_page(&server, "/l/2", detail_page("b", "/img/b.jpg")).await;

    let config = create_test_config(&server, dir.path(), "");
    let report = run_crawl(config.clone(), "hash-1", true).await.unwrap();
    assert_eq!(report.listings_emitted, 2);

    let sink = SqliteSink::new(Path::new(&config.output.database_path)).unwrap();
    let run = sink.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash-1");
    assert_eq!(sink.count_listings(run.id).unwrap(), 2);
    assert!(sink.load_frontier(run.id).unwrap().is_empty());

    let summary = std::fs::read_to_string(&config.output.summary_path).unwrap();
    assert!(summary.contains("- **Listings Emitted**: 2"));
}

#[tokio::test]
async fn test_run_crawl_resumes_interrupted_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "max-listings = 5");

    // Search page must not be fetched again on resume
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/l/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/l/2", detail_page("b", "/img/b.jpg")).await;

    // An earlier run emitted /l/1 and was interrupted with /l/1 and /l/2 pending
    let run_id = {
        let sink = SqliteSink::new(Path::new(&config.output.database_path)).unwrap();
        let run_id = sink.create_run("hash-1").unwrap();
        sink.append(&ListingRecord {
            url: format!("{}/l/1", server.uri()),
            title: Some("A".to_string()),
            ..Default::default()
        })
        .unwrap();

        let pending: Vec<Task> = ["/l/1", "/l/2"]
            .iter()
            .map(|p| {
                Task::detail(
                    normalize_url(&format!("{}{}", server.uri(), p)).unwrap(),
                    CarriedData {
                        title: Some("B".to_string()),
                        ..Default::default()
                    },
                    Priority::Normal,
                )
            })
            .collect();
        sink.save_frontier(run_id, &pending).unwrap();
        sink.update_run_status(run_id, RunStatus::Interrupted).unwrap();
        run_id
    };

    let report = run_crawl(config.clone(), "hash-1", false).await.unwrap();
    assert!(!report.interrupted);
    assert_eq!(report.listings_emitted, 2);

    let sink = SqliteSink::new(Path::new(&config.output.database_path)).unwrap();
    let run = sink.get_latest_run().unwrap().unwrap();
    assert_eq!(run.id, run_id);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(sink.count_listings(run_id).unwrap(), 2);
}
