//! End-to-end coverage of the HTTP range-fetch transport (component B),
//! in the teacher's own `mockito` test style (formerly
//! `tests/commoncrawl_tests.rs`, which exercised the superseded
//! `commoncrawl::download_and_store` helper).

use std::time::Duration;

use cc_corpus_pipeline::fetch::{FetchClient, HttpRangeClient};
use cc_corpus_pipeline::fetch::FetchOutcome;

#[tokio::test]
async fn test_partial_content_returns_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/crawl.warc.gz")
        .match_header("range", "bytes=10-19")
        .with_status(206)
        .with_body("0123456789")
        .create_async()
        .await;

    let client = HttpRangeClient::new(server.url(), Duration::from_secs(5));
    let outcome = client.get_range("crawl.warc.gz", 10, 10).await;

    mock.assert_async().await;
    match outcome {
        FetchOutcome::Success(body) => assert_eq!(&body[..], b"0123456789"),
        other => panic!("expected Success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_not_found_maps_to_not_found_outcome() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/missing.warc.gz")
        .with_status(404)
        .create_async()
        .await;

    let client = HttpRangeClient::new(server.url(), Duration::from_secs(5));
    let outcome = client.get_range("missing.warc.gz", 0, 5).await;

    mock.assert_async().await;
    assert!(matches!(outcome, FetchOutcome::NotFound));
}

#[tokio::test]
async fn test_200_ok_is_treated_as_server_ignored_range() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/whole.warc.gz")
        .with_status(200)
        .with_body("the entire file, not just the range")
        .create_async()
        .await;

    let client = HttpRangeClient::new(server.url(), Duration::from_secs(5));
    let outcome = client.get_range("whole.warc.gz", 0, 5).await;

    mock.assert_async().await;
    assert!(matches!(outcome, FetchOutcome::ServerIgnoredRange));
}
