//! Retry budgets against a loopback server that never recovers.
//!
//! These use the real clock: with a paused clock the runtime auto-advances
//! while a request waits on socket IO, which trips reqwest's own timeout.

use std::time::Duration;

use blatt_sources::{PaperSource, RateLimiter, RetryPolicy, SemanticScholarClient, SourceError};
use blatt_test_utils::StatusServer;
use pretty_assertions::assert_eq;

async fn run_limiter(server: &StatusServer, policy: RetryPolicy) -> Result<Option<reqwest::Response>, SourceError> {
    let limiter = RateLimiter::new(policy);
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = server.url();
    limiter
        .execute("test", || {
            let req = client.get(&url);
            async move { Ok::<_, SourceError>(req.send().await?) }
        })
        .await
}

#[tokio::test]
async fn test_rate_limited_until_retries_run_out() {
    let server = StatusServer::start(429).await;
    let policy = RetryPolicy { max_rate_limit_retries: 2, ..RetryPolicy::immediate() };
    let result = run_limiter(&server, policy).await;
    assert!(matches!(result, Ok(None)));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn test_server_errors_until_retries_run_out() {
    let server = StatusServer::start(503).await;
    let policy = RetryPolicy { max_server_retries: 2, ..RetryPolicy::immediate() };
    let result = run_limiter(&server, policy).await;
    assert!(matches!(result, Ok(None)));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn test_server_errors_do_not_spend_rate_limit_budget() {
    let server = StatusServer::start(500).await;
    // Rate-limit retries are irrelevant to 5xx; only the server budget counts.
    let policy = RetryPolicy { max_rate_limit_retries: 5, max_server_retries: 0, ..RetryPolicy::immediate() };
    assert!(matches!(run_limiter(&server, policy).await, Ok(None)));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_success_is_returned_untouched() {
    let server = StatusServer::start(200).await;
    let policy = RetryPolicy { max_server_retries: 2, ..RetryPolicy::immediate() };
    let resp = run_limiter(&server, policy).await.unwrap().expect("response");
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(server.hits(), 1);
}

fn s2_against(server: &StatusServer, policy: RetryPolicy) -> SemanticScholarClient {
    SemanticScholarClient::new(None, Duration::from_secs(5))
        .unwrap()
        .with_base_url(&server.url(), policy)
}

#[tokio::test]
async fn test_semantic_scholar_exhausted_search_is_empty() {
    let server = StatusServer::start(503).await;
    let s2 = s2_against(&server, RetryPolicy { max_server_retries: 1, ..RetryPolicy::immediate() });
    let papers = s2.search("railway digital twin", 10, Some(2018)).await.unwrap();
    assert!(papers.is_empty());
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_semantic_scholar_rate_limited_citations_are_empty() {
    let server = StatusServer::start(429).await;
    let s2 = s2_against(&server, RetryPolicy { max_rate_limit_retries: 1, ..RetryPolicy::immediate() });
    let citing = s2.get_citations("P1", 10).await.unwrap();
    assert!(citing.is_empty());
    assert_eq!(server.hits(), 2);
}
