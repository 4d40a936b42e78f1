//! Integration tests for the lookup client against a mock HTTP endpoint.

use std::time::Duration;

use idscan_core::{FetchError, LookupClient, LookupConfig, Record, RecordLookup, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

/// Client with short retry delays so transient-failure tests stay fast.
fn client_for(server: &MockServer) -> LookupClient {
    let mut config = LookupConfig::new(format!("{}/users/{{}}", server.uri()));
    config.retry_policy = RetryPolicy::new(
        3,
        Duration::from_millis(10),
        Duration::from_millis(20),
        2.0,
    );
    LookupClient::new(config).unwrap()
}

#[tokio::test]
async fn test_lookup_returns_record_for_200_with_name() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 1, "displayName": "Alice"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = client_for(&server).fetch(1).await;
    assert_eq!(record, Some(Record::new(1, "Alice")));
}

#[tokio::test]
async fn test_lookup_uses_requested_id_over_body_id() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/8"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 999, "displayName": "Hank"})),
        )
        .mount(&server)
        .await;

    let record = client_for(&server).fetch(8).await.unwrap();
    assert_eq!(record.id, 8);
}

#[tokio::test]
async fn test_lookup_sends_configured_user_agent() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/2"))
        .and(header("user-agent", "Mozilla/5.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"displayName": "Bob"})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client_for(&server).fetch(2).await.is_some());
}

#[tokio::test]
async fn test_lookup_not_found_is_absent_without_retry() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/3"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).fetch(3).await, None);
}

#[tokio::test]
async fn test_lookup_retries_transient_then_succeeds() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/4"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"displayName": "Dan"})))
        .expect(1)
        .mount(&server)
        .await;

    let record = client_for(&server).fetch(4).await;
    assert_eq!(record, Some(Record::new(4, "Dan")));
}

#[tokio::test]
async fn test_lookup_gives_up_after_three_transient_failures() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/5"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).fetch(5).await, None);
}

#[tokio::test]
async fn test_lookup_rate_limited_is_not_retried() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/6"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).fetch(6).await, None);
}

#[tokio::test]
async fn test_lookup_malformed_body_is_absent_without_retry() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).fetch(7).await, None);
}

#[tokio::test]
async fn test_lookup_missing_name_field_is_absent() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).fetch(9).await, None);
}

#[tokio::test]
async fn test_lookup_non_string_name_is_absent() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"displayName": 42})))
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).fetch(10).await, None);
}

#[tokio::test]
async fn test_lookup_timeout_is_absent() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/11"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"displayName": "Slow"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = LookupConfig::new(format!("{}/users/{{}}", server.uri()));
    config.timeout = Duration::from_millis(200);
    config.retry_policy = RetryPolicy::with_max_attempts(1);
    let client = LookupClient::new(config).unwrap();

    assert_eq!(client.fetch(11).await, None);
}

#[tokio::test]
async fn test_lookup_custom_name_field() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/users/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nickname": "Liz"})))
        .mount(&server)
        .await;

    let mut config = LookupConfig::new(format!("{}/users/{{}}", server.uri()));
    config.name_field = "nickname".to_string();
    let client = LookupClient::new(config).unwrap();

    assert_eq!(client.fetch(12).await, Some(Record::new(12, "Liz")));
}

#[tokio::test]
async fn test_lookup_retries_connection_refused_until_budget_spent() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = LookupConfig::new(format!("http://127.0.0.1:{port}/ssl/users/{{}}"));
    config.retry_policy = RetryPolicy::new(
        3,
        Duration::from_millis(10),
        Duration::from_millis(20),
        2.0,
    );
    let client = LookupClient::new(config).unwrap();

    let (error, attempts) = client.lookup(13).await.unwrap_err();
    assert!(matches!(error, FetchError::Network { .. }), "{error}");
    assert_eq!(attempts, 3);
}
