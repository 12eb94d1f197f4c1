use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use webhook_pool::{
    DispatchError, Dispatcher, EndpointId, EndpointStatus, FailureReason, HttpTransport, PoolConfig,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(urls: Vec<String>) -> PoolConfig {
    PoolConfig {
        urls,
        rate_limit_interval: Duration::ZERO,
        retry_delay: Duration::from_millis(10),
        request_timeout: Duration::from_millis(300),
        probe_timeout: Duration::from_millis(300),
        ..PoolConfig::default()
    }
}

async fn probe_ok(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn delivers_payload_verbatim() {
    let server = MockServer::start().await;
    probe_ok(&server, "/a").await;
    let payload = json!({"content": "deploy finished", "embeds": []});
    Mock::given(method("POST"))
        .and(path("/a"))
        .and(body_json(payload.clone()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(
        fast_config(vec![format!("{}/a", server.uri())]),
        Arc::new(HttpTransport::new()),
    );

    let result = dispatcher.send(&payload).await.unwrap();
    assert!(result.delivered);
    assert_eq!(result.endpoint_id, EndpointId::new("webhook_1"));
}

#[tokio::test]
async fn gone_endpoint_fails_over_within_one_send() {
    let server = MockServer::start().await;
    probe_ok(&server, "/a").await;
    probe_ok(&server, "/b").await;
    Mock::given(method("POST"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = fast_config(vec![
        format!("{}/a", server.uri()),
        format!("{}/b", server.uri()),
        format!("{}/c", server.uri()),
    ]);
    let max_failures = config.max_failures;
    let dispatcher = Dispatcher::new(config, Arc::new(HttpTransport::new()));

    let result = dispatcher.send(&json!({})).await.unwrap();
    assert_eq!(result.endpoint_id, EndpointId::new("webhook_2"));

    let gone = dispatcher.registry().get(&EndpointId::new("webhook_1")).await.unwrap();
    assert_eq!(gone.status, EndpointStatus::Inactive);
    assert_eq!(gone.failure_count, max_failures + 1);
}

#[tokio::test]
async fn honors_retry_after_header_without_penalty() {
    let server = MockServer::start().await;
    probe_ok(&server, "/a").await;
    probe_ok(&server, "/b").await;
    Mock::given(method("POST"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0.2"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(
        fast_config(vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())]),
        Arc::new(HttpTransport::new()),
    );

    let started = std::time::Instant::now();
    let result = dispatcher.send(&json!({})).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(result.endpoint_id, EndpointId::new("webhook_2"));

    let throttled = dispatcher.registry().get(&EndpointId::new("webhook_1")).await.unwrap();
    assert_eq!(throttled.failure_count, 0);
}

#[tokio::test]
async fn reads_retry_hint_from_json_body() {
    let server = MockServer::start().await;
    probe_ok(&server, "/a").await;
    Mock::given(method("POST"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"retry_after": 0.05})))
        .mount(&server)
        .await;

    let mut config = fast_config(vec![format!("{}/a", server.uri())]);
    config.max_retries = Some(1);
    let dispatcher = Dispatcher::new(config, Arc::new(HttpTransport::new()));

    let err = dispatcher.send(&json!({})).await.unwrap_err();
    assert_eq!(
        err,
        DispatchError::DeliveryExhausted {
            attempts: 1,
            last_error: Some(FailureReason::RateLimited {
                retry_after: Duration::from_millis(50),
            }),
        }
    );
}

#[tokio::test]
async fn slow_endpoint_times_out_and_is_counted() {
    let server = MockServer::start().await;
    probe_ok(&server, "/slow").await;
    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(
        fast_config(vec![format!("{}/slow", server.uri())]),
        Arc::new(HttpTransport::new()),
    );

    let err = dispatcher.send(&json!({})).await.unwrap_err();
    assert_eq!(
        err,
        DispatchError::DeliveryExhausted {
            attempts: 1,
            last_error: Some(FailureReason::Timeout),
        }
    );
    let endpoint = dispatcher.registry().get(&EndpointId::new("webhook_1")).await.unwrap();
    assert_eq!(endpoint.failure_count, 1);
}

#[tokio::test]
async fn unreachable_probe_deactivates_before_send() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dead"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    probe_ok(&server, "/live").await;
    Mock::given(method("POST"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dead"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(
        fast_config(vec![format!("{}/dead", server.uri()), format!("{}/live", server.uri())]),
        Arc::new(HttpTransport::new()),
    );

    let result = dispatcher.send(&json!({})).await.unwrap();
    assert_eq!(result.endpoint_id, EndpointId::new("webhook_2"));

    let status = dispatcher.status().await;
    assert_eq!(status.total, 2);
    assert_eq!(status.inactive, 1);
    assert!(status.endpoints.iter().all(|e| !e.url.contains("/dead")));
}

#[tokio::test]
async fn out_of_range_retry_hint_falls_back_to_default() {
    let server = MockServer::start().await;
    probe_ok(&server, "/a").await;
    Mock::given(method("POST"))
        .and(path("/a"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "1e30")
                .set_body_json(json!({"retry_after": 1e30})),
        )
        .mount(&server)
        .await;

    let mut config = fast_config(vec![format!("{}/a", server.uri())]);
    config.max_retries = Some(1);
    let default_retry_after = config.default_retry_after;
    let dispatcher = Dispatcher::new(config, Arc::new(HttpTransport::new()));

    let err = dispatcher.send(&json!({})).await.unwrap_err();
    assert_eq!(
        err,
        DispatchError::DeliveryExhausted {
            attempts: 1,
            last_error: Some(FailureReason::RateLimited {
                retry_after: default_retry_after,
            }),
        }
    );
}
