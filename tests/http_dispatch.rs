//! Drives the reqwest-backed client against a local mock server.

use fanout::config::OutputConfig;
use fanout::output;
use fanout::source::parse_target;
use fanout::{
    CandidateSource, ClientSettings, Dispatcher, HttpClient, Outcome, RepeatSource, RequestError,
    ReqwestClient, RetryPolicy, WorkItem, stop_channel,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(timeout: Duration) -> Arc<ReqwestClient> {
    let settings = ClientSettings {
        timeout,
        ..ClientSettings::default()
    };
    Arc::new(ReqwestClient::new(settings).unwrap())
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries).with_backoff(Duration::ZERO, Duration::ZERO)
}

async fn received(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn counted_run_hits_server_exactly_target_times() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hit"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let target = parse_target(&format!("{}/hit", server.uri())).unwrap();
    let dispatcher = Dispatcher::new(client(Duration::from_secs(5)), fast_policy(3), 8)
        .unwrap()
        .with_progress_every(10);
    let summary = dispatcher
        .run(Arc::new(RepeatSource::new(target, 40)))
        .await
        .unwrap();

    assert_eq!(summary.completed, 40);
    assert_eq!(summary.success, 40);
    assert_eq!(summary.success_rate, 1.0);
    assert_eq!(received(&server).await, 40);
}

#[tokio::test]
async fn error_status_is_retried_then_counted_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let target = parse_target(&server.uri()).unwrap();
    let dispatcher = Dispatcher::new(client(Duration::from_secs(5)), fast_policy(2), 4).unwrap();
    let summary = dispatcher
        .run(Arc::new(RepeatSource::new(target, 5)))
        .await
        .unwrap();

    assert_eq!(summary.failure, 5);
    assert_eq!(summary.success, 0);
    assert_eq!(summary.success_rate, 0.0);
    assert_eq!(received(&server).await, 15);
}

#[tokio::test]
async fn flaky_endpoint_recovers_within_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(2)
        .mount(&server)
        .await;

    let (_handle, stop) = stop_channel();
    let item = WorkItem::new(0, parse_target(&server.uri()).unwrap());
    let http = client(Duration::from_secs(5));
    let outcome = fast_policy(3).execute(http.as_ref(), &item, &stop).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts(), 3);
    assert_eq!(received(&server).await, 3);
}

#[tokio::test]
async fn slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let item = WorkItem::new(0, parse_target(&server.uri()).unwrap());
    let result = client(Duration::from_millis(50)).get(&item).await;
    assert_eq!(result, Err(RequestError::Timeout));
}

#[tokio::test]
async fn refused_connection_is_a_transport_failure() {
    let item = WorkItem::new(0, parse_target("http://127.0.0.1:1/").unwrap());
    let err = client(Duration::from_secs(2)).get(&item).await.unwrap_err();
    assert!(err.is_transport(), "unexpected error: {:?}", err);
}

#[tokio::test]
async fn dead_proxies_rank_nothing() {
    let test_url = parse_target("http://example.com/ip").unwrap();
    let source = CandidateSource::new(test_url, ["127.0.0.1:1", "127.0.0.1:1", "127.0.0.1:2"]);
    let dispatcher = Dispatcher::new(client(Duration::from_secs(2)), fast_policy(1), 4).unwrap();
    let summary = dispatcher.run(Arc::new(source)).await.unwrap();

    assert_eq!(summary.target, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failure, 2);
    assert!(dispatcher.rank().is_empty());
}

#[tokio::test]
async fn live_proxy_is_ranked_and_saved() {
    // The mock server stands in for a forwarding proxy; the test host itself
    // is never resolved.
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"origin": "1.2.3.4"}"#))
        .mount(&proxy)
        .await;
    let live = proxy.address().to_string();

    let test_url = parse_target("http://example.invalid/ip").unwrap();
    let source = CandidateSource::new(test_url, ["127.0.0.1:1".to_string(), live.clone()]);
    let http = client(Duration::from_secs(2));
    let dispatcher = Dispatcher::new(http.clone(), fast_policy(0), 4).unwrap();
    let summary = dispatcher.run(Arc::new(source)).await.unwrap();

    assert_eq!(summary.success, 1);
    assert_eq!(summary.failure, 1);
    let ranked = dispatcher.rank();
    let endpoints: Vec<&str> = ranked.iter().map(|e| e.endpoint.as_str()).collect();
    assert_eq!(endpoints, vec![live.as_str()]);
    assert_eq!(received(&proxy).await, 1);
    assert_eq!(http.cached_proxies(), 0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Proxy.txt");
    let config = OutputConfig::Text {
        path: path.display().to_string(),
    };
    let mut handler = output::create_handler(&config, None).unwrap();
    output::persist(handler.as_mut(), &ranked).await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), format!("{}\n", live));
}

#[tokio::test]
async fn outcome_carries_latency_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(30)))
        .mount(&server)
        .await;

    let (_handle, stop) = stop_channel();
    let item = WorkItem::new(0, parse_target(&server.uri()).unwrap());
    let http = client(Duration::from_secs(5));
    match fast_policy(0).execute(http.as_ref(), &item, &stop).await {
        Outcome::Success { latency, attempts } => {
            assert!(latency >= Duration::from_millis(30));
            assert_eq!(attempts, 1);
        }
        other => panic!("expected success, got {:?}", other),
    }
}
