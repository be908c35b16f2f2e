//! End-to-end delivery over real HTTP
//!
//! These tests start the whole process on an ephemeral port:
//! 1. The gateway posts each resume-token to `/submit`
//! 2. The callback registry schedules (or drops) it
//! 3. The scanner resolves it and the delivery resumes

use datarouting::config::DELIVER_PATH;
use datarouting::prelude::*;
use datarouting::PacketStatus;
use std::net::SocketAddr;
use std::time::Duration;

fn test_config() -> Config {
    Config {
        port: 0,
        callback_host: "127.0.0.1".to_string(),
        route_error_chance: 0,
        callback_chance: 100,
        // Delays are whole seconds below this bound, so every callback is due at once
        callback_timeout: Duration::from_secs(1),
        providers: vec!["RouteA".to_string(), "RouteB".to_string()],
        transmit_timeout: Duration::from_secs(5),
        scan_interval: Duration::from_millis(20),
        ..Config::default()
    }
}

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn demo_packet() -> Packet {
    Packet::new(
        Uuid::new_v4().to_string(),
        "+017771110000",
        "+016660002222",
        "Hello",
    )
}

#[tokio::test]
async fn test_packet_delivered_through_http_callback() {
    let config = Arc::new(test_config());
    let runtime = Runtime::start_on(config.clone(), loopback()).await.unwrap();
    assert_ne!(runtime.local_addr().port(), 0);

    let packet = tokio::time::timeout(
        Duration::from_secs(10),
        runtime
            .client()
            .submit(DeliveryRequest::with_defaults(demo_packet(), &config)),
    )
    .await
    .expect("delivery should finish")
    .expect("delivery should succeed");

    assert_eq!(packet.status(), PacketStatus::Delivered);
    assert_eq!(packet.current_provider(), "RouteA");
    assert!(packet.failed_providers().is_empty());
    assert_eq!(runtime.hub().parked_count(), 0);

    let report = runtime.shutdown().await;
    assert!(report.is_clean(), "unclean shutdown: {report:?}");
    assert_eq!(
        report.order(),
        vec!["http-listener", "callback-scanner", "delivery-driver"]
    );
}

#[tokio::test]
async fn test_dropped_callbacks_exhaust_every_provider() {
    let config = Arc::new(Config {
        callback_chance: 0,
        transmit_timeout: Duration::from_millis(200),
        ..test_config()
    });
    let runtime = Runtime::start_on(config.clone(), loopback()).await.unwrap();

    let packet = runtime
        .client()
        .submit(DeliveryRequest::with_defaults(demo_packet(), &config))
        .await
        .unwrap();

    assert_eq!(packet.status(), PacketStatus::NoRoute);
    assert_eq!(packet.current_provider(), "");
    assert_eq!(
        packet.failed_providers(),
        ["RouteA".to_string(), "RouteB".to_string()]
    );
    assert_eq!(runtime.registry().pending_count().await, 0);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_packets_are_independent() {
    let config = Arc::new(test_config());
    let runtime = Runtime::start_on(config.clone(), loopback()).await.unwrap();
    let client = runtime.client();

    let submissions = (0..5).map(|_| {
        let client = client.clone();
        let request = DeliveryRequest::with_defaults(demo_packet(), &config);
        async move { client.submit(request).await }
    });
    let results = tokio::time::timeout(
        Duration::from_secs(10),
        join_spawned(submissions.collect()),
    )
    .await
    .unwrap();

    for result in results {
        let packet = result.unwrap();
        assert!(packet.is_delivered());
        assert!(packet.failed_providers().is_empty());
    }

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_submit_endpoint_rejects_malformed_form() {
    let config = Arc::new(test_config());
    let runtime = Runtime::start_on(config.clone(), loopback()).await.unwrap();
    let url = config.submit_url_on(runtime.local_addr().port());
    let client = reqwest::Client::new();

    let missing = client.post(&url).form(&[("other", "1")]).send().await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);

    let empty = client.post(&url).form(&[("task_token", "")]).send().await.unwrap();
    assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);

    for token in ["unknown-token", "abc.def", "abc+def="] {
        let ok = client
            .post(&url)
            .form(&[("task_token", token)])
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), reqwest::StatusCode::OK, "token {token}");
    }

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_submitter_hands_packet_to_running_worker() {
    let config = Arc::new(test_config());
    let worker = Runtime::start_on(config.clone(), loopback()).await.unwrap();
    let url = format!("http://127.0.0.1:{}{}", worker.local_addr().port(), DELIVER_PATH);
    let request = DeliveryRequest::with_defaults(demo_packet(), &config);

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        reqwest::Client::new().post(&url).json(&request).send(),
    )
    .await
    .expect("worker should answer")
    .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let packet: Packet = response.json().await.unwrap();
    assert_eq!(packet.id(), request.packet.id());
    assert_eq!(packet.status(), PacketStatus::Delivered);
    assert_eq!(packet.current_provider(), "RouteA");
    assert_eq!(worker.hub().parked_count(), 0);

    assert!(worker.shutdown().await.is_clean());
}

/// Awaits every future, keeping their order.
async fn join_spawned<F, T>(futures: Vec<F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}
