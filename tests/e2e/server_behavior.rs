//! Server responses that do not involve a settled payment.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{TestHarness, NETWORK};
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use x402test::config::{RouteConfig, RouteResponse, ServerConfig};
use x402test::context::{Context, ContextConfig, ReplayStore};
use x402test::event::ServerEvent;
use x402test::ledger::{Ledger, MemoryLedger};
use x402test::server::ServerBuilder;
use x402test::wire::parse_challenge;
use x402test::Error;

#[tokio::test]
async fn test_request_without_proof_gets_challenge() {
    let harness = TestHarness::setup().await.unwrap();

    let (status, body) = harness.raw_get("/api/data", None).await.unwrap();
    assert_eq!(status, 402);
    assert_eq!(body["x402Version"], 1);
    assert!(body["error"].is_null());

    let challenge = parse_challenge(&body).unwrap();
    let option = challenge.primary().unwrap();
    assert_eq!(option.scheme, "exact");
    assert_eq!(option.network, NETWORK);
    assert_eq!(option.max_amount_required.get(), 10_000);
    assert_eq!(option.pay_to, *harness.recipient());
    assert_eq!(option.asset, *harness.mint());
    assert_eq!(option.description.as_deref(), Some("Data API access"));
    assert_eq!(option.max_timeout_seconds, Some(60));
    assert_eq!(option.resource, harness.url("/api/data"));

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_unpaid_client_sees_402_without_paying() {
    let harness = TestHarness::setup().await.unwrap();

    let response = harness
        .client()
        .request(harness.url("/api/premium"))
        .expect_status(402)
        .execute()
        .await
        .unwrap();
    assert!(response.payment.is_none());
    assert!(response.settlement.is_none());
    assert_eq!(harness.provider().requests(), 0);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_proof_is_bad_request() {
    let harness = TestHarness::setup().await.unwrap();
    let mut events = harness.subscribe_events();

    let (status, body) = harness
        .raw_get("/api/data", Some("definitely not base64!"))
        .await
        .unwrap();
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid X-PAYMENT header format");
    assert!(body["detail"].is_string());

    assert_eq!(
        events.recv().await.unwrap(),
        ServerEvent::MalformedProof {
            path: "/api/data".to_string()
        }
    );

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let harness = TestHarness::setup().await.unwrap();

    let (status, body) = harness.raw_get("/api/nope", None).await.unwrap();
    assert_eq!(status, 404);
    assert_eq!(body, json!({ "error": "Route not configured in x402test" }));

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_is_announced() {
    let harness = TestHarness::setup().await.unwrap();
    let mut events = harness.subscribe_events();

    let url = harness.url("/api/data");
    harness.teardown().await.unwrap();

    assert_eq!(events.recv().await.unwrap(), ServerEvent::ShuttingDown);
    assert!(reqwest::get(url).await.is_err());
}

#[tokio::test]
async fn test_parameterised_routes_fail_to_build() {
    let ledger = Arc::new(MemoryLedger::new());
    let mint = ledger.create_mint(6);
    let ctx = Context::open(
        ContextConfig {
            replay: ReplayStore::InMemory,
            ..Default::default()
        },
        ledger as Arc<dyn Ledger>,
        None,
    )
    .await;

    let mut config = ServerConfig::new(MemoryLedger::random_address(), mint)
        .with_route("/api/:id", RouteConfig::new("0.01", RouteResponse::default()))
        .with_route("/api/:name", RouteConfig::new("0.01", RouteResponse::default()));
    config.port = 0;

    let result = ServerBuilder::new(config)
        .with_context(Arc::new(ctx))
        .bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .build()
        .await;
    assert!(matches!(result, Err(Error::Config(_))));
}
