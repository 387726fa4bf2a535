//! Pay-and-retry flows between the client driver and the server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{HarnessConfig, TestHarness, NETWORK};
use serde_json::json;
use std::time::Duration;
use x402test::amount::AtomicAmount;
use x402test::event::ServerEvent;
use x402test::ledger::{MemoryLedger, SigningIdentity, TransferStyle};
use x402test::wire::TxSignature;
use x402test::{Error, ServerEventsChannel};

async fn next_event(events: &mut ServerEventsChannel) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

#[tokio::test]
async fn test_paid_request_releases_resource() {
    let harness = TestHarness::setup().await.unwrap();

    let response = harness
        .client()
        .request(harness.url("/api/premium"))
        .with_payment("0.10")
        .expect_status(200)
        .expect_payment_settled()
        .expect_payment_amount(100_000_u64)
        .expect_body(json!({ "data": "This is premium content!" }))
        .execute()
        .await
        .unwrap();

    let payment = response.payment.clone().expect("payment made");
    assert_eq!(payment.to, *harness.recipient());
    assert_eq!(payment.asset, *harness.mint());
    assert_eq!(payment.from, *harness.wallet().address());

    let receipt = response.settlement.clone().expect("receipt header");
    assert!(receipt.success);
    assert_eq!(receipt.tx_hash.as_deref(), Some(payment.signature.as_str()));
    assert_eq!(receipt.network_id.as_deref(), Some(NETWORK));

    assert_eq!(
        harness.ledger().balance(harness.recipient(), harness.mint()),
        AtomicAmount::new(100_000)
    );
    assert_eq!(
        harness.ledger().balance(harness.wallet().address(), harness.mint()),
        AtomicAmount::new(900_000)
    );

    let record = harness
        .replay()
        .unwrap()
        .get(payment.signature.as_str())
        .await
        .expect("signature recorded");
    assert_eq!(record.endpoint, "/api/premium");
    assert_eq!(record.amount, AtomicAmount::new(100_000));

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_budget_below_price_makes_no_wallet_call() {
    let harness = TestHarness::setup().await.unwrap();

    let err = harness
        .client()
        .request(harness.url("/api/premium"))
        .with_payment("0.05")
        .execute()
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Budget { ceiling, required }
            if ceiling == AtomicAmount::new(50_000) && required == AtomicAmount::new(100_000)),
        "unexpected error: {err}"
    );
    assert_eq!(harness.provider().requests(), 0);
    assert_eq!(harness.wallet().transfers(), 0);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_reused_proof_is_rejected() {
    let harness = TestHarness::setup().await.unwrap();

    let response = harness
        .client()
        .request(harness.url("/api/data"))
        .with_payment("0.01")
        .expect_status(200)
        .execute()
        .await
        .unwrap();
    let signature = response.payment.unwrap().signature;

    let header = harness.proof_header(&signature, 10_000).unwrap();
    let (status, body) = harness.raw_get("/api/data", Some(&header)).await.unwrap();
    assert_eq!(status, 402);
    let reason = body["error"].as_str().unwrap();
    assert!(reason.contains("already"), "{reason}");

    // A different route does not launder the signature either.
    let (status, body) = harness.raw_get("/api/echo", Some(&header)).await.unwrap();
    assert_eq!(status, 402);
    assert!(body["error"].as_str().unwrap().contains("already"));

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_submissions_accept_exactly_one() {
    let harness = TestHarness::setup().await.unwrap();
    let signature = harness
        .transfer(harness.recipient(), harness.mint(), 10_000)
        .await
        .unwrap();
    let header = harness.proof_header(&signature, 10_000).unwrap();

    let attempts = (0..8).map(|_| harness.raw_get("/api/data", Some(&header)));
    let results = futures::future::join_all(attempts).await;

    let mut accepted = 0;
    for result in results {
        let (status, body) = result.unwrap();
        match status {
            200 => accepted += 1,
            402 => assert!(body["error"].as_str().unwrap().contains("already")),
            other => unreachable!("unexpected status {other}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(harness.replay().unwrap().stats().await.total, 1);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_underpayment_is_rejected_and_overpayment_accepted() {
    let harness = TestHarness::setup().await.unwrap();

    let short = harness
        .transfer(harness.recipient(), harness.mint(), 9_999)
        .await
        .unwrap();
    let header = harness.proof_header(&short, 10_000).unwrap();
    let (status, body) = harness.raw_get("/api/data", Some(&header)).await.unwrap();
    assert_eq!(status, 402);
    assert_eq!(body["error"], "Insufficient amount: expected 10000, got 9999");
    assert_eq!(body["accepts"][0]["maxAmountRequired"], "10000");

    let generous = harness
        .transfer(harness.recipient(), harness.mint(), 25_000)
        .await
        .unwrap();
    let header = harness.proof_header(&generous, 10_000).unwrap();
    let (status, body) = harness.raw_get("/api/data", Some(&header)).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "data": { "message": "Your data here" } }));

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_wrong_recipient_and_wrong_asset_are_rejected() {
    let harness = TestHarness::setup().await.unwrap();

    let stranger = MemoryLedger::random_address();
    let misdirected = harness
        .transfer(&stranger, harness.mint(), 10_000)
        .await
        .unwrap();
    let header = harness.proof_header(&misdirected, 10_000).unwrap();
    let (status, body) = harness.raw_get("/api/data", Some(&header)).await.unwrap();
    assert_eq!(status, 402);
    assert!(body["error"].as_str().unwrap().starts_with("Wrong recipient"));

    let other_mint = harness.ledger().create_mint(6);
    harness
        .ledger()
        .mint_to(harness.wallet().address(), &other_mint, AtomicAmount::new(10_000))
        .unwrap();
    let wrong_token = harness
        .transfer(harness.recipient(), &other_mint, 10_000)
        .await
        .unwrap();
    let header = harness.proof_header(&wrong_token, 10_000).unwrap();
    let (status, body) = harness.raw_get("/api/data", Some(&header)).await.unwrap();
    assert_eq!(status, 402);
    assert!(body["error"].as_str().unwrap().starts_with("Wrong token"));

    // Rejected proofs are not recorded.
    assert_eq!(harness.replay().unwrap().stats().await.total, 0);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_and_failed_transactions_are_rejected() {
    let harness = TestHarness::setup().await.unwrap();

    let unknown = TxSignature::from_bytes([7; 64]);
    let header = harness.proof_header(&unknown, 10_000).unwrap();
    let (status, body) = harness.raw_get("/api/data", Some(&header)).await.unwrap();
    assert_eq!(status, 402);
    assert_eq!(body["error"], "Transaction not found");

    let failed = harness
        .transfer(harness.recipient(), harness.mint(), 10_000)
        .await
        .unwrap();
    assert!(harness
        .ledger()
        .fail_transaction(failed.as_str(), r#"{"InstructionError":[0,"Custom"]}"#));
    let header = harness.proof_header(&failed, 10_000).unwrap();
    let (status, body) = harness.raw_get("/api/data", Some(&header)).await.unwrap();
    assert_eq!(status, 402);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Transaction failed:"));

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_legacy_transfer_instruction_is_accepted() {
    let harness = TestHarness::setup_with_config(HarnessConfig {
        transfer_style: TransferStyle::Legacy,
        ..HarnessConfig::default()
    })
    .await
    .unwrap();

    harness
        .client()
        .request(harness.url("/api/data"))
        .with_payment("0.01")
        .expect_status(200)
        .expect_payment_settled()
        .execute()
        .await
        .unwrap();

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_insufficient_balance_is_payment_construction_error() {
    let harness = TestHarness::setup_with_config(HarnessConfig {
        wallet_balance: AtomicAmount::new(1_000),
        ..HarnessConfig::default()
    })
    .await
    .unwrap();

    let err = harness
        .client()
        .request(harness.url("/api/data"))
        .with_payment("1")
        .execute()
        .await
        .unwrap_err();
    assert!(
        matches!(&err, Error::PaymentConstruction { message, .. } if message.starts_with("Insufficient balance")),
        "unexpected error: {err}"
    );
    assert_eq!(harness.wallet().transfers(), 0);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_dynamic_response_sees_request() {
    let harness = TestHarness::setup().await.unwrap();

    harness
        .client()
        .request(harness.url("/api/echo"))
        .post(json!({ "query": "weather" }))
        .with_payment("0.01")
        .expect_status(200)
        .expect_body(json!({
            "method": "POST",
            "path": "/api/echo",
            "body": { "query": "weather" }
        }))
        .execute()
        .await
        .unwrap();

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_configured_status_and_failed_expectation() {
    let harness = TestHarness::setup().await.unwrap();

    harness
        .client()
        .request(harness.url("/api/created"))
        .with_payment("0.01")
        .expect_status(201)
        .expect_header_matches(
            "x-payment-response",
            regex::Regex::new("^[A-Za-z0-9+/=]+$").unwrap(),
        )
        .execute()
        .await
        .unwrap();

    // The payment still happens; only the assertion fails.
    let err = harness
        .client()
        .request(harness.url("/api/data"))
        .with_payment("0.01")
        .expect_status(204)
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(&err, Error::Assertion(m) if m.starts_with("Expected status 204 but got 200")));
    assert_eq!(harness.wallet().transfers(), 2);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_events_follow_the_exchange() {
    let harness = TestHarness::setup().await.unwrap();
    let mut events = harness.subscribe_events();

    let response = harness
        .client()
        .request(harness.url("/api/data"))
        .with_payment("0.01")
        .execute()
        .await
        .unwrap();
    let signature = response.payment.unwrap().signature;

    assert_eq!(
        next_event(&mut events).await,
        ServerEvent::ChallengeIssued {
            path: "/api/data".to_string(),
            amount: "10000".to_string(),
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        ServerEvent::PaymentAccepted {
            path: "/api/data".to_string(),
            signature: signature.as_str().to_string(),
            amount: "10000".to_string(),
        }
    );

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_exact_budget_pays_and_smaller_budget_declines() {
    let harness = TestHarness::setup().await.unwrap();

    let (status, body) = harness.raw_get("/api/data", None).await.unwrap();
    assert_eq!(status, 402);
    assert_eq!(body["accepts"][0]["maxAmountRequired"], "10000");

    let response = harness
        .client()
        .request(harness.url("/api/data"))
        .with_payment_atomic(10_000_u64)
        .expect_status(200)
        .execute()
        .await
        .unwrap();
    assert!(response.settlement.unwrap().success);

    let err = harness
        .client()
        .request(harness.url("/api/data"))
        .with_payment_atomic(1_000_u64)
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Budget { .. }));
    assert_eq!(harness.wallet().transfers(), 1);

    harness.teardown().await.unwrap();
}
