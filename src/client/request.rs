//! Request builder and the challenge/pay/retry state machine.

use super::expectation::Expectation;
use super::response::{PaymentInfo, X402Response};
use super::X402Client;
use crate::amount::AtomicAmount;
use crate::error::{Error, Result, SchemaError, WireMessage};
use crate::ledger::{explorer_url, Cluster, TransferIntent};
use crate::wire::{
    encode_payment_header, parse_challenge, parse_settlement_receipt, PaymentPayload,
    PaymentRequirements, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER,
};
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// How much the caller is willing to pay.
#[derive(Debug, Clone)]
enum Ceiling {
    /// Decimal amount in currency units, e.g. `"0.10"`.
    Decimal(String),
    /// Exact atomic amount.
    Atomic(AtomicAmount),
}

/// One x402 exchange under construction.
#[must_use = "a request does nothing until executed"]
pub struct X402Request {
    client: X402Client,
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    ceiling: Option<Ceiling>,
    expectations: Vec<Expectation>,
}

/// What a raw HTTP round trip produced.
struct Received {
    status: StatusCode,
    headers: reqwest::header::HeaderMap,
    body: Value,
}

impl X402Request {
    pub(super) fn new(client: X402Client, url: String) -> Self {
        Self {
            client,
            url,
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            ceiling: None,
            expectations: Vec::new(),
        }
    }

    /// Use GET.
    pub fn get(mut self) -> Self {
        self.method = Method::GET;
        self
    }

    /// Use POST with a JSON body.
    pub fn post(mut self, body: Value) -> Self {
        self.method = Method::POST;
        self.body = Some(body);
        self
    }

    /// Use PUT with a JSON body.
    pub fn put(mut self, body: Value) -> Self {
        self.method = Method::PUT;
        self.body = Some(body);
        self
    }

    /// Use DELETE.
    pub fn delete(mut self) -> Self {
        self.method = Method::DELETE;
        self
    }

    /// Add a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add several request headers.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the JSON body. Ignored for GET.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Pay up to `ceiling` currency units if the server answers 402.
    ///
    /// The ceiling is converted to atomic units with
    /// [`super::ClientConfig::budget_decimals`]. Without a ceiling a 402 is
    /// returned unhandled.
    pub fn with_payment(mut self, ceiling: impl Into<String>) -> Self {
        self.ceiling = Some(Ceiling::Decimal(ceiling.into()));
        self
    }

    /// Pay up to an exact atomic amount if the server answers 402.
    pub fn with_payment_atomic(mut self, ceiling: impl Into<AtomicAmount>) -> Self {
        self.ceiling = Some(Ceiling::Atomic(ceiling.into()));
        self
    }

    /// Expect the final status.
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expectations.push(Expectation::Status(status));
        self
    }

    /// Expect that a payment was made and verifies on the ledger.
    pub fn expect_payment_settled(mut self) -> Self {
        self.expectations.push(Expectation::PaymentSettled);
        self
    }

    /// Expect the payment made to be exactly this atomic amount.
    pub fn expect_payment_amount(mut self, amount: impl Into<AtomicAmount>) -> Self {
        self.expectations.push(Expectation::PaymentAmount(amount.into()));
        self
    }

    /// Expect the body to deep-equal `body`.
    pub fn expect_body(mut self, body: Value) -> Self {
        self.expectations.push(Expectation::Body(body));
        self
    }

    /// Expect the body to satisfy a predicate.
    pub fn expect_body_matches<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.expectations
            .push(Expectation::BodyMatches(Arc::new(predicate)));
        self
    }

    /// Expect a header to equal `value`.
    pub fn expect_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.expectations.push(Expectation::Header {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Expect a header to match a pattern.
    pub fn expect_header_matches(mut self, name: impl Into<String>, pattern: Regex) -> Self {
        self.expectations.push(Expectation::HeaderMatches {
            name: name.into(),
            pattern,
        });
        self
    }

    /// Run the exchange.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if an HTTP round trip fails
    /// - [`Error::Schema`] for a malformed challenge or receipt, or a
    ///   challenge that already carries an error
    /// - [`Error::Budget`] if the price exceeds the ceiling; no wallet
    ///   operation happens in that case
    /// - [`Error::PaymentConstruction`] if paying fails
    /// - [`Error::Assertion`] for the first expectation that does not hold
    pub async fn execute(self) -> Result<X402Response> {
        debug!("{} {}", self.method, self.url);
        let first = self.send(None).await?;

        let mut cluster = Cluster::default();
        let (received, payment) = match (&self.ceiling, first.status) {
            (Some(ceiling), StatusCode::PAYMENT_REQUIRED) => {
                info!("Received 402 Payment Required");
                let requirements = challenge_requirements(&first.body)?;
                cluster = Cluster::from_network(&requirements.network);
                let payment = self.pay(ceiling, &requirements).await?;

                let proof = PaymentPayload::for_requirements(
                    &requirements,
                    payment.signature.clone(),
                    payment.from.clone(),
                    chrono::Utc::now().timestamp_millis().unsigned_abs(),
                );
                let header = encode_payment_header(&proof)?;
                debug!("Retrying with X-PAYMENT header");
                (self.send(Some(header)).await?, Some(payment))
            }
            _ => (first, None),
        };

        let settlement = received
            .headers
            .get(PAYMENT_RESPONSE_HEADER)
            .map(|raw| {
                let text = raw.to_str().map_err(|_| {
                    SchemaError::new(WireMessage::SettlementReceipt, "header is not ASCII")
                })?;
                parse_settlement_receipt(text)
            })
            .transpose()?;

        let response = X402Response {
            status: received.status.as_u16(),
            headers: received.headers,
            body: received.body,
            payment,
            settlement,
            cluster,
        };

        for expectation in &self.expectations {
            expectation.check(&response, &self.client.ctx).await?;
        }
        Ok(response)
    }

    async fn pay(&self, ceiling: &Ceiling, requirements: &PaymentRequirements) -> Result<PaymentInfo> {
        let ceiling = match ceiling {
            Ceiling::Atomic(amount) => *amount,
            Ceiling::Decimal(text) => {
                AtomicAmount::from_decimal(text, self.client.config.budget_decimals)
                    .map_err(|e| Error::Config(format!("invalid payment ceiling {text:?}: {e}")))?
            }
        };
        let required = requirements.max_amount_required;
        if ceiling < required {
            return Err(Error::Budget { ceiling, required });
        }

        let identity = self.client.ctx.signing_identity().await?;
        let balance = identity
            .holding_balance(&requirements.asset)
            .await
            .map_err(|e| Error::payment_construction_caused_by("failed to read balance", e))?;
        if balance < required {
            return Err(Error::payment_construction(format!(
                "Insufficient balance: have {balance}, need {required}"
            )));
        }

        let intent = TransferIntent {
            recipient: requirements.pay_to.clone(),
            asset: requirements.asset.clone(),
            amount: required,
        };
        info!("Paying {required} to {}", intent.recipient);
        let signature = tokio::time::timeout(
            self.client.config.confirmation_timeout,
            identity.transfer(&intent),
        )
        .await
        .map_err(|_| {
            Error::payment_construction(format!(
                "transfer not confirmed within {:?}",
                self.client.config.confirmation_timeout
            ))
        })?
        .map_err(|e| match e {
            e @ Error::PaymentConstruction { .. } => e,
            other => Error::payment_construction_caused_by("transfer failed", other),
        })?;

        let cluster = Cluster::from_network(&requirements.network);
        info!("Payment confirmed: {signature}");
        info!(
            "Explorer: {}",
            explorer_url(signature.as_str(), self.client.ctx.explorer(), cluster)
        );

        Ok(PaymentInfo {
            signature,
            amount: required,
            from: identity.address().clone(),
            to: requirements.pay_to.clone(),
            asset: requirements.asset.clone(),
        })
    }

    async fn send(&self, payment_header: Option<String>) -> Result<Received> {
        let mut builder = self
            .client
            .http
            .request(self.method.clone(), &self.url)
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(header) = payment_header {
            builder = builder.header(PAYMENT_HEADER, header);
        }
        if let Some(body) = &self.body {
            if self.method != Method::GET {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let text = response.text().await?;
        let body = if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };
        debug!("Response status {status}");
        Ok(Received {
            status,
            headers,
            body,
        })
    }
}

/// The option to act on from a 402 body.
fn challenge_requirements(body: &Value) -> Result<PaymentRequirements> {
    let challenge = parse_challenge(body)?;
    if let Some(error) = &challenge.error {
        return Err(SchemaError::new(
            WireMessage::Challenge,
            format!("Server returned error: {error}"),
        )
        .into());
    }
    challenge.primary().cloned().ok_or_else(|| {
        SchemaError::new(WireMessage::Challenge, "must have at least one payment option").into()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::ClientConfig;
    use super::*;
    use crate::context::{Context, ContextConfig};
    use crate::ledger::{MemoryLedger, MemoryWallet, StaticWalletProvider, WalletProvider};
    use crate::wire::{Address, PaymentRequiredResponse, SCHEME_EXACT};
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        client: X402Client,
        provider: Arc<StaticWalletProvider>,
        mint: Address,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(MemoryLedger::new());
        let mint = ledger.create_mint(6);
        let wallet =
            MemoryWallet::funded(Arc::clone(&ledger), &mint, AtomicAmount::new(1_000_000)).unwrap();
        let provider = Arc::new(StaticWalletProvider::new(Arc::new(wallet)));
        let ctx = Context::open(
            ContextConfig::default(),
            ledger,
            Some(Arc::clone(&provider) as Arc<dyn WalletProvider>),
        )
        .await;
        let client = X402Client::new(Arc::new(ctx), ClientConfig::default()).unwrap();
        Fixture {
            client,
            provider,
            mint,
        }
    }

    fn challenge(server: &MockServer, asset: &Address, amount: u64, error: Option<&str>) -> Value {
        let requirements = PaymentRequirements {
            scheme: SCHEME_EXACT.to_string(),
            network: "solana-devnet".to_string(),
            max_amount_required: AtomicAmount::new(amount),
            resource: format!("{}/paid", server.uri()),
            description: Some("paid".to_string()),
            mime_type: Some("application/json".to_string()),
            output_schema: None,
            pay_to: MemoryLedger::random_address(),
            max_timeout_seconds: Some(60),
            asset: asset.clone(),
            extra: None,
        };
        serde_json::to_value(PaymentRequiredResponse::new(
            requirements,
            error.map(str::to_string),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_402_without_ceiling_is_returned_unhandled() {
        let fx = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paid"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(challenge(&server, &fx.mint, 100, None)),
            )
            .mount(&server)
            .await;

        let res = fx
            .client
            .request(format!("{}/paid", server.uri()))
            .expect_status(402)
            .execute()
            .await
            .unwrap();
        assert!(res.payment.is_none());
        assert_eq!(res.body["x402Version"], 1);
        assert_eq!(fx.provider.requests(), 0);
    }

    #[tokio::test]
    async fn test_budget_exceeded_touches_no_wallet() {
        let fx = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paid"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(challenge(&server, &fx.mint, 100_000, None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = fx
            .client
            .request(format!("{}/paid", server.uri()))
            .with_payment("0.01")
            .execute()
            .await
            .unwrap_err();
        match err {
            Error::Budget { ceiling, required } => {
                assert_eq!(ceiling, AtomicAmount::new(10_000));
                assert_eq!(required, AtomicAmount::new(100_000));
            }
            other => unreachable!("expected budget error, got {other:?}"),
        }
        assert_eq!(fx.provider.requests(), 0);
    }

    #[tokio::test]
    async fn test_challenge_with_error_aborts() {
        let fx = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge(
                &server,
                &fx.mint,
                100,
                Some("Transaction not found"),
            )))
            .mount(&server)
            .await;

        let err = fx
            .client
            .request(format!("{}/paid", server.uri()))
            .with_payment("1")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Schema(e) if e.to_string().contains("Server returned error")));
    }

    #[tokio::test]
    async fn test_malformed_challenge_is_schema_error() {
        let fx = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({ "price": 1 })))
            .mount(&server)
            .await;

        let err = fx
            .client
            .request(format!("{}/paid", server.uri()))
            .with_payment("1")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert_eq!(fx.provider.requests(), 0);
    }

    #[tokio::test]
    async fn test_invalid_ceiling_is_config_error() {
        let fx = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(challenge(&server, &fx.mint, 100, None)),
            )
            .mount(&server)
            .await;

        let err = fx
            .client
            .request(format!("{}/paid", server.uri()))
            .with_payment("lots")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_pays_and_retries_with_proof() {
        let fx = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paid"))
            .and(header_exists(PAYMENT_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paid"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(challenge(&server, &fx.mint, 2_500, None)),
            )
            .mount(&server)
            .await;

        let res = fx
            .client
            .request(format!("{}/paid", server.uri()))
            .with_payment("0.01")
            .expect_status(200)
            .expect_body(json!({ "ok": true }))
            .expect_payment_amount(2_500_u64)
            .expect_payment_settled()
            .execute()
            .await
            .unwrap();

        let payment = res.payment.unwrap();
        assert_eq!(payment.amount, AtomicAmount::new(2_500));
        assert_eq!(payment.asset, fx.mint);
        assert_eq!(res.cluster, Cluster::Devnet);
        assert_eq!(fx.provider.requests(), 1);
    }

    #[tokio::test]
    async fn test_text_body_and_non_get_payload() {
        let fx = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(wiremock::matchers::body_json(json!({ "q": 1 })))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&server)
            .await;

        let res = fx
            .client
            .request(format!("{}/echo", server.uri()))
            .post(json!({ "q": 1 }))
            .expect_status(201)
            .expect_body(Value::String("created".to_string()))
            .execute()
            .await
            .unwrap();
        assert!(res.is_success());
    }

    #[tokio::test]
    async fn test_first_failing_expectation_wins() {
        let fx = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "a": 1 })))
            .mount(&server)
            .await;

        let err = fx
            .client
            .request(server.uri())
            .expect_status(201)
            .expect_payment_settled()
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Assertion(m) if m.starts_with("Expected status 201")));
    }
}
