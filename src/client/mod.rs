//! Client driver for x402-protected endpoints.
//!
//! An [`X402Request`] is a fluent description of one exchange: the HTTP
//! request, an optional willingness-to-pay ceiling and a list of
//! expectations. [`X402Request::execute`] runs it:
//!
//! ```text
//! send request
//!     │
//!     ▼
//!  status 402 and ceiling set? ──no──────────────┐
//!     │ yes                                      │
//!     ▼                                          │
//! ┌─────────────────────┐                        │
//! │ parse challenge,    │  Schema / Budget       │
//! │ check ceiling       │──────────▶ abort       │
//! └─────────┬───────────┘                        │
//!           ▼                                    │
//! ┌─────────────────────┐                        │
//! │ wallet: balance,    │  PaymentConstruction   │
//! │ transfer, confirm   │──────────▶ abort       │
//! └─────────┬───────────┘                        │
//!           ▼                                    │
//!   resend with X-PAYMENT                        │
//!           │                                    │
//!           ▼                                    ▼
//!    check expectations in declaration order ──▶ response
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use x402test::client::{ClientConfig, X402Client};
//!
//! let client = X402Client::new(ctx, ClientConfig::default())?;
//! let response = client
//!     .request(server.url("/api/premium"))
//!     .with_payment("0.10")
//!     .expect_status(200)
//!     .expect_payment_settled()
//!     .execute()
//!     .await?;
//! println!("paid with {}", response.payment.unwrap().signature);
//! ```

mod expectation;
mod request;
mod response;

pub use expectation::{BodyPredicate, Expectation};
pub use request::X402Request;
pub use response::{PaymentInfo, X402Response};

use crate::amount::DEFAULT_ASSET_DECIMALS;
use crate::context::Context;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default HTTP request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for a transfer to confirm.
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the client driver.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for each HTTP request.
    pub request_timeout: Duration,
    /// Time allowed for the wallet to sign, broadcast and confirm.
    pub confirmation_timeout: Duration,
    /// Decimals used to convert payment ceilings to atomic units.
    pub budget_decimals: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            budget_decimals: DEFAULT_ASSET_DECIMALS,
        }
    }
}

/// Entry point for building x402 requests.
///
/// Cheap to clone; clones share the HTTP connection pool and context.
#[derive(Clone)]
pub struct X402Client {
    http: reqwest::Client,
    ctx: Arc<Context>,
    config: ClientConfig,
}

impl X402Client {
    /// Create a client bound to a context.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(ctx: Arc<Context>, config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        info!(
            "x402 client created (request_timeout={:?}, budget_decimals={})",
            config.request_timeout, config.budget_decimals
        );
        Ok(Self { http, ctx, config })
    }

    /// Create a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_defaults(ctx: Arc<Context>) -> Result<Self> {
        Self::new(ctx, ClientConfig::default())
    }

    /// Start describing a request to `url`. The method defaults to GET.
    #[must_use]
    pub fn request(&self, url: impl Into<String>) -> X402Request {
        X402Request::new(self.clone(), url.into())
    }

    /// Context this client pays and verifies through.
    #[must_use]
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
