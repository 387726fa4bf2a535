//! Post-conditions checked against the final response.

use super::response::X402Response;
use crate::amount::AtomicAmount;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::payment::{ExpectedPayment, ReplayCheck};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Caller-supplied body predicate.
pub type BodyPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One declared expectation.
#[derive(Clone)]
pub enum Expectation {
    /// Status code equals.
    Status(u16),
    /// The payment made for this request verifies on the ledger.
    PaymentSettled,
    /// The payment made for this request was exactly this amount.
    PaymentAmount(AtomicAmount),
    /// Body deep-equals.
    Body(Value),
    /// Body satisfies a predicate.
    BodyMatches(BodyPredicate),
    /// Header equals.
    Header {
        /// Header name.
        name: String,
        /// Expected value.
        value: String,
    },
    /// Header matches a pattern.
    HeaderMatches {
        /// Header name.
        name: String,
        /// Pattern to match.
        pattern: Regex,
    },
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(s) => f.debug_tuple("Status").field(s).finish(),
            Self::PaymentSettled => f.write_str("PaymentSettled"),
            Self::PaymentAmount(a) => f.debug_tuple("PaymentAmount").field(a).finish(),
            Self::Body(v) => f.debug_tuple("Body").field(v).finish(),
            Self::BodyMatches(_) => f.write_str("BodyMatches(<fn>)"),
            Self::Header { name, value } => f
                .debug_struct("Header")
                .field("name", name)
                .field("value", value)
                .finish(),
            Self::HeaderMatches { name, pattern } => f
                .debug_struct("HeaderMatches")
                .field("name", name)
                .field("pattern", &pattern.as_str())
                .finish(),
        }
    }
}

impl Expectation {
    /// Check against a response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Assertion`] describing the mismatch.
    pub(crate) async fn check(&self, response: &X402Response, ctx: &Context) -> Result<()> {
        match self {
            Self::Status(expected) => {
                if response.status != *expected {
                    return Err(Error::Assertion(format!(
                        "Expected status {expected} but got {}\nBody: {}",
                        response.status, response.body
                    )));
                }
                debug!("Status check passed");
            }
            Self::PaymentSettled => {
                let payment = response
                    .payment
                    .as_ref()
                    .ok_or_else(|| Error::Assertion("Payment was not settled".to_string()))?;
                let expected = ExpectedPayment {
                    recipient: payment.to.clone(),
                    min_amount: payment.amount,
                    asset: payment.asset.clone(),
                };
                // The server has already recorded the signature.
                let verdict = ctx
                    .verify(payment.signature.as_str(), &expected, &ReplayCheck::Skip)
                    .await;
                if let Some(reason) = verdict.invalid_reason() {
                    return Err(Error::Assertion(reason.to_string()));
                }
                debug!("Payment settled on chain");
            }
            Self::PaymentAmount(expected) => {
                let payment = response
                    .payment
                    .as_ref()
                    .ok_or_else(|| Error::Assertion("Payment was not settled".to_string()))?;
                if payment.amount != *expected {
                    return Err(Error::Assertion(format!(
                        "Expected payment amount {expected} but got {}",
                        payment.amount
                    )));
                }
                debug!("Payment amount check passed");
            }
            Self::Body(expected) => {
                if response.body != *expected {
                    return Err(Error::Assertion(format!(
                        "Expected body {expected} but got {}",
                        response.body
                    )));
                }
                debug!("Body check passed");
            }
            Self::BodyMatches(predicate) => {
                if !predicate(&response.body) {
                    return Err(Error::Assertion(format!(
                        "Body validation failed: {}",
                        response.body
                    )));
                }
                debug!("Body check passed");
            }
            Self::Header { name, value } => {
                let actual = response.header(name);
                if actual != Some(value.as_str()) {
                    return Err(Error::Assertion(format!(
                        "Expected header {name} to be {value} but got {}",
                        actual.unwrap_or("<missing>")
                    )));
                }
                debug!("Header check passed");
            }
            Self::HeaderMatches { name, pattern } => {
                let actual = response.header(name);
                if !pattern.is_match(actual.unwrap_or_default()) {
                    return Err(Error::Assertion(format!(
                        "Expected header {name} to match {pattern} but got {}",
                        actual.unwrap_or("<missing>")
                    )));
                }
                debug!("Header check passed");
            }
        }
        Ok(())
    }
}
