//! The 402 challenge body.

use super::{Address, X402_VERSION};
use crate::amount::AtomicAmount;
use crate::error::{SchemaError, WireMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One acceptable way to pay for a resource (an entry of `accepts`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentRequirements {
    /// Payment scheme, e.g. `exact`.
    pub scheme: String,
    /// Network identifier, e.g. `solana-devnet`.
    pub network: String,
    /// Amount to pay, in the asset's smallest unit.
    pub max_amount_required: AtomicAmount,
    /// URL of the resource being paid for.
    pub resource: String,
    /// Human description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Schema of the resource response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Wallet address that must end up owning the paid tokens.
    pub pay_to: Address,
    /// Seconds the server waits for payment to settle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// Fungible-token mint to pay in.
    pub asset: Address,
    /// Scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.resource)
            .map_err(|e| format!("resource {:?} is not a URL: {e}", self.resource))?;
        if self.max_timeout_seconds == Some(0) {
            return Err("maxTimeoutSeconds must be positive".to_string());
        }
        Ok(())
    }
}

/// Body of an HTTP 402 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentRequiredResponse {
    /// Protocol version spoken by the server.
    pub x402_version: u32,
    /// Acceptable payment options; never empty once parsed.
    pub accepts: Vec<PaymentRequirements>,
    /// Why a previous payment attempt was refused, if it was.
    #[serde(default)]
    pub error: Option<String>,
}

impl PaymentRequiredResponse {
    /// A challenge offering a single payment option.
    #[must_use]
    pub fn new(requirements: PaymentRequirements, error: Option<String>) -> Self {
        Self {
            x402_version: X402_VERSION,
            accepts: vec![requirements],
            error,
        }
    }

    /// The first payment option, which is the one clients act on.
    ///
    /// Returns `None` only for a value that was built by hand with an
    /// empty `accepts`; [`parse_challenge`] never yields one.
    #[must_use]
    pub fn primary(&self) -> Option<&PaymentRequirements> {
        self.accepts.first()
    }
}

/// Parse and validate a 402 challenge body.
///
/// A version other than [`X402_VERSION`] is logged, not rejected.
///
/// # Errors
///
/// Returns a [`SchemaError`] for unknown or missing fields, non-integer
/// amounts, malformed addresses, a non-URL resource, or empty `accepts`.
pub fn parse_challenge(raw: &Value) -> Result<PaymentRequiredResponse, SchemaError> {
    let invalid = |detail: String| SchemaError::new(WireMessage::Challenge, detail);

    let response = PaymentRequiredResponse::deserialize(raw)
        .map_err(|e| invalid(format!("expected standard x402 structure: {e}")))?;

    if response.x402_version == 0 {
        return Err(invalid("x402Version must be positive".to_string()));
    }
    if response.accepts.is_empty() {
        return Err(invalid("must have at least one payment option".to_string()));
    }
    for (index, option) in response.accepts.iter().enumerate() {
        option
            .validate()
            .map_err(|detail| invalid(format!("accepts[{index}]: {detail}")))?;
    }

    if response.x402_version != X402_VERSION {
        warn!(
            "Server uses x402 v{}, we support v{}",
            response.x402_version, X402_VERSION
        );
    }

    Ok(response)
}
