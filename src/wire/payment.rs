//! The `X-PAYMENT` proof header.

use super::{decode_base64_json, encode_base64_json, Address, PaymentRequirements, TxSignature};
use super::X402_VERSION;
use crate::amount::AtomicAmount;
use crate::error::{Result, SchemaError, WireMessage};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ledger-specific part of the proof.
///
/// Only `signature` is trusted as a locator. Amount and mint are
/// re-derived from the on-ledger transaction during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SolanaPaymentPayload {
    /// Transaction signature (the transaction id).
    pub signature: TxSignature,
    /// Paying wallet.
    pub from: Address,
    /// Claimed amount.
    pub amount: AtomicAmount,
    /// Claimed mint.
    pub mint: Address,
    /// Client clock at payment time, milliseconds since the epoch.
    pub timestamp: u64,
}

/// The decoded `X-PAYMENT` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentPayload {
    /// Protocol version spoken by the client.
    pub x402_version: u32,
    /// Payment scheme.
    pub scheme: String,
    /// Network the payment was made on.
    pub network: String,
    /// Ledger-specific proof.
    pub payload: SolanaPaymentPayload,
}

impl PaymentPayload {
    /// Build the proof for a completed transfer that answers `requirements`.
    #[must_use]
    pub fn for_requirements(
        requirements: &PaymentRequirements,
        signature: TxSignature,
        from: Address,
        timestamp: u64,
    ) -> Self {
        Self {
            x402_version: X402_VERSION,
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
            payload: SolanaPaymentPayload {
                signature,
                from,
                amount: requirements.max_amount_required,
                mint: requirements.asset.clone(),
                timestamp,
            },
        }
    }
}

/// Encode a proof as the `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns an error if the proof cannot be serialized.
pub fn encode_payment_header(proof: &PaymentPayload) -> Result<String> {
    encode_base64_json(proof)
}

/// Decode and validate an `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns a [`SchemaError`] if the header is not base64 JSON or does not
/// match the proof structure.
pub fn parse_payment_header(header: &str) -> std::result::Result<PaymentPayload, SchemaError> {
    let proof: PaymentPayload = decode_base64_json(header, WireMessage::PaymentHeader)?;

    if proof.x402_version == 0 {
        return Err(SchemaError::new(
            WireMessage::PaymentHeader,
            "x402Version must be positive",
        ));
    }
    if proof.payload.timestamp == 0 {
        return Err(SchemaError::new(
            WireMessage::PaymentHeader,
            "payload.timestamp must be positive",
        ));
    }
    if proof.x402_version != X402_VERSION {
        warn!(
            "Client uses x402 v{}, we support v{}",
            proof.x402_version, X402_VERSION
        );
    }

    Ok(proof)
}
