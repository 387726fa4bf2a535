//! The `X-PAYMENT-RESPONSE` settlement receipt.

use super::{decode_base64_json, encode_base64_json, Verdict};
use crate::error::{Result, SchemaError, WireMessage};
use serde::{Deserialize, Serialize};

/// Server-issued confirmation that verification took place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    /// Whether the payment settled.
    pub success: bool,
    /// Failure reason, if it did not.
    pub error: Option<String>,
    /// Settled transaction signature.
    pub tx_hash: Option<String>,
    /// Network the payment settled on.
    pub network_id: Option<String>,
}

impl SettlementReceipt {
    /// Receipt describing a verdict on the given network.
    #[must_use]
    pub fn from_verdict(verdict: &Verdict, network: &str) -> Self {
        match verdict {
            Verdict::Valid(settled) => Self {
                success: true,
                error: None,
                tx_hash: Some(settled.signature.clone()),
                network_id: Some(network.to_string()),
            },
            Verdict::Invalid { reason } => Self {
                success: false,
                error: Some(reason.clone()),
                tx_hash: None,
                network_id: Some(network.to_string()),
            },
        }
    }
}

/// Encode the receipt header value for a verdict.
///
/// # Errors
///
/// Returns an error if the receipt cannot be serialized.
pub fn encode_settlement_receipt(verdict: &Verdict, network: &str) -> Result<String> {
    encode_base64_json(&SettlementReceipt::from_verdict(verdict, network))
}

/// Decode an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns a [`SchemaError`] if the header is not a base64 JSON receipt.
pub fn parse_settlement_receipt(
    header: &str,
) -> std::result::Result<SettlementReceipt, SchemaError> {
    decode_base64_json(header, WireMessage::SettlementReceipt)
}
