//! Wire schema for the x402 challenge/response protocol.
//!
//! This module is the single source of truth for the structure of every
//! message that crosses the HTTP boundary:
//!
//! ```text
//!  client                                   server
//!    │  GET /resource                          │
//!    │────────────────────────────────────────▶│
//!    │  402 { x402Version, accepts[], error }  │   PaymentRequiredResponse
//!    │◀────────────────────────────────────────│
//!    │                                         │
//!    │  GET /resource                          │
//!    │  X-PAYMENT: base64(PaymentPayload)      │
//!    │────────────────────────────────────────▶│
//!    │  200 body                               │
//!    │  X-PAYMENT-RESPONSE: base64(receipt)    │   SettlementReceipt
//!    │◀────────────────────────────────────────│
//! ```
//!
//! Headers are `base64(json)`; decoding an encoded value yields the same
//! value back for every valid message.

mod address;
mod challenge;
mod payment;
mod receipt;
mod verdict;

pub use address::{Address, AddressError, TxSignature};
pub use challenge::{parse_challenge, PaymentRequiredResponse, PaymentRequirements};
pub use payment::{
    encode_payment_header, parse_payment_header, PaymentPayload, SolanaPaymentPayload,
};
pub use receipt::{encode_settlement_receipt, parse_settlement_receipt, SettlementReceipt};
pub use verdict::{SettledPayment, Verdict, VerificationResult};

use crate::error::{Error, Result, SchemaError, WireMessage};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Protocol version spoken by this crate.
pub const X402_VERSION: u32 = 1;

/// The only payment scheme supported: pay the exact quoted amount.
pub const SCHEME_EXACT: &str = "exact";

/// Request header carrying the payment proof.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

fn encode_base64_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

fn decode_base64_json<T: DeserializeOwned>(
    encoded: &str,
    message: WireMessage,
) -> std::result::Result<T, SchemaError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SchemaError::new(message, format!("not valid base64: {e}")))?;
    let json = std::str::from_utf8(&bytes)
        .map_err(|_| SchemaError::new(message, "decoded bytes are not UTF-8"))?;
    serde_json::from_str(json).map_err(|e| SchemaError::new(message, e.to_string()))
}
