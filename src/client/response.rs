//! Final response of an x402 request.

use crate::amount::AtomicAmount;
use crate::ledger::Cluster;
use crate::wire::{Address, SettlementReceipt, TxSignature};
use reqwest::header::HeaderMap;
use serde_json::Value;

/// The payment the driver made for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInfo {
    /// Transaction signature.
    pub signature: TxSignature,
    /// Amount paid, atomic units.
    pub amount: AtomicAmount,
    /// Paying wallet.
    pub from: Address,
    /// Recipient named by the challenge.
    pub to: Address,
    /// Mint paid in.
    pub asset: Address,
}

/// Response returned by [`super::X402Request::execute`].
#[derive(Debug, Clone)]
pub struct X402Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// JSON body, or the raw text as a JSON string for non-JSON responses.
    pub body: Value,
    /// Payment made on the caller's behalf, if the driver paid.
    pub payment: Option<PaymentInfo>,
    /// Decoded `X-PAYMENT-RESPONSE`, if the server sent one.
    pub settlement: Option<SettlementReceipt>,
    /// Cluster adopted from the challenge's network.
    pub cluster: Cluster,
}

impl X402Response {
    /// A header value as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
