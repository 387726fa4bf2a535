//! Error types for x402test.

use crate::amount::AtomicAmount;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed underlying cause carried by [`Error::PaymentConstruction`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in x402test.
///
/// Each variant is a narrow failure kind so callers can branch on cause.
/// Verification failures are not errors: see [`crate::wire::Verdict`].
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed wire data (challenge body, payment header, receipt header).
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The client declined to pay because its ceiling is below the price.
    #[error(
        "budget insufficient: client max amount {ceiling} is less than server required amount {required}"
    )]
    Budget {
        /// Caller-declared willingness-to-pay, in atomic units.
        ceiling: AtomicAmount,
        /// Amount demanded by the challenge, in atomic units.
        required: AtomicAmount,
    },

    /// Signing, balance lookup or broadcast of the transfer failed.
    #[error("payment construction failed: {message}")]
    PaymentConstruction {
        /// What went wrong.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// A caller-declared expectation did not hold for the final response.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Connectivity failure or timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The ledger node answered with an error.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a [`Error::PaymentConstruction`] without an underlying cause.
    pub fn payment_construction(message: impl Into<String>) -> Self {
        Self::PaymentConstruction {
            message: message.into(),
            source: None,
        }
    }

    /// Build a [`Error::PaymentConstruction`] wrapping an underlying cause.
    pub fn payment_construction_caused_by(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::PaymentConstruction {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else if e.is_connect() {
            Self::Transport(format!("connection failed: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Which wire message failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMessage {
    /// The 402 challenge body.
    Challenge,
    /// The `X-PAYMENT` header.
    PaymentHeader,
    /// The `X-PAYMENT-RESPONSE` header.
    SettlementReceipt,
}

impl std::fmt::Display for WireMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Challenge => "402 challenge",
            Self::PaymentHeader => "X-PAYMENT header",
            Self::SettlementReceipt => "X-PAYMENT-RESPONSE header",
        };
        f.write_str(name)
    }
}

/// Structural error in a wire message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {message}: {detail}")]
pub struct SchemaError {
    /// The message being parsed.
    pub message: WireMessage,
    /// What was wrong with it.
    pub detail: String,
}

impl SchemaError {
    /// Create a schema error for the given message.
    pub fn new(message: WireMessage, detail: impl Into<String>) -> Self {
        Self {
            message,
            detail: detail.into(),
        }
    }
}
