//! Outcome of verifying a payment proof against the ledger.

use crate::amount::AtomicAmount;
use serde::{Deserialize, Serialize};

/// Facts established about a transfer that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledPayment {
    /// Transaction signature.
    pub signature: String,
    /// Amount actually transferred on the ledger.
    pub amount: AtomicAmount,
    /// Owner of the source token account.
    pub from: String,
    /// Owner of the destination token account.
    pub to: String,
}

/// Pass/fail verdict of the verification engine.
///
/// Verification never raises: every failure is an `Invalid` value with a
/// human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VerificationResult", into = "VerificationResult")]
pub enum Verdict {
    /// The transfer satisfies the challenge.
    Valid(SettledPayment),
    /// The transfer does not satisfy the challenge.
    Invalid {
        /// Why verification failed.
        reason: String,
    },
}

impl Verdict {
    /// An invalid verdict with the given reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Whether the payment was accepted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The failure reason, `None` when valid.
    #[must_use]
    pub fn invalid_reason(&self) -> Option<&str> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid { reason } => Some(reason),
        }
    }

    /// The settled transfer, `None` when invalid.
    #[must_use]
    pub fn settlement(&self) -> Option<&SettledPayment> {
        match self {
            Self::Valid(settled) => Some(settled),
            Self::Invalid { .. } => None,
        }
    }
}

/// Wire form of a [`Verdict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Whether the payment was accepted.
    pub is_valid: bool,
    /// Why it was not.
    pub invalid_reason: Option<String>,
    /// Transaction signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Amount observed on the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<AtomicAmount>,
    /// Resolved sender owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Resolved recipient owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl From<Verdict> for VerificationResult {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Valid(settled) => Self {
                is_valid: true,
                invalid_reason: None,
                tx_hash: Some(settled.signature),
                amount: Some(settled.amount),
                from: Some(settled.from),
                to: Some(settled.to),
            },
            Verdict::Invalid { reason } => Self {
                is_valid: false,
                invalid_reason: Some(reason),
                tx_hash: None,
                amount: None,
                from: None,
                to: None,
            },
        }
    }
}

impl TryFrom<VerificationResult> for Verdict {
    type Error = String;

    fn try_from(result: VerificationResult) -> Result<Self, Self::Error> {
        match (result.is_valid, result.invalid_reason) {
            (true, None) => {
                let signature = result
                    .tx_hash
                    .ok_or("a valid result must carry txHash")?;
                Ok(Self::Valid(SettledPayment {
                    signature,
                    amount: result.amount.unwrap_or_default(),
                    from: result.from.unwrap_or_default(),
                    to: result.to.unwrap_or_default(),
                }))
            }
            (true, Some(_)) => Err("a valid result must not carry invalidReason".to_string()),
            (false, Some(reason)) => Ok(Self::Invalid { reason }),
            (false, None) => Err("an invalid result must carry invalidReason".to_string()),
        }
    }
}
