//! Base58 ledger identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a decoded account address.
pub const ADDRESS_LEN: usize = 32;

/// Length of a decoded transaction signature.
pub const SIGNATURE_LEN: usize = 64;

// Longest base58 text for a 64-byte value; anything longer cannot be valid.
const MAX_ENCODED_LEN: usize = 88;

/// Why a base58 identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Character outside the base58 alphabet.
    #[error("{0:?} is not valid base58")]
    Alphabet(String),
    /// Decodes to the wrong number of bytes.
    #[error("{value:?} decodes to {actual} bytes, expected {expected}")]
    Length {
        /// The offending text.
        value: String,
        /// Bytes required.
        expected: usize,
        /// Bytes found.
        actual: usize,
    },
}

fn decode_fixed(value: &str, expected: usize) -> Result<(), AddressError> {
    if value.is_empty() || value.len() > MAX_ENCODED_LEN {
        return Err(AddressError::Length {
            value: value.to_string(),
            expected,
            actual: 0,
        });
    }
    let bytes = bs58::decode(value)
        .into_vec()
        .map_err(|_| AddressError::Alphabet(value.to_string()))?;
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(AddressError::Length {
            value: value.to_string(),
            expected,
            actual: bytes.len(),
        })
    }
}

/// A 32-byte ledger address (wallet, token account or mint), base58 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Encode raw key bytes as an address.
    #[must_use]
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    /// The base58 text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        decode_fixed(&value, ADDRESS_LEN)?;
        Ok(Self(value))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 64-byte transaction signature, base58 encoded. Doubles as the
/// transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxSignature(String);

impl TxSignature {
    /// Encode raw signature bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    /// The base58 text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TxSignature {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        decode_fixed(&value, SIGNATURE_LEN)?;
        Ok(Self(value))
    }
}

impl FromStr for TxSignature {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<TxSignature> for String {
    fn from(value: TxSignature) -> Self {
        value.0
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
