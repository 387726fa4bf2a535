//! Decoding of fungible-token transfer instructions.
//!
//! Two layouts are accepted:
//!
//! | tag | kind              | accounts                                  | data                    |
//! |-----|-------------------|-------------------------------------------|-------------------------|
//! | 3   | `Transfer`        | source, destination, authority            | tag, amount (u64 LE)    |
//! | 12  | `TransferChecked` | source, mint, destination, authority      | tag, amount, decimals   |

use crate::amount::AtomicAmount;
use crate::ledger::{CompiledInstruction, LedgerTransaction, TOKEN_PROGRAM_ID};

const TRANSFER_TAG: u8 = 3;
const TRANSFER_CHECKED_TAG: u8 = 12;
const AMOUNT_OFFSET: usize = 1;
const AMOUNT_END: usize = AMOUNT_OFFSET + 8;

/// A decoded token-program transfer instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenInstruction {
    /// Legacy three-account transfer; does not name the mint.
    Transfer {
        /// Atomic amount moved.
        amount: u64,
    },
    /// Checked transfer naming the mint and its decimals.
    TransferChecked {
        /// Atomic amount moved.
        amount: u64,
        /// Decimals of the mint.
        decimals: u8,
    },
}

/// Malformed token instruction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstructionError {
    /// Data too short for the instruction's layout.
    #[error("instruction data for tag {tag} is {len} bytes, expected at least {expected}")]
    Truncated {
        /// Instruction tag.
        tag: u8,
        /// Actual length.
        len: usize,
        /// Required length.
        expected: usize,
    },
    /// Fewer accounts than the layout requires.
    #[error("transfer instruction names {found} accounts, expected at least {expected}")]
    MissingAccounts {
        /// Accounts present.
        found: usize,
        /// Accounts required.
        expected: usize,
    },
    /// An index points past the account keys.
    #[error("account index {0} is out of range")]
    AccountIndex(u8),
}

impl TokenInstruction {
    /// Decode instruction data.
    ///
    /// Returns `Ok(None)` for token-program instructions that are not
    /// transfers.
    ///
    /// # Errors
    ///
    /// Returns an error if a transfer tag is followed by too few bytes.
    pub fn decode(data: &[u8]) -> Result<Option<Self>, InstructionError> {
        let Some(&tag) = data.first() else {
            return Ok(None);
        };
        let expected = match tag {
            TRANSFER_TAG => AMOUNT_END,
            TRANSFER_CHECKED_TAG => AMOUNT_END + 1,
            _ => return Ok(None),
        };
        if data.len() < expected {
            return Err(InstructionError::Truncated {
                tag,
                len: data.len(),
                expected,
            });
        }

        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[AMOUNT_OFFSET..AMOUNT_END]);
        let amount = u64::from_le_bytes(raw);

        Ok(Some(if tag == TRANSFER_TAG {
            Self::Transfer { amount }
        } else {
            Self::TransferChecked {
                amount,
                decimals: data[AMOUNT_END],
            }
        }))
    }

    /// Encode to instruction data.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Self::Transfer { amount } => {
                let mut data = vec![TRANSFER_TAG];
                data.extend_from_slice(&amount.to_le_bytes());
                data
            }
            Self::TransferChecked { amount, decimals } => {
                let mut data = vec![TRANSFER_CHECKED_TAG];
                data.extend_from_slice(&amount.to_le_bytes());
                data.push(decimals);
                data
            }
        }
    }

    /// Atomic amount moved.
    #[must_use]
    pub fn amount(&self) -> AtomicAmount {
        match *self {
            Self::Transfer { amount } | Self::TransferChecked { amount, .. } => {
                AtomicAmount::new(amount)
            }
        }
    }

    fn required_accounts(&self) -> usize {
        match self {
            Self::Transfer { .. } => 3,
            Self::TransferChecked { .. } => 4,
        }
    }
}

/// A transfer located in a transaction, with accounts resolved to keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    /// The decoded instruction.
    pub instruction: TokenInstruction,
    /// Source token account.
    pub source: String,
    /// Destination token account.
    pub destination: String,
    /// Mint, when the instruction names it.
    pub mint: Option<String>,
    /// Signing authority.
    pub authority: String,
}

impl TokenTransfer {
    /// Atomic amount moved.
    #[must_use]
    pub fn amount(&self) -> AtomicAmount {
        self.instruction.amount()
    }

    fn resolve(
        instruction: TokenInstruction,
        ix: &CompiledInstruction,
        keys: &[String],
    ) -> Result<Self, InstructionError> {
        let expected = instruction.required_accounts();
        if ix.accounts.len() < expected {
            return Err(InstructionError::MissingAccounts {
                found: ix.accounts.len(),
                expected,
            });
        }
        let key = |position: usize| -> Result<String, InstructionError> {
            let index = ix.accounts[position];
            keys.get(usize::from(index))
                .cloned()
                .ok_or(InstructionError::AccountIndex(index))
        };

        Ok(match instruction {
            TokenInstruction::Transfer { .. } => Self {
                instruction,
                source: key(0)?,
                destination: key(1)?,
                mint: None,
                authority: key(2)?,
            },
            TokenInstruction::TransferChecked { .. } => Self {
                instruction,
                source: key(0)?,
                mint: Some(key(1)?),
                destination: key(2)?,
                authority: key(3)?,
            },
        })
    }
}

/// Find the first token transfer in a transaction.
///
/// # Errors
///
/// Returns an error if a token-program transfer instruction is malformed.
pub fn find_token_transfer(
    tx: &LedgerTransaction,
) -> Result<Option<TokenTransfer>, InstructionError> {
    for ix in &tx.instructions {
        let is_token_program = tx
            .account_keys
            .get(usize::from(ix.program_id_index))
            .is_some_and(|program| program == TOKEN_PROGRAM_ID);
        if !is_token_program {
            continue;
        }
        if let Some(instruction) = TokenInstruction::decode(&ix.data)? {
            return TokenTransfer::resolve(instruction, ix, &tx.account_keys).map(Some);
        }
    }
    Ok(None)
}
