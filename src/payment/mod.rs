//! Payment verification for x402test.
//!
//! A proof is only a locator: the amount, recipient and mint are always
//! re-derived from the transaction the ledger holds under the proof's
//! signature.
//!
//! # Architecture
//!
//! ```text
//! verify(signature, expected, replay)
//!        │
//!        ▼
//! ┌─────────────────────┐   seen
//! │ Replay ledger has?  │─────────▶ invalid: already processed
//! └─────────┬───────────┘
//!           │ unseen
//!           ▼
//! ┌─────────────────────┐   absent / failed
//! │ Ledger transaction  │─────────▶ invalid
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   none
//! │ First token transfer│─────────▶ invalid
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ Owner query + mints │  source + destination accounts
//! └─────────┬───────────┘
//!           ▼
//!  recipient, amount >= min, mint
//!           │
//!           ▼
//!   mark_used ──▶ valid
//! ```

mod cache;
mod instruction;
mod replay;
mod verifier;

pub use cache::{CacheStats, MintCache};
pub use instruction::{find_token_transfer, InstructionError, TokenInstruction, TokenTransfer};
pub use replay::{ReplayLedger, ReplayRecord, ReplayStats, DEFAULT_REPLAY_FILE};
pub use verifier::{ExpectedPayment, PaymentVerifier, ReplayCheck, ALREADY_PROCESSED};
