//! Ledger and wallet collaborators.
//!
//! The verification engine and the client driver never talk to a ledger
//! node directly. They go through the traits in this module, which keeps
//! the protocol logic independent of where transactions come from:
//!
//! - [`RpcLedger`]: read-only JSON-RPC queries against a real node
//! - [`MemoryLedger`]: an in-process ledger that records real
//!   Token-program instructions, for tests and dry runs
//!
//! Key custody and funding stay outside this crate. A [`WalletProvider`]
//! hands back a [`SigningIdentity`] that can sign, broadcast and confirm a
//! transfer.

mod explorer;
mod memory;
mod rpc;

pub use explorer::{explorer_url, Cluster, Explorer};
pub use memory::{MemoryLedger, MemoryWallet, TransferStyle};
pub use rpc::{RpcLedger, RpcLedgerConfig};

use crate::amount::AtomicAmount;
use crate::error::Result;
use crate::wire::{Address, TxSignature};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Program id of the fungible-token program.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// One instruction of a transaction, with accounts given as indexes into
/// the transaction's account keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    /// Index of the invoked program in the account keys.
    pub program_id_index: u8,
    /// Indexes of the instruction's accounts.
    pub accounts: Vec<u8>,
    /// Opaque instruction data.
    pub data: Vec<u8>,
}

/// A confirmed transaction as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    /// Transaction signature.
    pub signature: String,
    /// All account keys referenced by the transaction, in index order.
    pub account_keys: Vec<String>,
    /// Top-level instructions.
    pub instructions: Vec<CompiledInstruction>,
    /// Native error if execution failed, `None` on success.
    pub failure: Option<String>,
}

impl LedgerTransaction {
    /// Whether the transaction executed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// State of a token-holding account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    /// Wallet that controls the account.
    pub owner: String,
    /// Mint of the tokens held.
    pub mint: String,
    /// Balance in atomic units.
    pub amount: AtomicAmount,
}

/// What the client wants transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    /// Wallet that must end up owning the tokens.
    pub recipient: Address,
    /// Mint to transfer.
    pub asset: Address,
    /// Amount to transfer.
    pub amount: AtomicAmount,
}

/// Read-only view of the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch a confirmed transaction by signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>>;

    /// Fetch a token account.
    ///
    /// Returns `None` if the address does not hold a token account.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    async fn get_token_account(&self, address: &str) -> Result<Option<TokenAccount>>;

    /// Resolve the wallet that owns a token account.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be queried.
    async fn get_token_account_owner(&self, address: &str) -> Result<Option<String>> {
        Ok(self.get_token_account(address).await?.map(|account| account.owner))
    }
}

/// A wallet able to pay.
#[async_trait]
pub trait SigningIdentity: Send + Sync {
    /// Wallet address.
    fn address(&self) -> &Address;

    /// Balance held in the given asset.
    ///
    /// # Errors
    ///
    /// Returns an error if the balance cannot be read.
    async fn holding_balance(&self, asset: &Address) -> Result<AtomicAmount>;

    /// Sign, broadcast and confirm a transfer, returning its signature.
    ///
    /// # Errors
    ///
    /// Returns an error if any of those steps fails.
    async fn transfer(&self, intent: &TransferIntent) -> Result<TxSignature>;
}

/// Source of signing identities.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Obtain the identity to pay with.
    ///
    /// # Errors
    ///
    /// Returns an error if no identity can be provisioned.
    async fn signing_identity(&self) -> Result<Arc<dyn SigningIdentity>>;
}

/// Provider that always hands back the same, already provisioned identity.
pub struct StaticWalletProvider {
    identity: Arc<dyn SigningIdentity>,
    requests: AtomicUsize,
}

impl StaticWalletProvider {
    /// Wrap an identity.
    pub fn new(identity: Arc<dyn SigningIdentity>) -> Self {
        Self {
            identity,
            requests: AtomicUsize::new(0),
        }
    }

    /// How many times an identity has been requested.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for StaticWalletProvider {
    async fn signing_identity(&self) -> Result<Arc<dyn SigningIdentity>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.identity))
    }
}
