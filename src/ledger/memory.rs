//! In-process ledger for tests and dry runs.
//!
//! Transfers recorded here carry real Token-program instructions, so the
//! verification engine decodes them exactly as it would decode a
//! transaction fetched over RPC.

use super::{
    CompiledInstruction, Ledger, LedgerTransaction, SigningIdentity, TokenAccount,
    TransferIntent, TOKEN_PROGRAM_ID,
};
use crate::amount::AtomicAmount;
use crate::error::{Error, Result};
use crate::payment::TokenInstruction;
use crate::wire::{Address, TxSignature};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Which transfer instruction a submitted payment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferStyle {
    /// `TransferChecked`, naming the mint.
    #[default]
    Checked,
    /// Legacy `Transfer`.
    Legacy,
}

#[derive(Default)]
struct State {
    /// Mint address -> decimals.
    mints: HashMap<String, u8>,
    accounts: HashMap<String, TokenAccount>,
    /// (owner, mint) -> canonical token account.
    associated: HashMap<(String, String), String>,
    transactions: HashMap<String, LedgerTransaction>,
}

/// An in-memory ledger.
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<State>,
    transaction_lookups: AtomicUsize,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh random address.
    #[must_use]
    pub fn random_address() -> Address {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Address::from_bytes(bytes)
    }

    fn random_signature() -> TxSignature {
        let mut bytes = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut bytes);
        TxSignature::from_bytes(bytes)
    }

    /// Create a new mint.
    pub fn create_mint(&self, decimals: u8) -> Address {
        let mint = Self::random_address();
        self.state
            .write()
            .mints
            .insert(mint.as_str().to_string(), decimals);
        debug!("Created mint {mint} ({decimals} decimals)");
        mint
    }

    /// Create an additional token account for `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mint does not exist.
    pub fn create_token_account(&self, owner: &Address, mint: &Address) -> Result<Address> {
        let mut state = self.state.write();
        if !state.mints.contains_key(mint.as_str()) {
            return Err(Error::Ledger(format!("unknown mint {mint}")));
        }
        let address = Self::random_address();
        state.accounts.insert(
            address.as_str().to_string(),
            TokenAccount {
                owner: owner.as_str().to_string(),
                mint: mint.as_str().to_string(),
                amount: AtomicAmount::ZERO,
            },
        );
        Ok(address)
    }

    /// The canonical token account of `owner` for `mint`, created on first
    /// use.
    ///
    /// # Errors
    ///
    /// Returns an error if the mint does not exist.
    pub fn associated_token_account(&self, owner: &Address, mint: &Address) -> Result<Address> {
        let key = (owner.as_str().to_string(), mint.as_str().to_string());
        if let Some(existing) = self.state.read().associated.get(&key) {
            return existing
                .parse()
                .map_err(|e| Error::Ledger(format!("corrupt account key: {e}")));
        }
        let address = self.create_token_account(owner, mint)?;
        let mut state = self.state.write();
        let canonical = state
            .associated
            .entry(key)
            .or_insert_with(|| address.as_str().to_string());
        canonical
            .parse()
            .map_err(|e| Error::Ledger(format!("corrupt account key: {e}")))
    }

    /// Credit `amount` of `mint` to `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mint does not exist or the balance overflows.
    pub fn mint_to(&self, owner: &Address, mint: &Address, amount: AtomicAmount) -> Result<()> {
        let account = self.associated_token_account(owner, mint)?;
        let mut state = self.state.write();
        let entry = state
            .accounts
            .get_mut(account.as_str())
            .ok_or_else(|| Error::Ledger(format!("missing token account {account}")))?;
        entry.amount = entry
            .amount
            .get()
            .checked_add(amount.get())
            .map(AtomicAmount::new)
            .ok_or_else(|| Error::Ledger("balance overflow".to_string()))?;
        Ok(())
    }

    /// Balance of `owner` in `mint`, summed over its token accounts.
    #[must_use]
    pub fn balance(&self, owner: &Address, mint: &Address) -> AtomicAmount {
        let state = self.state.read();
        let total = state
            .accounts
            .values()
            .filter(|a| a.owner == owner.as_str() && a.mint == mint.as_str())
            .fold(0u64, |sum, a| sum.saturating_add(a.amount.get()));
        AtomicAmount::new(total)
    }

    /// Move tokens from `authority`'s canonical account to the recipient's
    /// and record the resulting transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the mint is unknown or the source balance is too
    /// low.
    pub fn submit_transfer(
        &self,
        authority: &Address,
        intent: &TransferIntent,
        style: TransferStyle,
    ) -> Result<TxSignature> {
        let source = self.associated_token_account(authority, &intent.asset)?;
        let destination = self.associated_token_account(&intent.recipient, &intent.asset)?;

        let mut state = self.state.write();
        let decimals = state
            .mints
            .get(intent.asset.as_str())
            .copied()
            .ok_or_else(|| Error::Ledger(format!("unknown mint {}", intent.asset)))?;

        let available = state
            .accounts
            .get(source.as_str())
            .map_or(AtomicAmount::ZERO, |a| a.amount);
        let remaining = available
            .get()
            .checked_sub(intent.amount.get())
            .ok_or_else(|| {
                Error::Ledger(format!(
                    "insufficient funds: {available} available, {} required",
                    intent.amount
                ))
            })?;
        if let Some(account) = state.accounts.get_mut(source.as_str()) {
            account.amount = AtomicAmount::new(remaining);
        }
        if let Some(account) = state.accounts.get_mut(destination.as_str()) {
            account.amount = AtomicAmount::new(account.amount.get().saturating_add(intent.amount.get()));
        }

        let signature = Self::random_signature();
        let account_keys = vec![
            authority.as_str().to_string(),
            source.as_str().to_string(),
            intent.asset.as_str().to_string(),
            destination.as_str().to_string(),
            TOKEN_PROGRAM_ID.to_string(),
        ];
        let instruction = match style {
            TransferStyle::Checked => CompiledInstruction {
                program_id_index: 4,
                accounts: vec![1, 2, 3, 0],
                data: TokenInstruction::TransferChecked {
                    amount: intent.amount.get(),
                    decimals,
                }
                .encode(),
            },
            TransferStyle::Legacy => CompiledInstruction {
                program_id_index: 4,
                accounts: vec![1, 3, 0],
                data: TokenInstruction::Transfer {
                    amount: intent.amount.get(),
                }
                .encode(),
            },
        };
        state.transactions.insert(
            signature.as_str().to_string(),
            LedgerTransaction {
                signature: signature.as_str().to_string(),
                account_keys,
                instructions: vec![instruction],
                failure: None,
            },
        );
        debug!(
            "Recorded transfer {signature}: {} of {} to {}",
            intent.amount, intent.asset, intent.recipient
        );
        Ok(signature)
    }

    /// Record an arbitrary transaction.
    pub fn record_transaction(&self, transaction: LedgerTransaction) {
        self.state
            .write()
            .transactions
            .insert(transaction.signature.clone(), transaction);
    }

    /// Mark a recorded transaction as failed with the given native error.
    ///
    /// Returns `false` if no such transaction exists.
    pub fn fail_transaction(&self, signature: &str, error: &str) -> bool {
        match self.state.write().transactions.get_mut(signature) {
            Some(tx) => {
                tx.failure = Some(error.to_string());
                true
            }
            None => false,
        }
    }

    /// Number of `get_transaction` calls served.
    #[must_use]
    pub fn transaction_lookups(&self) -> usize {
        self.transaction_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>> {
        self.transaction_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().transactions.get(signature).cloned())
    }

    async fn get_token_account(&self, address: &str) -> Result<Option<TokenAccount>> {
        Ok(self.state.read().accounts.get(address).cloned())
    }
}

/// A wallet whose transfers land on a [`MemoryLedger`].
pub struct MemoryWallet {
    address: Address,
    ledger: Arc<MemoryLedger>,
    style: TransferStyle,
    transfers: AtomicUsize,
}

impl MemoryWallet {
    /// A new empty wallet.
    #[must_use]
    pub fn new(ledger: Arc<MemoryLedger>) -> Self {
        Self {
            address: MemoryLedger::random_address(),
            ledger,
            style: TransferStyle::default(),
            transfers: AtomicUsize::new(0),
        }
    }

    /// A new wallet holding `amount` of `mint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mint does not exist.
    pub fn funded(ledger: Arc<MemoryLedger>, mint: &Address, amount: AtomicAmount) -> Result<Self> {
        let wallet = Self::new(ledger);
        wallet.ledger.mint_to(&wallet.address, mint, amount)?;
        Ok(wallet)
    }

    /// Use the given instruction style for transfers.
    #[must_use]
    pub fn with_style(mut self, style: TransferStyle) -> Self {
        self.style = style;
        self
    }

    /// Number of transfers submitted.
    #[must_use]
    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningIdentity for MemoryWallet {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn holding_balance(&self, asset: &Address) -> Result<AtomicAmount> {
        Ok(self.ledger.balance(&self.address, asset))
    }

    async fn transfer(&self, intent: &TransferIntent) -> Result<TxSignature> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        self.ledger.submit_transfer(&self.address, intent, self.style)
    }
}
