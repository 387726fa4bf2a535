//! Verification of a payment proof against ledger state.

use crate::amount::AtomicAmount;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::payment::cache::{CacheStats, MintCache};
use crate::payment::instruction::find_token_transfer;
use crate::payment::replay::ReplayLedger;
use crate::wire::{Address, SettledPayment, Verdict};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reason given when a signature has already unlocked a resource.
pub const ALREADY_PROCESSED: &str =
    "Transaction already processed: signature has already been used";

/// What a transfer must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedPayment {
    /// Wallet that must own the destination token account.
    pub recipient: Address,
    /// Smallest acceptable amount.
    pub min_amount: AtomicAmount,
    /// Mint that must be transferred.
    pub asset: Address,
}

/// Whether verification consults and updates the replay ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayCheck {
    /// Reject known signatures and record accepted ones against `endpoint`.
    Enforce {
        /// Route the payment unlocks.
        endpoint: String,
    },
    /// Check the ledger only. Used by clients re-checking their own
    /// settlement after the server has already recorded it.
    Skip,
}

/// Checks transactions against an [`ExpectedPayment`].
///
/// Owns no persistent state besides the mint cache; the replay ledger is
/// shared with whoever else verifies against it.
pub struct PaymentVerifier {
    ledger: Arc<dyn Ledger>,
    replay: Option<Arc<ReplayLedger>>,
    mints: MintCache,
}

/// Owner and mint of the destination token account.
struct Destination {
    owner: String,
    mint: String,
}

impl PaymentVerifier {
    /// Create a verifier.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        replay: Option<Arc<ReplayLedger>>,
        mints: MintCache,
    ) -> Self {
        Self {
            ledger,
            replay,
            mints,
        }
    }

    /// Verify that `signature` names a successful transfer meeting
    /// `expected`.
    ///
    /// Never fails: ledger errors become an invalid verdict whose reason
    /// starts with `Verification error:`.
    pub async fn verify(
        &self,
        signature: &str,
        expected: &ExpectedPayment,
        replay: &ReplayCheck,
    ) -> Verdict {
        let verdict = match self.check(signature, expected, replay).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Verification of {signature} failed: {e}");
                Verdict::invalid(format!("Verification error: {e}"))
            }
        };

        match &verdict {
            Verdict::Valid(settled) => info!(
                "Payment {signature} verified: {} from {} to {}",
                settled.amount, settled.from, settled.to
            ),
            Verdict::Invalid { reason } => debug!("Payment {signature} rejected: {reason}"),
        }
        verdict
    }

    async fn check(
        &self,
        signature: &str,
        expected: &ExpectedPayment,
        replay: &ReplayCheck,
    ) -> Result<Verdict> {
        // Step 1: replay ledger, before any network query
        let replay_target = match replay {
            ReplayCheck::Enforce { endpoint } => {
                let Some(ledger) = &self.replay else {
                    return Ok(Verdict::invalid(
                        "Verification error: replay protection is not configured",
                    ));
                };
                if ledger.has(signature).await {
                    return Ok(Verdict::invalid(ALREADY_PROCESSED));
                }
                Some((ledger, endpoint))
            }
            ReplayCheck::Skip => None,
        };

        // Step 2: the transaction itself
        let Some(tx) = self.ledger.get_transaction(signature).await? else {
            return Ok(Verdict::invalid("Transaction not found"));
        };
        if let Some(failure) = &tx.failure {
            return Ok(Verdict::invalid(format!("Transaction failed: {failure}")));
        }

        // Step 3: the first token transfer
        let transfer = match find_token_transfer(&tx) {
            Ok(Some(transfer)) => transfer,
            Ok(None) => {
                return Ok(Verdict::invalid(
                    "No token transfer instruction found in transaction",
                ))
            }
            Err(e) => return Ok(Verdict::invalid(format!("Malformed token instruction: {e}"))),
        };

        // Step 4: owners of both token accounts
        let Some(destination) = self.destination(&transfer.destination).await? else {
            return Ok(Verdict::invalid("Destination token account owner not found"));
        };
        let Some(source_owner) = self.ledger.get_token_account_owner(&transfer.source).await?
        else {
            return Ok(Verdict::invalid("Source token account owner not found"));
        };

        // Step 5: compare against the challenge
        if destination.owner != expected.recipient.as_str() {
            return Ok(Verdict::invalid(format!(
                "Wrong recipient: expected {}, got {}",
                expected.recipient, destination.owner
            )));
        }
        let amount = transfer.amount();
        if amount < expected.min_amount {
            return Ok(Verdict::invalid(format!(
                "Insufficient amount: expected {}, got {amount}",
                expected.min_amount
            )));
        }
        if let Some(mint) = &transfer.mint {
            if mint != expected.asset.as_str() {
                return Ok(Verdict::invalid(format!(
                    "Wrong token: expected {}, got {mint}",
                    expected.asset
                )));
            }
        }
        // The legacy transfer does not name the mint; the account does.
        if destination.mint != expected.asset.as_str() {
            return Ok(Verdict::invalid(format!(
                "Wrong token: expected {}, got {}",
                expected.asset, destination.mint
            )));
        }

        // Step 6: record, losing gracefully to a concurrent verifier
        if let Some((ledger, endpoint)) = replay_target {
            match ledger.mark_used(signature, endpoint, amount).await {
                Ok(true) => {}
                Ok(false) => return Ok(Verdict::invalid(ALREADY_PROCESSED)),
                Err(e) => {
                    error!("Cannot record payment {signature}: {e}");
                    return Ok(Verdict::invalid(format!(
                        "Verification error: cannot record payment: {e}"
                    )));
                }
            }
        }

        Ok(Verdict::Valid(SettledPayment {
            signature: signature.to_string(),
            amount,
            from: source_owner,
            to: destination.owner,
        }))
    }

    /// The owner is always queried; only the mint may come from the cache.
    async fn destination(&self, account: &str) -> Result<Option<Destination>> {
        if let Some(mint) = self.mints.get(account) {
            let owner = self.ledger.get_token_account_owner(account).await?;
            return Ok(owner.map(|owner| Destination { owner, mint }));
        }
        let Some(resolved) = self.ledger.get_token_account(account).await? else {
            return Ok(None);
        };
        self.mints.insert(account.to_string(), resolved.mint.clone());
        Ok(Some(Destination {
            owner: resolved.owner,
            mint: resolved.mint,
        }))
    }

    /// Mint cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.mints.stats()
    }
}
