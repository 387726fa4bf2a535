//! Shared collaborators for the client driver and the server handler.
//!
//! A [`Context`] is opened once and handed to every component that needs
//! the ledger, a wallet or the replay ledger. Nothing in the crate reaches
//! for a process-wide connection.

use crate::error::{Error, Result};
use crate::ledger::{Explorer, Ledger, SigningIdentity, WalletProvider};
use crate::payment::{ExpectedPayment, MintCache, PaymentVerifier, ReplayCheck, ReplayLedger};
use crate::wire::Verdict;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Where accepted signatures are recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReplayStore {
    /// No replay ledger; only [`ReplayCheck::Skip`] verification works.
    #[default]
    Disabled,
    /// Kept for the lifetime of the context.
    InMemory,
    /// Persisted to the given file.
    File(PathBuf),
}

/// Configuration for [`Context::open`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Replay ledger backing.
    pub replay: ReplayStore,
    /// Capacity of the token-account mint cache.
    pub mint_cache_capacity: usize,
    /// Explorer used for links logged after payment.
    pub explorer: Explorer,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            replay: ReplayStore::Disabled,
            mint_cache_capacity: 10_000,
            explorer: Explorer::default(),
        }
    }
}

/// Explicitly constructed bundle of ledger, wallet and replay state.
pub struct Context {
    ledger: Arc<dyn Ledger>,
    wallet: Option<Arc<dyn WalletProvider>>,
    replay: Option<Arc<ReplayLedger>>,
    verifier: PaymentVerifier,
    explorer: Explorer,
    closed: AtomicBool,
}

impl Context {
    /// Open a context.
    ///
    /// Loads the replay ledger when it is file-backed.
    pub async fn open(
        config: ContextConfig,
        ledger: Arc<dyn Ledger>,
        wallet: Option<Arc<dyn WalletProvider>>,
    ) -> Self {
        let replay = match &config.replay {
            ReplayStore::Disabled => None,
            ReplayStore::InMemory => Some(Arc::new(ReplayLedger::in_memory())),
            ReplayStore::File(path) => Some(Arc::new(ReplayLedger::open(path.clone()).await)),
        };
        let verifier = PaymentVerifier::new(
            Arc::clone(&ledger),
            replay.clone(),
            MintCache::with_capacity(config.mint_cache_capacity),
        );

        info!(
            "Context opened (replay={:?}, wallet={})",
            config.replay,
            wallet.is_some()
        );

        Self {
            ledger,
            wallet,
            replay,
            verifier,
            explorer: config.explorer,
            closed: AtomicBool::new(false),
        }
    }

    /// Ledger handle.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Replay ledger, if one is configured.
    #[must_use]
    pub fn replay_ledger(&self) -> Option<&Arc<ReplayLedger>> {
        self.replay.as_ref()
    }

    /// The verifier bound to this context.
    #[must_use]
    pub fn verifier(&self) -> &PaymentVerifier {
        &self.verifier
    }

    /// Explorer for logged links.
    #[must_use]
    pub fn explorer(&self) -> Explorer {
        self.explorer
    }

    /// Whether [`Context::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Verify a payment through this context's verifier.
    ///
    /// A closed context returns an invalid verdict without touching the
    /// ledger.
    pub async fn verify(
        &self,
        signature: &str,
        expected: &ExpectedPayment,
        replay: &ReplayCheck,
    ) -> Verdict {
        if self.is_closed() {
            return Verdict::invalid("Verification error: context is closed");
        }
        self.verifier.verify(signature, expected, replay).await
    }

    /// Obtain the identity to pay with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PaymentConstruction`] if the context is closed, has
    /// no wallet provider, or the provider fails.
    pub async fn signing_identity(&self) -> Result<Arc<dyn SigningIdentity>> {
        if self.is_closed() {
            return Err(Error::payment_construction("context is closed"));
        }
        let Some(wallet) = &self.wallet else {
            return Err(Error::payment_construction(
                "no wallet provider configured",
            ));
        };
        wallet.signing_identity().await.map_err(|e| match e {
            e @ Error::PaymentConstruction { .. } => e,
            other => Error::payment_construction_caused_by("failed to obtain signing identity", other),
        })
    }

    /// Close the context, flushing the replay ledger.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the replay ledger cannot be written.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(replay) = &self.replay {
            replay.flush().await?;
        }
        debug!("Context closed");
        Ok(())
    }
}
