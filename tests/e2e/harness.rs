//! Test harness that runs a real server against the in-memory ledger.
//!
//! The `TestHarness` wires both sides of an x402 exchange the way two
//! separate processes would see them:
//! - a server context with an in-memory replay ledger and no wallet
//! - a client context with a funded wallet and no replay ledger
//!
//! Both share one [`MemoryLedger`], standing in for the network.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::info;
use x402test::amount::AtomicAmount;
use x402test::config::{RouteConfig, RouteResponse, ServerConfig};
use x402test::context::{Context, ContextConfig, ReplayStore};
use x402test::event::ServerEventsChannel;
use x402test::ledger::{
    Ledger, MemoryLedger, MemoryWallet, SigningIdentity, StaticWalletProvider, TransferIntent,
    TransferStyle, WalletProvider,
};
use x402test::payment::ReplayLedger;
use x402test::server::{RunningServer, ServerBuilder};
use x402test::wire::{
    encode_payment_header, Address, PaymentPayload, SolanaPaymentPayload, TxSignature,
    PAYMENT_HEADER, SCHEME_EXACT, X402_VERSION,
};
use x402test::{ClientConfig, X402Client};

/// Network advertised by the harness server.
pub const NETWORK: &str = "solana-localnet";

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Library error.
    #[error("x402test error: {0}")]
    X402(#[from] x402test::Error),

    /// Raw HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Harness configuration.
pub struct HarnessConfig {
    /// Priced routes served.
    pub routes: BTreeMap<String, RouteConfig>,
    /// Initial wallet balance, atomic units.
    pub wallet_balance: AtomicAmount,
    /// Instruction style used by the wallet.
    pub transfer_style: TransferStyle,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let mut routes = BTreeMap::new();
        routes.insert(
            "/api/premium".to_string(),
            RouteConfig::new(
                "0.10",
                RouteResponse::Static(json!({ "data": "This is premium content!" })),
            )
            .with_description("Premium content access"),
        );
        routes.insert(
            "/api/data".to_string(),
            RouteConfig::new(
                "0.01",
                RouteResponse::Static(json!({ "data": { "message": "Your data here" } })),
            )
            .with_description("Data API access"),
        );
        routes.insert(
            "/api/echo".to_string(),
            RouteConfig::new(
                "0.01",
                RouteResponse::dynamic(|req| {
                    json!({ "method": req.method, "path": req.path, "body": req.body })
                }),
            ),
        );
        routes.insert(
            "/api/created".to_string(),
            RouteConfig::new("0.01", RouteResponse::Static(json!({ "created": true })))
                .with_status(201),
        );
        Self {
            routes,
            wallet_balance: AtomicAmount::new(1_000_000),
            transfer_style: TransferStyle::Checked,
        }
    }
}

/// Test harness that manages the complete test environment.
pub struct TestHarness {
    ledger: Arc<MemoryLedger>,
    mint: Address,
    recipient: Address,
    wallet: Arc<MemoryWallet>,
    provider: Arc<StaticWalletProvider>,
    client: X402Client,
    server: RunningServer,
    http: reqwest::Client,
}

impl TestHarness {
    /// Start a harness with the default routes and a funded wallet.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start.
    pub async fn setup() -> Result<Self> {
        Self::setup_with_config(HarnessConfig::default()).await
    }

    /// Start a harness with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start.
    pub async fn setup_with_config(config: HarnessConfig) -> Result<Self> {
        let ledger = Arc::new(MemoryLedger::new());
        let mint = ledger.create_mint(6);
        let recipient = MemoryLedger::random_address();

        let wallet = Arc::new(
            MemoryWallet::funded(Arc::clone(&ledger), &mint, config.wallet_balance)?
                .with_style(config.transfer_style),
        );
        let provider = Arc::new(StaticWalletProvider::new(
            Arc::clone(&wallet) as Arc<dyn SigningIdentity>
        ));

        let server_ctx = Context::open(
            ContextConfig {
                replay: ReplayStore::InMemory,
                ..Default::default()
            },
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            None,
        )
        .await;
        let client_ctx = Context::open(
            ContextConfig::default(),
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            Some(Arc::clone(&provider) as Arc<dyn WalletProvider>),
        )
        .await;

        let mut server_config = ServerConfig::new(recipient.clone(), mint.clone());
        server_config.port = 0;
        server_config.network = NETWORK.to_string();
        server_config.routes = config.routes;

        let server = ServerBuilder::new(server_config)
            .with_context(Arc::new(server_ctx))
            .bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .build()
            .await?;
        info!("Test harness server on {}", server.local_addr());

        let client = X402Client::new(Arc::new(client_ctx), ClientConfig::default())?;

        Ok(Self {
            ledger,
            mint,
            recipient,
            wallet,
            provider,
            client,
            server,
            http: reqwest::Client::new(),
        })
    }

    /// Absolute URL of a path on the harness server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }

    /// The client driver, paying from the harness wallet.
    #[must_use]
    pub fn client(&self) -> &X402Client {
        &self.client
    }

    /// The shared ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<MemoryLedger> {
        &self.ledger
    }

    /// The mint the server charges in.
    #[must_use]
    pub fn mint(&self) -> &Address {
        &self.mint
    }

    /// The wallet the server expects payment to.
    #[must_use]
    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    /// The paying wallet.
    #[must_use]
    pub fn wallet(&self) -> &Arc<MemoryWallet> {
        &self.wallet
    }

    /// The provider handing out the paying wallet.
    #[must_use]
    pub fn provider(&self) -> &Arc<StaticWalletProvider> {
        &self.provider
    }

    /// The server's replay ledger.
    #[must_use]
    pub fn replay(&self) -> Option<&Arc<ReplayLedger>> {
        self.server.context().replay_ledger()
    }

    /// Subscribe to server events.
    #[must_use]
    pub fn subscribe_events(&self) -> ServerEventsChannel {
        self.server.subscribe_events()
    }

    /// Transfer tokens from the harness wallet outside the client driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    pub async fn transfer(
        &self,
        recipient: &Address,
        asset: &Address,
        amount: u64,
    ) -> Result<TxSignature> {
        Ok(self
            .wallet
            .transfer(&TransferIntent {
                recipient: recipient.clone(),
                asset: asset.clone(),
                amount: AtomicAmount::new(amount),
            })
            .await?)
    }

    /// Encode an `X-PAYMENT` header for a signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the proof cannot be encoded.
    pub fn proof_header(&self, signature: &TxSignature, amount: u64) -> Result<String> {
        let proof = PaymentPayload {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_string(),
            network: NETWORK.to_string(),
            payload: SolanaPaymentPayload {
                signature: signature.clone(),
                from: self.wallet.address().clone(),
                amount: AtomicAmount::new(amount),
                mint: self.mint.clone(),
                timestamp: 1_700_000_000_000,
            },
        };
        Ok(encode_payment_header(&proof)?)
    }

    /// GET a path with plain HTTP, optionally with an `X-PAYMENT` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn raw_get(&self, path: &str, payment: Option<&str>) -> Result<(u16, Value)> {
        let mut request = self.http.get(self.url(path));
        if let Some(header) = payment {
            request = request.header(PAYMENT_HEADER, header);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// Stop the server.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown fails.
    pub async fn teardown(self) -> Result<()> {
        info!("Tearing down test harness");
        self.server.shutdown();
        self.server.wait().await?;
        Ok(())
    }
}
