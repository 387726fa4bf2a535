//! # x402test
//!
//! A testing framework for x402 pay-per-request HTTP flows settled with
//! fungible-token transfers on Solana.
//!
//! The crate provides both sides of the exchange:
//! - a mock server that guards priced routes behind a 402 challenge and
//!   verifies payment proofs against the ledger
//! - a client driver that answers challenges by paying, retries with the
//!   proof and checks expectations on the final response
//!
//! ## Architecture
//!
//! - [`wire`]: the challenge, proof and receipt messages
//! - [`payment`]: the verification engine and the replay ledger
//! - [`ledger`]: ledger and wallet collaborators (JSON-RPC and in-memory)
//! - [`context`]: the bundle of collaborators shared by client and server
//! - [`server`]: the challenge/verify HTTP server
//! - [`client`]: the pay-and-retry request driver
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use x402test::{ServerBuilder, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_file(Path::new("x402test.toml"))?;
//!     let server = ServerBuilder::new(config).build().await?;
//!     server.run_until_ctrl_c().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod amount;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod ledger;
pub mod payment;
pub mod server;
pub mod wire;

pub use amount::{AtomicAmount, DEFAULT_ASSET_DECIMALS};
pub use client::{ClientConfig, PaymentInfo, X402Client, X402Request, X402Response};
pub use config::{RouteConfig, RouteResponse, ServerConfig, DEFAULT_CONFIG_FILE};
pub use context::{Context, ContextConfig, ReplayStore};
pub use error::{Error, Result};
pub use event::{ServerEvent, ServerEventsChannel};
pub use ledger::{
    Ledger, MemoryLedger, MemoryWallet, RpcLedger, RpcLedgerConfig, SigningIdentity,
    StaticWalletProvider, WalletProvider,
};
pub use payment::{ExpectedPayment, PaymentVerifier, ReplayCheck, ReplayLedger};
pub use server::{RunningServer, ServerBuilder};
pub use wire::{
    PaymentPayload, PaymentRequiredResponse, PaymentRequirements, SettlementReceipt, Verdict,
};
