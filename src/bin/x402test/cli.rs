//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use x402test::config::{ServerConfig, DEFAULT_CONFIG_FILE};
use x402test::payment::DEFAULT_REPLAY_FILE;
use x402test::wire::Address;

/// Testing framework for x402 payment flows on Solana.
#[derive(Parser, Debug)]
#[command(name = "x402test")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level.
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the x402test server.
    Start(StartArgs),

    /// Write a starter configuration file.
    Init(InitArgs),

    /// List configured routes.
    Routes {
        /// Path to configuration file.
        #[arg(long, short, default_value = DEFAULT_CONFIG_FILE, env = "X402TEST_CONFIG")]
        config: PathBuf,
    },

    /// Inspect or clear the replay ledger.
    Signatures {
        #[command(subcommand)]
        action: SignaturesAction,

        /// Replay ledger file.
        #[arg(long, short, global = true, default_value = DEFAULT_REPLAY_FILE)]
        file: PathBuf,
    },
}

/// Arguments of `start`.
#[derive(clap::Args, Debug)]
pub struct StartArgs {
    /// Path to configuration file.
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE, env = "X402TEST_CONFIG")]
    pub config: PathBuf,

    /// Listening port (0 for auto-select).
    #[arg(long, short, env = "X402TEST_PORT")]
    pub port: Option<u16>,

    /// Ledger JSON-RPC endpoint.
    #[arg(long, env = "X402TEST_RPC_URL")]
    pub rpc_url: Option<String>,
}

/// Arguments of `init`.
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file.
    #[arg(long, short)]
    pub force: bool,

    /// Wallet that receives payments.
    #[arg(long, env = "X402TEST_RECIPIENT")]
    pub recipient: Address,

    /// Mint payments are made in.
    #[arg(long, env = "X402TEST_ASSET")]
    pub asset: Address,

    /// Where to write the config.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub path: PathBuf,
}

/// Actions of `signatures`.
#[derive(Subcommand, Debug, Clone, Copy)]
pub enum SignaturesAction {
    /// Show recorded signatures.
    List,
    /// Forget every recorded signature.
    Reset,
}

impl StartArgs {
    /// Load the config file and apply command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or is invalid.
    pub fn into_config(self) -> color_eyre::Result<ServerConfig> {
        let mut config = ServerConfig::from_file(&self.config)?;

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(rpc_url) = self.rpc_url {
            config.rpc_url = rpc_url;
        }

        Ok(config)
    }
}
