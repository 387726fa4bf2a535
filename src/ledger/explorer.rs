//! Block-explorer links for settled transactions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster a network identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    /// Production cluster.
    MainnetBeta,
    /// Public development cluster.
    Devnet,
    /// Local validator on the default port.
    #[default]
    Localnet,
}

impl Cluster {
    /// Map a challenge `network` identifier to a cluster.
    ///
    /// Unknown identifiers map to [`Cluster::Localnet`].
    #[must_use]
    pub fn from_network(network: &str) -> Self {
        match network {
            "mainnet-beta" | "solana" | "solana-mainnet" | "solana-mainnet-beta" => {
                Self::MainnetBeta
            }
            "devnet" | "solana-devnet" => Self::Devnet,
            _ => Self::Localnet,
        }
    }

    fn query(self) -> &'static str {
        match self {
            Self::MainnetBeta => "",
            Self::Devnet => "?cluster=devnet",
            Self::Localnet => "?cluster=custom&customUrl=http://localhost:8899",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Devnet => "devnet",
            Self::Localnet => "localnet",
        })
    }
}

/// Supported block explorers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Explorer {
    /// explorer.solana.com
    #[default]
    SolanaExplorer,
    /// solscan.io
    Solscan,
}

/// Link to a transaction on an explorer.
#[must_use]
pub fn explorer_url(signature: &str, explorer: Explorer, cluster: Cluster) -> String {
    let base = match explorer {
        Explorer::SolanaExplorer => "https://explorer.solana.com/tx/",
        Explorer::Solscan => "https://solscan.io/tx/",
    };
    format!("{base}{signature}{}", cluster.query())
}
