//! JSON-RPC ledger client.
//!
//! Only two read calls are needed by verification: `getTransaction` to
//! locate the transfer and `getAccountInfo` to resolve token-account
//! owners. Both are bounded by [`RpcLedgerConfig::query_timeout`].

use super::{CompiledInstruction, Ledger, LedgerTransaction, TokenAccount, TOKEN_PROGRAM_ID};
use crate::amount::AtomicAmount;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Size of an initialized token account.
const TOKEN_ACCOUNT_LEN: usize = 165;

/// Configuration for [`RpcLedger`].
#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Timeout for a single query.
    pub query_timeout: Duration,
    /// Commitment level for reads.
    pub commitment: String,
}

impl Default for RpcLedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8899".to_string(),
            query_timeout: Duration::from_secs(30),
            commitment: "confirmed".to_string(),
        }
    }
}

/// Read-only ledger backed by a JSON-RPC node.
pub struct RpcLedger {
    config: RpcLedgerConfig,
    http: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct EncodedTransaction {
    transaction: EncodedBody,
    meta: Option<TransactionMeta>,
}

#[derive(Deserialize)]
struct EncodedBody {
    signatures: Vec<String>,
    message: EncodedMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedMessage {
    account_keys: Vec<String>,
    instructions: Vec<EncodedInstruction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedInstruction {
    program_id_index: u8,
    accounts: Vec<u8>,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    err: Option<Value>,
    #[serde(default)]
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Deserialize, Default)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

#[derive(Deserialize)]
struct AccountInfoResult {
    value: Option<AccountInfo>,
}

#[derive(Deserialize)]
struct AccountInfo {
    data: (String, String),
    owner: String,
}

impl RpcLedger {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(config: RpcLedgerConfig) -> Result<Self> {
        url::Url::parse(&config.rpc_url)
            .map_err(|e| Error::Config(format!("invalid RPC URL {}: {e}", config.rpc_url)))?;
        let http = reqwest::Client::builder()
            .timeout(config.query_timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    /// The endpoint this client talks to.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.config.rpc_url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("RPC {method} (id {id})");

        let send = async {
            let response = self
                .http
                .post(&self.config.rpc_url)
                .json(&request)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, Error>(response.json::<RpcResponse<T>>().await?)
        };

        let response = match tokio::time::timeout(self.config.query_timeout, send).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("RPC {method} timed out");
                return Err(Error::Transport(format!(
                    "ledger query {method} timed out after {:?}",
                    self.config.query_timeout
                )));
            }
        };

        if let Some(err) = response.error {
            return Err(Error::Ledger(format!(
                "{method} failed ({}): {}",
                err.code, err.message
            )));
        }
        Ok(response.result)
    }
}

fn decode_transaction(encoded: EncodedTransaction, signature: &str) -> Result<LedgerTransaction> {
    let EncodedTransaction { transaction, meta } = encoded;
    let mut account_keys = transaction.message.account_keys;

    let instructions = transaction
        .message
        .instructions
        .into_iter()
        .map(|ix| {
            let data = bs58::decode(&ix.data).into_vec().map_err(|e| {
                Error::Ledger(format!("instruction data is not base58: {e}"))
            })?;
            Ok(CompiledInstruction {
                program_id_index: ix.program_id_index,
                accounts: ix.accounts,
                data,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let (failure, loaded) = match meta {
        Some(meta) => (
            meta.err.filter(|err| !err.is_null()).map(|err| err.to_string()),
            meta.loaded_addresses.unwrap_or_default(),
        ),
        None => (None, LoadedAddresses::default()),
    };
    // Versioned transactions index lookup-table accounts after the static keys.
    account_keys.extend(loaded.writable);
    account_keys.extend(loaded.readonly);

    Ok(LedgerTransaction {
        signature: transaction
            .signatures
            .into_iter()
            .next()
            .unwrap_or_else(|| signature.to_string()),
        account_keys,
        instructions,
        failure,
    })
}

fn decode_token_account(info: AccountInfo) -> Result<Option<TokenAccount>> {
    if info.owner != TOKEN_PROGRAM_ID {
        return Ok(None);
    }
    let data = STANDARD
        .decode(&info.data.0)
        .map_err(|e| Error::Ledger(format!("account data is not base64: {e}")))?;
    if data.len() < TOKEN_ACCOUNT_LEN {
        return Ok(None);
    }

    let mut raw_amount = [0u8; 8];
    raw_amount.copy_from_slice(&data[64..72]);
    Ok(Some(TokenAccount {
        mint: bs58::encode(&data[0..32]).into_string(),
        owner: bs58::encode(&data[32..64]).into_string(),
        amount: AtomicAmount::new(u64::from_le_bytes(raw_amount)),
    }))
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>> {
        let params = json!([
            signature,
            {
                "encoding": "json",
                "commitment": self.config.commitment,
                "maxSupportedTransactionVersion": 0,
            }
        ]);
        self.call::<EncodedTransaction>("getTransaction", params)
            .await?
            .map(|encoded| decode_transaction(encoded, signature))
            .transpose()
    }

    async fn get_token_account(&self, address: &str) -> Result<Option<TokenAccount>> {
        let params = json!([
            address,
            { "encoding": "base64", "commitment": self.config.commitment }
        ]);
        match self.call::<AccountInfoResult>("getAccountInfo", params).await? {
            Some(AccountInfoResult { value: Some(info) }) => decode_token_account(info),
            _ => Ok(None),
        }
    }
}
