//! Configuration for the x402test server.

use crate::amount::AtomicAmount;
use crate::error::{Error, Result};
use crate::payment::DEFAULT_REPLAY_FILE;
use crate::wire::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default config file name used by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "x402test.toml";

/// Characters the router would read as path parameters or wildcards.
const ROUTE_PATTERN_CHARS: [char; 4] = [':', '*', '{', '}'];

/// What a route handler sees of the request when producing a body.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Request headers, lower-cased names.
    pub headers: HashMap<String, String>,
    /// JSON request body, if any.
    pub body: Option<Value>,
}

/// Producer of a dynamic response body.
pub type ResponseFn = Arc<dyn Fn(&RequestContext) -> Value + Send + Sync>;

/// A route's response body.
#[derive(Clone)]
pub enum RouteResponse {
    /// The same JSON value every time.
    Static(Value),
    /// Computed from the request at dispatch time.
    Dynamic(ResponseFn),
}

impl RouteResponse {
    /// Wrap a producer.
    pub fn dynamic(f: impl Fn(&RequestContext) -> Value + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    /// Evaluate for a request.
    #[must_use]
    pub fn render(&self, request: &RequestContext) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Dynamic(f) => f(request),
        }
    }
}

impl Default for RouteResponse {
    fn default() -> Self {
        Self::Static(Value::Null)
    }
}

impl fmt::Debug for RouteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

impl fmt::Display for RouteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => {
                let pretty = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
                f.write_str(&pretty)
            }
            Self::Dynamic(_) => f.write_str("<computed per request>"),
        }
    }
}

impl Serialize for RouteResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Static(value) => value.serialize(serializer),
            Self::Dynamic(_) => Err(serde::ser::Error::custom(
                "dynamic route responses cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for RouteResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::Static)
    }
}

/// One priced route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Price in whole currency units, e.g. `"0.01"`.
    pub price: String,

    /// Human description shown in the challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Status code of the paid response.
    #[serde(default = "default_status")]
    pub status: u16,

    /// Body of the paid response.
    #[serde(default)]
    pub response: RouteResponse,
}

impl RouteConfig {
    /// A route with a static body and status 200.
    pub fn new(price: impl Into<String>, response: RouteResponse) -> Self {
        Self {
            price: price.into(),
            description: None,
            status: default_status(),
            response,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Price in atomic units of an asset with `decimals` decimals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for negative, over-precise or overflowing
    /// prices.
    pub fn price_atomic(&self, decimals: u32) -> Result<AtomicAmount> {
        AtomicAmount::from_decimal(&self.price, decimals)
            .map_err(|e| Error::Config(format!("invalid price {:?}: {e}", self.price)))
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port (0 for auto-select).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Network identifier advertised in challenges.
    #[serde(default = "default_network")]
    pub network: String,

    /// Ledger JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Wallet that must receive payments.
    pub recipient: Address,

    /// Mint that payments must be made in.
    pub asset: Address,

    /// Decimals of `asset`.
    #[serde(default = "default_asset_decimals")]
    pub asset_decimals: u32,

    /// Replay ledger file.
    #[serde(default = "default_replay_file")]
    pub replay_file: PathBuf,

    /// Timeout for ledger queries, in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Priced routes by path.
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConfig>,
}

const fn default_port() -> u16 {
    4402
}

fn default_network() -> String {
    "solana-localnet".to_string()
}

fn default_rpc_url() -> String {
    "http://localhost:8899".to_string()
}

const fn default_asset_decimals() -> u32 {
    crate::amount::DEFAULT_ASSET_DECIMALS
}

fn default_replay_file() -> PathBuf {
    PathBuf::from(DEFAULT_REPLAY_FILE)
}

const fn default_query_timeout() -> u64 {
    30
}

const fn default_status() -> u16 {
    200
}

impl ServerConfig {
    /// A config with default settings and no routes.
    #[must_use]
    pub fn new(recipient: Address, asset: Address) -> Self {
        Self {
            port: default_port(),
            network: default_network(),
            rpc_url: default_rpc_url(),
            recipient,
            asset,
            asset_decimals: default_asset_decimals(),
            replay_file: default_replay_file(),
            query_timeout_secs: default_query_timeout(),
            routes: BTreeMap::new(),
        }
    }

    /// The config written by `x402test init`.
    #[must_use]
    pub fn starter(recipient: Address, asset: Address) -> Self {
        Self::new(recipient, asset)
            .with_route(
                "/api/premium",
                RouteConfig::new(
                    "0.10",
                    RouteResponse::Static(serde_json::json!({
                        "data": "This is premium content!"
                    })),
                )
                .with_description("Premium content access"),
            )
            .with_route(
                "/api/data",
                RouteConfig::new(
                    "0.01",
                    RouteResponse::Static(serde_json::json!({
                        "data": { "message": "Your data here" }
                    })),
                )
                .with_description("Data API access"),
            )
    }

    /// Add or replace a route.
    #[must_use]
    pub fn with_route(mut self, path: impl Into<String>, route: RouteConfig) -> Self {
        self.routes.insert(path.into(), route);
        self
    }

    /// Ledger query timeout.
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Check every route before serving.
    ///
    /// Paths are matched literally, so router pattern syntax (`:`, `*`,
    /// `{`, `}`) is refused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first bad route.
    pub fn validate(&self) -> Result<()> {
        if self.query_timeout_secs == 0 {
            return Err(Error::Config("query_timeout_secs must be positive".to_string()));
        }
        for (path, route) in &self.routes {
            if !path.starts_with('/') {
                return Err(Error::Config(format!("route {path:?} must start with '/'")));
            }
            if let Some(c) = path.chars().find(|c| ROUTE_PATTERN_CHARS.contains(c)) {
                return Err(Error::Config(format!(
                    "route {path:?} contains {c:?}; paths are matched literally"
                )));
            }
            route
                .price_atomic(self.asset_decimals)
                .map_err(|e| Error::Config(format!("route {path}: {e}")))?;
            if !(100..=599).contains(&route.status) {
                return Err(Error::Config(format!(
                    "route {path}: invalid status {}",
                    route.status
                )));
            }
        }
        Ok(())
    }

    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config has dynamic responses or the file
    /// cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
