//! x402 mock server: priced routes behind a 402 challenge.

mod handler;

use crate::config::ServerConfig;
use crate::context::{Context, ContextConfig, ReplayStore};
use crate::error::{Error, Result};
use crate::event::{create_event_channel, ServerEvent, ServerEventsChannel, ServerEventsSender};
use crate::ledger::{Ledger, RpcLedger, RpcLedgerConfig};
use axum::extract::Request;
use axum::routing::any;
use axum::Router;
use handler::{AppState, PricedRoute};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Builder for a running server.
pub struct ServerBuilder {
    config: ServerConfig,
    ctx: Option<Arc<Context>>,
    bind_ip: IpAddr,
}

impl ServerBuilder {
    /// Create a builder for the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            ctx: None,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Use an existing context instead of opening an RPC-backed one.
    ///
    /// The context must carry a replay ledger.
    #[must_use]
    pub fn with_context(mut self, ctx: Arc<Context>) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Interface to listen on (default: all).
    #[must_use]
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Validate the configuration, bind the listener and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the context has
    /// no replay ledger, or the port cannot be bound.
    pub async fn build(self) -> Result<RunningServer> {
        self.config.validate()?;
        info!(
            "Building x402test server (network={}, routes={})",
            self.config.network,
            self.config.routes.len()
        );

        let ctx = match self.ctx {
            Some(ctx) => ctx,
            None => {
                let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(RpcLedgerConfig {
                    rpc_url: self.config.rpc_url.clone(),
                    query_timeout: self.config.query_timeout(),
                    ..Default::default()
                })?);
                let ctx_config = ContextConfig {
                    replay: ReplayStore::File(self.config.replay_file.clone()),
                    ..Default::default()
                };
                Arc::new(Context::open(ctx_config, ledger, None).await)
            }
        };
        if ctx.replay_ledger().is_none() {
            return Err(Error::Config(
                "server context requires a replay ledger".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, _events_rx) = create_event_channel();

        let listener = tokio::net::TcpListener::bind(SocketAddr::new(self.bind_ip, self.config.port))
            .await
            .map_err(|e| {
                Error::Config(format!("failed to bind port {}: {e}", self.config.port))
            })?;
        let addr = listener.local_addr()?;

        let state = Arc::new(AppState {
            ctx: Arc::clone(&ctx),
            network: self.config.network.clone(),
            recipient: self.config.recipient.clone(),
            asset: self.config.asset.clone(),
            port: addr.port(),
            events: events_tx.clone(),
        });
        let router = build_router(&self.config, &state)?;

        let mut rx = shutdown_rx;
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    while !*rx.borrow() {
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                })
                .await
        });

        info!("x402test server listening on {addr}");
        let _ = events_tx.send(ServerEvent::Started { addr });

        Ok(RunningServer {
            addr,
            ctx,
            shutdown_tx,
            events_tx,
            handle,
        })
    }
}

fn build_router(config: &ServerConfig, state: &Arc<AppState>) -> Result<Router> {
    let mut router = Router::new();
    for (path, route) in &config.routes {
        let priced = Arc::new(PricedRoute {
            path: path.clone(),
            price: route.price_atomic(config.asset_decimals)?,
            config: route.clone(),
        });
        let state = Arc::clone(state);
        router = router.route(
            path,
            any(move |request: Request| {
                let state = Arc::clone(&state);
                let priced = Arc::clone(&priced);
                async move { handler::handle(state, priced, request).await }
            }),
        );
    }
    Ok(router
        .fallback(handler::not_found)
        .layer(TraceLayer::new_for_http()))
}

/// A server accepting requests.
pub struct RunningServer {
    addr: SocketAddr,
    ctx: Arc<Context>,
    shutdown_tx: watch::Sender<bool>,
    events_tx: ServerEventsSender,
    handle: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    /// Bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL of a path on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Context the server verifies with.
    #[must_use]
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Subscribe to server events.
    #[must_use]
    pub fn subscribe_events(&self) -> ServerEventsChannel {
        self.events_tx.subscribe()
    }

    /// Request a graceful shutdown.
    pub fn shutdown(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.events_tx.send(ServerEvent::ShuttingDown);
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the server to stop, then close the context.
    ///
    /// # Errors
    ///
    /// Returns an error if serving failed or the replay ledger cannot be
    /// flushed.
    pub async fn wait(self) -> Result<()> {
        let served = self
            .handle
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        self.ctx.close().await?;
        served?;
        info!("x402test server stopped");
        Ok(())
    }

    /// Serve until Ctrl-C or [`RunningServer::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns an error if serving failed.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            _ = shutdown_rx.wait_for(|stop| *stop) => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Cannot listen for Ctrl-C: {e}");
                }
                info!("Ctrl-C received, initiating shutdown");
                self.shutdown();
            }
        }
        self.wait().await
    }
}
