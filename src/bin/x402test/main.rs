//! x402test CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command, InitArgs, SignaturesAction};
use color_eyre::eyre::bail;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use x402test::config::{RouteResponse, ServerConfig};
use x402test::payment::ReplayLedger;
use x402test::ServerBuilder;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("x402test v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Start(args) => start(args.into_config()?).await,
        Command::Init(args) => init(args),
        Command::Routes { config } => {
            print_routes(&ServerConfig::from_file(&config)?);
            Ok(())
        }
        Command::Signatures { action, file } => signatures(action, &file).await,
    }
}

async fn start(config: ServerConfig) -> color_eyre::Result<()> {
    let server = ServerBuilder::new(config.clone()).build().await?;

    println!("x402test server listening on {}", server.url(""));
    println!("  network:   {}", config.network);
    println!("  rpc:       {}", config.rpc_url);
    println!("  recipient: {}", config.recipient);
    println!("  asset:     {}", config.asset);
    println!("  replay:    {}", config.replay_file.display());
    println!();
    print_routes(&config);

    server.run_until_ctrl_c().await?;
    info!("Goodbye!");
    Ok(())
}

fn init(args: InitArgs) -> color_eyre::Result<()> {
    if args.path.exists() && !args.force {
        bail!(
            "config file {} already exists, use --force to overwrite",
            args.path.display()
        );
    }
    let config = ServerConfig::starter(args.recipient, args.asset);
    config.to_file(&args.path)?;

    println!("Config file created at {}", args.path.display());
    println!("Recipient wallet: {}", config.recipient);
    println!("Run 'x402test start' to start the server.");
    Ok(())
}

fn print_routes(config: &ServerConfig) {
    if config.routes.is_empty() {
        println!("No routes configured.");
        return;
    }
    println!("Routes:");
    for (path, route) in &config.routes {
        println!("  {path}");
        println!("    price:       {}", route.price);
        if let Some(description) = &route.description {
            println!("    description: {description}");
        }
        println!("    status:      {}", route.status);
        match &route.response {
            RouteResponse::Static(value) => println!("    response:    {value}"),
            RouteResponse::Dynamic(_) => println!("    response:    <dynamic>"),
        }
    }
}

async fn signatures(action: SignaturesAction, file: &Path) -> color_eyre::Result<()> {
    let ledger = ReplayLedger::open(file).await;
    match action {
        SignaturesAction::List => {
            let stats = ledger.stats().await;
            println!("{} signature(s) recorded in {}", stats.total, file.display());
            for record in &stats.records {
                let used_at = record
                    .used_at_utc()
                    .map_or_else(|| record.used_at.to_string(), |t| t.to_rfc3339());
                println!(
                    "  {}  {}  {}  {}",
                    used_at, record.endpoint, record.amount, record.signature
                );
            }
        }
        SignaturesAction::Reset => {
            ledger.reset().await?;
            println!("Replay ledger {} cleared", file.display());
        }
    }
    Ok(())
}
