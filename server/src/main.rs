use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use updraft_engine::mocks::MockWallet;
use updraft_engine::wallet::Wallet;
use updraft_engine::{Engine, EngineConfig};
use updraft_server::wallet::RemoteWallet;
use updraft_server::Api;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Base URL of the wallet service. Omitted: an in-memory dev wallet
    /// funds every account on first touch.
    #[arg(long)]
    wallet_url: Option<String>,

    /// Starting balance per account in dev-wallet mode.
    #[arg(long, default_value_t = 1_000)]
    dev_balance: u64,

    /// Milliseconds between multiplier broadcasts.
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// Length of the betting window in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    waiting_ms: u64,

    /// Cooldown between rounds in milliseconds.
    #[arg(long, default_value_t = 3_000)]
    cooldown_ms: u64,

    /// House edge in basis points of probability (100 = 1%).
    #[arg(long, default_value_t = 100)]
    house_edge_bps: u64,

    /// Minimum stake per bet.
    #[arg(long, default_value_t = 10)]
    min_bet: u64,

    /// JSONL file receiving one line per settled round.
    #[arg(long)]
    history_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = EngineConfig {
        tick_interval: Duration::from_millis(args.tick_ms),
        waiting_duration: Duration::from_millis(args.waiting_ms),
        cooldown: Duration::from_millis(args.cooldown_ms),
        house_edge_bps: args.house_edge_bps,
        min_bet: args.min_bet,
        history_path: args.history_file,
        ..EngineConfig::default()
    };

    let wallet: Arc<dyn Wallet> = match &args.wallet_url {
        Some(url) => {
            info!(wallet = url, "using remote wallet");
            Arc::new(RemoteWallet::new(url).context("invalid wallet url")?)
        }
        None => {
            warn!(
                dev_balance = args.dev_balance,
                "no wallet service configured, using in-memory dev wallet"
            );
            Arc::new(MockWallet::with_starting_balance(args.dev_balance))
        }
    };

    let engine = Engine::spawn(config, wallet);
    let api = Api::new(engine);
    let app = api.router();

    // Start server
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
