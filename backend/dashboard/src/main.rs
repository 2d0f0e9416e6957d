//! Ballot dashboard — entry point.
//!
//! Connects to the voting contract through the configured JSON-RPC wallet,
//! keeps the dashboard state in sync in the background, and serves the
//! dashboard views and the user/admin action routes.

use std::sync::Arc;

use reqwest::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ballot_dashboard::api::{self, ApiState};
use ballot_dashboard::config::Config;
use ballot_dashboard::rpc::RpcClient;
use ballot_dashboard::sync::{Dashboard, SystemClock};
use ballot_dashboard::wallet::{NodeWallet, WalletProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let rpc = Arc::new(RpcClient::new(client, config.rpc_url.clone()));

    let wallet: Option<Arc<dyn WalletProvider>> = if config.wallet_enabled {
        Some(Arc::new(NodeWallet::new(
            rpc.clone(),
            config.wallet_account,
            config.confirm_policy(),
        )))
    } else {
        None
    };

    let dashboard = Dashboard::new(
        wallet,
        config.contract_address,
        Arc::new(SystemClock),
        config.intervals(),
    );

    // ─── Notifications ────────────────────────────────────
    let mut notifications = dashboard.subscribe();
    tokio::spawn(async move {
        while let Ok(n) = notifications.recv().await {
            info!(severity = ?n.severity, "{}: {}", n.title, n.description);
        }
    });

    // ─── Initial connect ──────────────────────────────────
    if config.auto_connect {
        let connecting = dashboard.clone();
        info!(
            "Connecting to contract {} via {}",
            config.contract_address,
            rpc.url()
        );
        tokio::spawn(async move {
            if let Err(e) = connecting.connect().await {
                error!("Initial connect failed: {e}");
            }
        });
    }

    // ─── HTTP ─────────────────────────────────────────────
    let app = api::router(ApiState {
        dashboard: dashboard.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    dashboard.disconnect().await;
    info!("Shut down");
    Ok(())
}
