use dvpn_chain::HttpChainClient;
use dvpn_common::{VERSION, config::NodeConfig, db::init_db};
use dvpn_session_manager::{JobIntervals, ledger::DbSessionLedger, run_session_manager};
use dvpn_wireguard::WireguardPeerControl;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[macro_use]
extern crate tracing;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    if dotenvy::from_filename(".env.local").is_err() {
        dotenvy::dotenv().ok();
    }
    let config = NodeConfig::new();
    // initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},sqlx=warn", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dVPN node session manager version v{VERSION}");
    debug!("Using config: {config:?}");

    let pool = init_db(&config.database_path).await?;
    let ledger = DbSessionLedger::new(pool);
    let peers = WireguardPeerControl::new(config.wireguard_interface.clone());
    let chain = HttpChainClient::new(
        config.lcd_url.clone(),
        config.tx_relay_url.clone(),
        config.node_address.clone(),
    )?;
    let intervals = JobIntervals {
        set_sessions: config.interval_set_sessions.into(),
        update_status: config.interval_update_status.into(),
        update_sessions: config.interval_update_sessions.into(),
    };

    // stop jobs between ticks on Ctrl-C
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping jobs");
                shutdown.cancel();
            }
            Err(err) => error!("Failed to listen for shutdown signal: {err}"),
        }
    });

    // a stopped job leaves quotas unenforced, so any job error terminates the node
    run_session_manager(peers, ledger, chain, intervals, cancel).await?;

    info!("dVPN node session manager stopped");
    Ok(())
}
