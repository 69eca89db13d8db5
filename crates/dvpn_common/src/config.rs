use std::path::PathBuf;

use clap::Parser;
use humantime::Duration;
use reqwest::Url;

#[derive(Clone, Parser, Debug)]
#[command(version, about = "Session reconciliation service of a dVPN node")]
pub struct NodeConfig {
    #[arg(long, env = "DVPN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "DVPN_DATABASE_PATH", default_value = "data.db")]
    pub database_path: PathBuf,

    #[arg(long, env = "DVPN_WIREGUARD_INTERFACE", default_value = "wg0")]
    pub wireguard_interface: String,

    // chain REST (LCD) endpoint used for session and subscription queries
    #[arg(long, env = "DVPN_LCD_URL", value_parser = Url::parse, default_value = "http://127.0.0.1:1317")]
    pub lcd_url: Url,

    // relay which signs and broadcasts node transactions
    #[arg(long, env = "DVPN_TX_RELAY_URL", value_parser = Url::parse, default_value = "http://127.0.0.1:8081")]
    pub tx_relay_url: Url,

    #[arg(long, env = "DVPN_NODE_ADDRESS")]
    pub node_address: String,

    #[arg(long, env = "DVPN_INTERVAL_SET_SESSIONS", value_parser = parse_interval, default_value = "10s")]
    pub interval_set_sessions: Duration,

    #[arg(long, env = "DVPN_INTERVAL_UPDATE_STATUS", value_parser = parse_interval, default_value = "55m")]
    pub interval_update_status: Duration,

    #[arg(long, env = "DVPN_INTERVAL_UPDATE_SESSIONS", value_parser = parse_interval, default_value = "100m")]
    pub interval_update_sessions: Duration,
}

impl NodeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::parse()
    }
}

/// Job intervals drive fixed-period timers and must be positive.
fn parse_interval(value: &str) -> Result<Duration, String> {
    let duration: Duration = value.parse().map_err(|err: humantime::DurationError| err.to_string())?;
    if duration.is_zero() {
        return Err("interval must be greater than zero".into());
    }
    Ok(duration)
}
